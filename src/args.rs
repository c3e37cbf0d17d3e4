//! These structs provide the CLI interface for the budget CLI.

use crate::allocation::HalfMonthConvention;
use crate::model::{Amount, Granularity};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// budget: Allocate budget amounts across calendar periods and keep transaction splits
/// consistent with budget rules.
///
/// Budgets and transactions are kept in a local SQLite database under --budget-home. Calendar
/// periods are read from a pre-generated CSV catalog (calendar.csv by default) that you place in
/// the same directory.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the database.
    ///
    /// This is the first command you should run. Afterwards, copy your calendar catalog to
    /// $BUDGET_HOME/calendar.csv (or point catalog_path in config.json at it).
    Init,
    /// Load budgets and transactions from JSON files. Transactions whose splits do not add up are
    /// rebalanced before they are saved.
    Import(ImportArgs),
    /// Show how much of an amount belongs to one calendar period.
    Allocate(AllocateArgs),
    /// List the amount a budget allocates to each period of a granularity.
    Periods(PeriodsArgs),
    /// Check that a transaction's splits add up to its amount, rebalancing them if not.
    Validate(ValidateArgs),
    /// Move splits between budgets after a budget changed.
    Reassign(ReassignArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where budget data and configuration is held. Defaults to ~/budget
    #[arg(long, env = "BUDGET_HOME", default_value_t = default_budget_home())]
    budget_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, budget_home: PathBuf) -> Self {
        Self {
            log_level,
            budget_home: budget_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn budget_home(&self) -> &DisplayPath {
        &self.budget_home
    }
}

/// Args for the `budget import` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct ImportArgs {
    /// A JSON file holding an array of budgets.
    #[arg(long)]
    budgets: Option<PathBuf>,

    /// A JSON file holding an array of transactions with their splits.
    #[arg(long)]
    transactions: Option<PathBuf>,
}

impl ImportArgs {
    pub fn new(budgets: Option<PathBuf>, transactions: Option<PathBuf>) -> Self {
        Self {
            budgets,
            transactions,
        }
    }

    pub fn budgets(&self) -> Option<&Path> {
        self.budgets.as_deref()
    }

    pub fn transactions(&self) -> Option<&Path> {
        self.transactions.as_deref()
    }
}

/// Args for the `budget allocate` command.
#[derive(Debug, Parser, Clone)]
pub struct AllocateArgs {
    /// The nominal amount, e.g. 1000 or $1,000.00
    #[arg(long)]
    amount: Amount,

    /// The granularity the amount is denominated in.
    #[arg(long, value_enum)]
    granularity: Granularity,

    /// The id of the target period in the calendar catalog, e.g. 2025W05
    #[arg(long)]
    period: String,

    /// Overrides half_month_convention from config.json.
    #[arg(long, value_enum)]
    half_month_convention: Option<HalfMonthConvention>,
}

impl AllocateArgs {
    pub fn new(
        amount: Amount,
        granularity: Granularity,
        period: impl Into<String>,
        half_month_convention: Option<HalfMonthConvention>,
    ) -> Self {
        Self {
            amount,
            granularity,
            period: period.into(),
            half_month_convention,
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn half_month_convention(&self) -> Option<HalfMonthConvention> {
        self.half_month_convention
    }
}

/// Args for the `budget periods` command.
#[derive(Debug, Parser, Clone)]
pub struct PeriodsArgs {
    /// The budget id.
    #[arg(long)]
    budget: String,

    /// The granularity of the periods to list.
    #[arg(long, value_enum)]
    granularity: Granularity,

    /// The last date to cover for budgets with no end date, e.g. 2025-12-31
    #[arg(long)]
    through: NaiveDate,
}

impl PeriodsArgs {
    pub fn new(budget: impl Into<String>, granularity: Granularity, through: NaiveDate) -> Self {
        Self {
            budget: budget.into(),
            granularity,
            through,
        }
    }

    pub fn budget(&self) -> &str {
        &self.budget
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn through(&self) -> NaiveDate {
        self.through
    }
}

/// Args for the `budget validate` command.
#[derive(Debug, Parser, Clone)]
pub struct ValidateArgs {
    /// The transaction id.
    #[arg(long)]
    transaction: String,

    /// Save the rebalanced splits. Without this flag nothing is written.
    #[arg(long)]
    write: bool,
}

impl ValidateArgs {
    pub fn new(transaction: impl Into<String>, write: bool) -> Self {
        Self {
            transaction: transaction.into(),
            write,
        }
    }

    pub fn transaction(&self) -> &str {
        &self.transaction
    }

    pub fn write(&self) -> bool {
        self.write
    }
}

/// Args for the `budget reassign` command.
#[derive(Debug, Parser, Clone)]
pub struct ReassignArgs {
    #[command(subcommand)]
    trigger: ReassignSubcommand,
}

impl ReassignArgs {
    pub fn new(trigger: ReassignSubcommand) -> Self {
        Self { trigger }
    }

    pub fn trigger(&self) -> &ReassignSubcommand {
        &self.trigger
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReassignSubcommand {
    /// Categories were added to or removed from a budget. Save the budget's new categories first.
    Categories(CategoriesArgs),
    /// A budget was deactivated. Its splits move to the best remaining match.
    Deleted(DeletedArgs),
}

/// Args for the `budget reassign categories` command.
#[derive(Debug, Parser, Clone)]
pub struct CategoriesArgs {
    /// The budget whose categories changed.
    #[arg(long)]
    budget: String,

    /// A category that was added. May be repeated.
    #[arg(long = "added")]
    added: Vec<String>,

    /// A category that was removed. May be repeated.
    #[arg(long = "removed")]
    removed: Vec<String>,
}

impl CategoriesArgs {
    pub fn new(budget: impl Into<String>, added: Vec<String>, removed: Vec<String>) -> Self {
        Self {
            budget: budget.into(),
            added,
            removed,
        }
    }

    pub fn budget(&self) -> &str {
        &self.budget
    }

    pub fn added(&self) -> &[String] {
        &self.added
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }
}

/// Args for the `budget reassign deleted` command.
#[derive(Debug, Parser, Clone)]
pub struct DeletedArgs {
    /// The deactivated budget.
    #[arg(long)]
    budget: String,
}

impl DeletedArgs {
    pub fn new(budget: impl Into<String>) -> Self {
        Self {
            budget: budget.into(),
        }
    }

    pub fn budget(&self) -> &str {
        &self.budget
    }
}

fn default_budget_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("budget"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --budget-home or BUDGET_HOME instead of relying on the default \
                budget home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("budget")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reassign_categories() {
        let args = Args::try_parse_from([
            "budget",
            "--budget-home",
            "/tmp/b",
            "reassign",
            "categories",
            "--budget",
            "g",
            "--added",
            "Food",
            "--added",
            "Travel",
            "--removed",
            "Household",
        ])
        .unwrap();
        assert_eq!(args.common().budget_home().path(), Path::new("/tmp/b"));
        let Command::Reassign(reassign) = args.command() else {
            panic!("expected reassign, got {:?}", args.command());
        };
        let ReassignSubcommand::Categories(c) = reassign.trigger() else {
            panic!("expected categories");
        };
        assert_eq!(c.budget(), "g");
        assert_eq!(c.added(), ["Food", "Travel"]);
        assert_eq!(c.removed(), ["Household"]);
    }

    #[test]
    fn test_parse_allocate() {
        let args = Args::try_parse_from([
            "budget",
            "--log-level",
            "debug",
            "allocate",
            "--amount",
            "$1,000.00",
            "--granularity",
            "half_month",
            "--period",
            "2025W05",
        ])
        .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Allocate(a) = args.command() else {
            panic!("expected allocate");
        };
        assert_eq!(a.amount(), Amount::from_cents(100000));
        assert_eq!(a.granularity(), Granularity::HalfMonth);
        assert_eq!(a.half_month_convention(), None);
    }
}
