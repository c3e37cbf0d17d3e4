use crate::model::{Amount, BudgetId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A transaction and its ordered splits.
///
/// The splits of a stored transaction always sum to `amount` within one minor unit, and exactly
/// one split is the default split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    pub id: String,
    pub owner_id: String,
    pub date: NaiveDate,
    pub amount: Amount,
    #[serde(default)]
    pub splits: Vec<Split>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        date: NaiveDate,
        amount: Amount,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            date,
            amount,
            splits: Vec::new(),
        }
    }

    pub fn with_splits(mut self, splits: Vec<Split>) -> Self {
        self.splits = splits;
        self
    }

    pub fn splits_total(&self) -> Amount {
        self.splits.iter().map(|s| s.amount).sum()
    }

    /// True if any split is currently assigned to one of `budgets`.
    pub fn has_split_on<'a>(&self, mut budgets: impl Iterator<Item = &'a BudgetId>) -> bool {
        budgets.any(|b| self.splits.iter().any(|s| &s.budget_id == b))
    }
}

/// Per-split flags carried through unchanged by this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SplitFlags {
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub refund: bool,
    #[serde(default)]
    pub tax_deductible: bool,
}

/// A portion of a transaction's amount assigned to a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Split {
    pub split_id: String,
    pub budget_id: BudgetId,
    pub amount: Amount,
    #[serde(default)]
    pub category_primary: String,
    #[serde(default)]
    pub category_detailed: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub flags: SplitFlags,
    /// When set, matching uses this date instead of the transaction date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<NaiveDate>,
}

impl Split {
    pub fn new(
        split_id: impl Into<String>,
        budget_id: impl Into<BudgetId>,
        amount: Amount,
    ) -> Self {
        Self {
            split_id: split_id.into(),
            budget_id: budget_id.into(),
            amount,
            category_primary: String::new(),
            category_detailed: String::new(),
            is_default: false,
            flags: SplitFlags::default(),
            payment_date: None,
        }
    }

    /// A non-default split on the `"unassigned"` sentinel with no category override.
    pub fn unassigned(split_id: impl Into<String>, amount: Amount) -> Self {
        Self::new(split_id, BudgetId::unassigned(), amount)
    }

    pub fn with_category(
        mut self,
        primary: impl Into<String>,
        detailed: impl Into<String>,
    ) -> Self {
        self.category_primary = primary.into();
        self.category_detailed = detailed.into();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_payment_date(mut self, date: NaiveDate) -> Self {
        self.payment_date = Some(date);
        self
    }

    /// The date used for budget matching: the payment date, else the transaction date.
    pub fn match_date(&self, transaction_date: NaiveDate) -> NaiveDate {
        self.payment_date.unwrap_or(transaction_date)
    }

    /// The categories this split can match on, most specific first. Empty values are skipped.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        [self.category_detailed.as_str(), self.category_primary.as_str()]
            .into_iter()
            .filter(|c| !c.is_empty())
    }
}
