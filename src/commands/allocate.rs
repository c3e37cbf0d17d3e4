use crate::allocation::{Allocator, BudgetPeriodAllocation, HalfMonthConvention};
use crate::args::{AllocateArgs, PeriodsArgs};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{Amount, BudgetId, CalendarCatalog, CalendarPeriod, Granularity};
use crate::store::Store;
use crate::{Config, Error, Result};

/// The result of `budget allocate`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AllocationOut {
    pub amount: Amount,
    pub granularity: Granularity,
    pub half_month_convention: HalfMonthConvention,
    pub period: CalendarPeriod,
    pub allocated: Amount,
}

/// Allocates an amount to one period from the calendar catalog.
///
/// # Errors
/// - `Calendar` if the catalog cannot be loaded or has no period with the given id
pub async fn allocate(config: Config, args: AllocateArgs) -> Result<Out<AllocationOut>> {
    let catalog = config.catalog().await.pub_result(ErrorType::Calendar)?;
    let period = catalog.period(args.period()).ok_or_else(|| {
        Error::msg(
            ErrorType::Calendar,
            format!("No calendar period with id '{}'", args.period()),
        )
    })?;
    let convention = args
        .half_month_convention()
        .unwrap_or_else(|| config.half_month_convention());
    let allocated = Allocator::new(convention).allocate(args.amount(), args.granularity(), &period);

    Ok(Out::new(
        format!(
            "{} {} allocates {} to {} ({} to {})",
            args.amount(),
            args.granularity(),
            allocated,
            period.id,
            period.start,
            period.end
        ),
        AllocationOut {
            amount: args.amount(),
            granularity: args.granularity(),
            half_month_convention: convention,
            period,
            allocated,
        },
    ))
}

/// Lists the budget period records of a budget for every catalog period of the requested
/// granularity.
///
/// # Errors
/// - `BudgetNotFound` if the budget does not exist
/// - `Calendar` if the catalog cannot be loaded
/// - `Database` if reading the budget fails
pub async fn periods(
    config: Config,
    args: PeriodsArgs,
) -> Result<Out<Vec<BudgetPeriodAllocation>>> {
    let budget_id = BudgetId::from(args.budget());
    let budget = config
        .db()
        .get_budget(&budget_id)
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| {
            Error::msg(
                ErrorType::BudgetNotFound,
                format!("Budget '{budget_id}' not found"),
            )
        })?;
    let catalog = config.catalog().await.pub_result(ErrorType::Calendar)?;
    let records =
        config
            .allocator()
            .budget_periods(&budget, &catalog, args.granularity(), args.through());
    let total: Amount = records.iter().map(|r| r.allocated).sum();
    Ok(Out::new(
        format!(
            "Budget {} allocates {} across {} {} periods",
            budget.id,
            total,
            records.len(),
            args.granularity()
        ),
        records,
    ))
}
