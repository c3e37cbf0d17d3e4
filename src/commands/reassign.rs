use crate::args::{CategoriesArgs, DeletedArgs};
use crate::commands::Out;
use crate::error::ErrorType;
use crate::model::BudgetId;
use crate::reassign::{CategoryChange, DeletionResult, ReassignmentResult, Reassigner};
use crate::{Config, Error, Result};
use tracing::warn;

/// Reassigns splits after categories were added to or removed from a budget. The budget must
/// already be saved with its new categories.
///
/// # Errors
/// Everything `Reassigner::category_change` returns, plus `Database` when not a single write
/// succeeded.
pub async fn reassign_categories(
    config: Config,
    args: CategoriesArgs,
) -> Result<Out<ReassignmentResult>> {
    let change = CategoryChange::new(args.budget())
        .added(args.added().iter().cloned())
        .removed(args.removed().iter().cloned());
    let result = Reassigner::new(config.db())
        .with_max_batch_size(config.max_batch_size())
        .category_change(&change)
        .await?;
    check(result.success, &result.errors)?;
    Ok(Out::new(
        format!(
            "Reassigned {} splits across {} transactions{}",
            result.splits_reassigned,
            result.transactions_reassigned,
            error_suffix(&result.errors)
        ),
        result,
    ))
}

/// Moves the splits of a deactivated budget to the best remaining match.
///
/// # Errors
/// Everything `Reassigner::budget_deleted` returns, plus `Database` when not a single write
/// succeeded.
pub async fn reassign_deleted(config: Config, args: DeletedArgs) -> Result<Out<DeletionResult>> {
    let result = Reassigner::new(config.db())
        .with_max_batch_size(config.max_batch_size())
        .budget_deleted(&BudgetId::from(args.budget()))
        .await?;
    check(result.success, &result.errors)?;
    let destinations: Vec<String> = result
        .budget_assignments
        .iter()
        .map(|(budget, count)| format!("{budget}: {count}"))
        .collect();
    Ok(Out::new(
        format!(
            "Moved {} splits off budget {} ({}){}",
            result.splits_reassigned,
            args.budget(),
            destinations.join(", "),
            error_suffix(&result.errors)
        ),
        result,
    ))
}

fn check(success: bool, errors: &[String]) -> Result<()> {
    for e in errors {
        warn!("{e}");
    }
    if !success {
        return Err(Error::msg(
            ErrorType::Database,
            format!("No reassignment could be written: {}", errors.join("; ")),
        ));
    }
    Ok(())
}

fn error_suffix(errors: &[String]) -> String {
    match errors.len() {
        0 => String::new(),
        n => format!(", {n} transactions failed"),
    }
}
