use crate::args::ValidateArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{Amount, Split};
use crate::reassign::OwnerBudgets;
use crate::splits::{Redistributor, SplitValidation};
use crate::store::{BudgetFilter, Store, WriteOp};
use crate::{Config, Error, Result};
use serde::Serialize;
use tracing::info;

/// The result of `budget validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOut {
    pub transaction_id: String,
    pub amount: Amount,
    pub valid: bool,
    pub written: bool,
    /// The splits as they are after validation.
    pub splits: Vec<Split>,
}

/// Checks a stored transaction's splits against its amount. A shortfall is routed to the owner's
/// catch-all budget, or `"unassigned"` when there is none. Rebalanced splits are only saved when
/// requested.
///
/// # Errors
/// - `InvalidInput` if the transaction does not exist
/// - `MalformedAmount` if the amount or a split amount is unusable
/// - `Database` if reading or writing fails
pub async fn validate(config: Config, args: ValidateArgs) -> Result<Out<ValidationOut>> {
    let db = config.db();
    let mut transaction = db
        .get_transaction(args.transaction())
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| {
            Error::msg(
                ErrorType::InvalidInput,
                format!("Transaction '{}' not found", args.transaction()),
            )
        })?;
    let budgets = db
        .query_budgets(&BudgetFilter::owner(&transaction.owner_id))
        .await
        .pub_result(ErrorType::Database)?;
    let catch_all = OwnerBudgets::new(budgets).catch_all().cloned();

    let validation =
        Redistributor::new(catch_all).validate(transaction.amount, &transaction.splits)?;
    let valid = validation.is_valid();
    if let SplitValidation::Redistributed(splits) = validation {
        transaction.splits = splits;
    }

    let written = !valid && args.write();
    if written {
        db.batch_write(&[WriteOp::PutTransaction(transaction.clone())])
            .await
            .pub_result(ErrorType::Database)?;
        info!("Saved rebalanced splits for transaction {}", transaction.id);
    }

    let message = match (valid, written) {
        (true, _) => format!("The splits of transaction {} add up", transaction.id),
        (false, true) => format!(
            "Rebalanced and saved the splits of transaction {}",
            transaction.id
        ),
        (false, false) => format!(
            "The splits of transaction {} do not add up, \
             pass --write to save the rebalanced splits",
            transaction.id
        ),
    };
    Ok(Out::new(
        message,
        ValidationOut {
            transaction_id: transaction.id,
            amount: transaction.amount,
            valid,
            written,
            splits: transaction.splits,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BudgetId, Transaction};
    use crate::test::{date, TestEnv};

    async fn env_with_short_transaction() -> TestEnv {
        let env = TestEnv::new().await;
        env.insert_sample_data().await;
        let short = Transaction::new("short", "u1", date("2025-02-05"), Amount::from_cents(5000))
            .with_splits(vec![
                Split::new("a", "food", Amount::from_cents(2000)).as_default(),
                Split::new("b", "food", Amount::from_cents(2000)),
            ]);
        env.insert(Vec::new(), vec![short]).await;
        env
    }

    #[tokio::test]
    async fn test_validate_valid_transaction() {
        let env = TestEnv::new().await;
        env.insert_sample_data().await;
        let out = validate(env.config(), ValidateArgs::new("t1", false))
            .await
            .unwrap();
        let result = out.structure().unwrap();
        assert!(result.valid);
        assert!(!result.written);
    }

    #[tokio::test]
    async fn test_validate_dry_run_does_not_write() {
        let env = env_with_short_transaction().await;
        let config = env.config();
        let out = validate(config.clone(), ValidateArgs::new("short", false))
            .await
            .unwrap();
        let result = out.structure().unwrap();
        assert!(!result.valid);
        assert_eq!(result.splits.len(), 3);
        assert_eq!(result.splits[2].budget_id, BudgetId::from("everything"));
        let stored = config.db().get_transaction("short").await.unwrap().unwrap();
        assert_eq!(stored.splits.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_write() {
        let env = env_with_short_transaction().await;
        let config = env.config();
        validate(config.clone(), ValidateArgs::new("short", true))
            .await
            .unwrap();
        let stored = config.db().get_transaction("short").await.unwrap().unwrap();
        assert_eq!(stored.splits_total(), Amount::from_cents(5000));
    }

    #[tokio::test]
    async fn test_validate_missing_transaction() {
        let env = TestEnv::new().await;
        let err = validate(env.config(), ValidateArgs::new("nope", false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }
}
