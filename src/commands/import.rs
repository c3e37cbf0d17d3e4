use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{Budget, BudgetId, Transaction};
use crate::reassign::OwnerBudgets;
use crate::splits::Redistributor;
use crate::store::{BudgetFilter, Store, WriteOp};
use crate::{utils, Config, Error, Result};
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub budgets: usize,
    pub transactions: usize,
    /// Transactions whose splits were rebalanced before saving.
    pub redistributed: Vec<String>,
    /// Row counts after the import.
    pub total_budgets: u64,
    pub total_transactions: u64,
}

/// Loads budgets and transactions from JSON files into the database, replacing any documents with
/// the same ids. Budgets are written first so that transaction splits can be rebalanced onto the
/// owner's catch-all budget.
///
/// # Errors
/// - `InvalidInput` if a file cannot be read or parsed
/// - `MissingOwner` if a budget or transaction has no owner id
/// - `MalformedAmount` if a transaction amount or split amount is unusable
/// - `Database` if a write fails
pub async fn import(
    config: Config,
    args: crate::args::ImportArgs,
) -> Result<Out<ImportSummary>> {
    let budgets: Vec<Budget> = match args.budgets() {
        Some(path) => utils::deserialize(path)
            .await
            .pub_result(ErrorType::InvalidInput)?,
        None => Vec::new(),
    };
    let mut transactions: Vec<Transaction> = match args.transactions() {
        Some(path) => utils::deserialize(path)
            .await
            .pub_result(ErrorType::InvalidInput)?,
        None => Vec::new(),
    };

    if let Some(b) = budgets.iter().find(|b| b.owner_id.trim().is_empty()) {
        return Err(Error::msg(
            ErrorType::MissingOwner,
            format!("Budget '{}' has no owner", b.id),
        ));
    }
    if let Some(t) = transactions.iter().find(|t| t.owner_id.trim().is_empty()) {
        return Err(Error::msg(
            ErrorType::MissingOwner,
            format!("Transaction '{}' has no owner", t.id),
        ));
    }

    let db = config.db();
    let batch_size = config.max_batch_size();
    let budget_ops: Vec<WriteOp> = budgets.into_iter().map(WriteOp::PutBudget).collect();
    write_all(db, &budget_ops, batch_size).await?;

    // Rebalance every transaction before writing any of them.
    let mut catch_alls: BTreeMap<String, Option<BudgetId>> = BTreeMap::new();
    let mut redistributed = Vec::new();
    for transaction in transactions.iter_mut() {
        if !catch_alls.contains_key(&transaction.owner_id) {
            let owner_budgets = db
                .query_budgets(&BudgetFilter::owner(&transaction.owner_id))
                .await
                .pub_result(ErrorType::Database)?;
            let catch_all = OwnerBudgets::new(owner_budgets).catch_all().cloned();
            catch_alls.insert(transaction.owner_id.clone(), catch_all);
        }
        let catch_all = catch_alls.get(&transaction.owner_id).cloned().flatten();
        if Redistributor::new(catch_all).reconcile(transaction)? {
            debug!("Rebalanced the splits of transaction {}", transaction.id);
            redistributed.push(transaction.id.clone());
        }
    }
    let transaction_ops: Vec<WriteOp> = transactions
        .into_iter()
        .map(WriteOp::PutTransaction)
        .collect();
    write_all(db, &transaction_ops, batch_size).await?;

    let summary = ImportSummary {
        budgets: budget_ops.len(),
        transactions: transaction_ops.len(),
        redistributed,
        total_budgets: db.count_budgets().await.pub_result(ErrorType::Database)?,
        total_transactions: db
            .count_transactions()
            .await
            .pub_result(ErrorType::Database)?,
    };
    info!(
        "Imported {} budgets and {} transactions, the database now holds {} and {}",
        summary.budgets, summary.transactions, summary.total_budgets, summary.total_transactions
    );
    Ok(Out::new(
        format!(
            "Imported {} budgets and {} transactions ({} rebalanced)",
            summary.budgets,
            summary.transactions,
            summary.redistributed.len()
        ),
        summary,
    ))
}

async fn write_all(store: &dyn Store, ops: &[WriteOp], batch_size: usize) -> Result<()> {
    for chunk in ops.chunks(batch_size.max(1)) {
        store
            .batch_write(chunk)
            .await
            .context("Import failed")
            .pub_result(ErrorType::Database)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ImportArgs;
    use crate::model::Amount;
    use crate::test::TestEnv;

    const BUDGETS: &str = r#"[
        {
            "id": "food",
            "owner_id": "u1",
            "category_ids": ["Food"],
            "amount": "600.00",
            "granularity": "monthly",
            "start_date": "2025-01-01",
            "created_at": "2025-01-01T00:00:00Z"
        },
        {
            "id": "everything",
            "owner_id": "u1",
            "amount": 0,
            "granularity": "monthly",
            "start_date": "2024-01-01",
            "is_catch_all": true,
            "created_at": "2024-01-01T00:00:00Z"
        }
    ]"#;

    const TRANSACTIONS: &str = r#"[
        {
            "id": "t1",
            "owner_id": "u1",
            "date": "2025-02-03",
            "amount": "100.00",
            "splits": [
                {"split_id": "a", "budget_id": "food", "amount": "60.00", "is_default": true},
                {"split_id": "b", "budget_id": "food", "amount": "30.00"}
            ]
        },
        {
            "id": "t2",
            "owner_id": "u1",
            "date": "2025-02-04",
            "amount": "20.00",
            "splits": [
                {"split_id": "a", "budget_id": "food", "amount": "20.00", "is_default": true}
            ]
        }
    ]"#;

    #[tokio::test]
    async fn test_import_rebalances_onto_catch_all() {
        let env = TestEnv::new().await;
        let config = env.config();
        let budgets = config.root().join("budgets.json");
        let transactions = config.root().join("transactions.json");
        utils::write(&budgets, BUDGETS).await.unwrap();
        utils::write(&transactions, TRANSACTIONS).await.unwrap();

        let out = import(
            config.clone(),
            ImportArgs::new(Some(budgets), Some(transactions)),
        )
        .await
        .unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.budgets, 2);
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.redistributed, vec!["t1".to_string()]);
        assert_eq!(summary.total_transactions, 2);

        let t1 = config.db().get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(t1.splits.len(), 3);
        assert_eq!(t1.splits_total(), Amount::from_cents(10000));
        assert_eq!(t1.splits[2].budget_id, BudgetId::from("everything"));
        assert_eq!(t1.splits[2].amount, Amount::from_cents(1000));
    }

    #[tokio::test]
    async fn test_import_rejects_missing_owner() {
        let env = TestEnv::new().await;
        let config = env.config();
        let path = config.root().join("budgets.json");
        let json = r#"[{"id": "b", "owner_id": "", "amount": 1, "granularity": "weekly",
            "start_date": "2025-01-01", "created_at": "2025-01-01T00:00:00Z"}]"#;
        utils::write(&path, json).await.unwrap();
        let err = import(config, ImportArgs::new(Some(path), None))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MissingOwner);
    }

    #[tokio::test]
    async fn test_import_bad_file() {
        let env = TestEnv::new().await;
        let config = env.config();
        let path = config.root().join("missing.json");
        let err = import(config, ImportArgs::new(None, Some(path)))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::InvalidInput);
    }
}
