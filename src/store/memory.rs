//! An in-memory `Store`.
//!
//! Useful for tests and for callers that stage data before persisting it elsewhere. Individual
//! documents can be made to fail on write to exercise partial-failure handling.

use crate::error::Res;
use crate::model::{Budget, BudgetId, Transaction};
use crate::store::{BudgetFilter, Store, TransactionFilter, WriteOp, MAX_BATCH_SIZE};
use anyhow::{anyhow, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    budgets: BTreeMap<BudgetId, Budget>,
    transactions: BTreeMap<String, Transaction>,
    failing_transactions: BTreeSet<String>,
    batch_sizes: Vec<usize>,
}

/// An in-memory implementation of `Store`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with `budgets` and `transactions`.
    pub fn with_data(
        budgets: impl IntoIterator<Item = Budget>,
        transactions: impl IntoIterator<Item = Transaction>,
    ) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for b in budgets {
                state.budgets.insert(b.id.clone(), b);
            }
            for t in transactions {
                state.transactions.insert(t.id.clone(), t);
            }
        }
        store
    }

    /// Any batch containing a write to transaction `id` will fail.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.lock().failing_transactions.insert(id.into());
    }

    /// The size of every `batch_write` call made so far, in order, including failed ones.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    /// A snapshot of a stored transaction.
    pub fn transaction(&self, id: &str) -> Option<Transaction> {
        self.lock().transactions.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every mutation completes under the guard, so poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_budget(&self, id: &BudgetId) -> Res<Option<Budget>> {
        Ok(self.lock().budgets.get(id).cloned())
    }

    async fn get_transaction(&self, id: &str) -> Res<Option<Transaction>> {
        Ok(self.lock().transactions.get(id).cloned())
    }

    async fn query_budgets(&self, filter: &BudgetFilter) -> Res<Vec<Budget>> {
        Ok(self
            .lock()
            .budgets
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }

    async fn query_transactions(&self, filter: &TransactionFilter) -> Res<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .lock()
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Res<()> {
        let mut state = self.lock();
        state.batch_sizes.push(ops.len());
        if ops.len() > MAX_BATCH_SIZE {
            bail!(
                "Batch of {} writes exceeds the maximum of {MAX_BATCH_SIZE}",
                ops.len()
            );
        }

        // Validate everything first so that a failing batch leaves no partial writes behind.
        if let Some(op) = ops.iter().find(|op| match op {
            WriteOp::PutTransaction(t) => state.failing_transactions.contains(&t.id),
            WriteOp::PutBudget(_) => false,
        }) {
            return Err(anyhow!("Write rejected for {}", op.describe()));
        }

        for op in ops {
            match op {
                WriteOp::PutBudget(b) => {
                    state.budgets.insert(b.id.clone(), b.clone());
                }
                WriteOp::PutTransaction(t) => {
                    state.transactions.insert(t.id.clone(), t.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Split};
    use crate::test::date;

    fn txn(id: &str) -> Transaction {
        Transaction::new(id, "u1", date("2025-01-01"), Amount::from_cents(100))
            .with_splits(vec![Split::new("s", "b1", Amount::from_cents(100)).as_default()])
    }

    #[tokio::test]
    async fn test_batch_write_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.fail_writes_for("bad");
        let ops = vec![
            WriteOp::PutTransaction(txn("good")),
            WriteOp::PutTransaction(txn("bad")),
        ];
        let err = store.batch_write(&ops).await.unwrap_err();
        assert!(err.to_string().contains("transaction bad"));
        assert!(store.get_transaction("good").await.unwrap().is_none());

        store
            .batch_write(&[WriteOp::PutTransaction(txn("good"))])
            .await
            .unwrap();
        assert!(store.get_transaction("good").await.unwrap().is_some());
        assert_eq!(store.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_batch_write_rejects_oversized_batches() {
        let store = MemoryStore::new();
        let ops: Vec<_> = (0..=MAX_BATCH_SIZE)
            .map(|i| WriteOp::PutTransaction(txn(&format!("t{i}"))))
            .collect();
        assert!(store.batch_write(&ops).await.is_err());
        assert!(store.get_transaction("t0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_transactions_sorted_by_date() {
        let mut late = txn("a");
        late.date = date("2025-03-01");
        let early = txn("b");
        let store = MemoryStore::with_data(Vec::new(), vec![late, early]);
        let found = store
            .query_transactions(&TransactionFilter::owner("u1"))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
