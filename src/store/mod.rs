//! The persistence collaborator consumed by the reassignment engine.
//!
//! A `Store` offers reads and an atomic batch write. It gives read-your-writes consistency within
//! a single call and nothing more: callers must not rely on isolation between calls.

mod memory;

pub use memory::MemoryStore;

use crate::error::Res;
use crate::model::{Budget, BudgetId, Transaction};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// The largest number of writes a single `batch_write` call accepts.
pub const MAX_BATCH_SIZE: usize = 500;

/// Selects budgets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetFilter {
    pub owner_id: String,
    /// When true, deactivated budgets are excluded.
    pub active_only: bool,
}

impl BudgetFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            active_only: false,
        }
    }

    pub fn active(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn matches(&self, budget: &Budget) -> bool {
        budget.owner_id == self.owner_id && (!self.active_only || budget.is_active)
    }
}

/// Selects transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub owner_id: String,
    /// Inclusive lower bound on the transaction date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the transaction date.
    pub date_to: Option<NaiveDate>,
    /// When non-empty, only transactions with at least one split on one of these budgets.
    pub assigned_to: BTreeSet<BudgetId>,
}

impl TransactionFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: NaiveDate, to: Option<NaiveDate>) -> Self {
        self.date_from = Some(from);
        self.date_to = to;
        self
    }

    pub fn assigned_to(mut self, budgets: impl IntoIterator<Item = BudgetId>) -> Self {
        self.assigned_to = budgets.into_iter().collect();
        self
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.owner_id == self.owner_id
            && self.date_from.map_or(true, |from| transaction.date >= from)
            && self.date_to.map_or(true, |to| transaction.date <= to)
            && (self.assigned_to.is_empty() || transaction.has_split_on(self.assigned_to.iter()))
    }
}

/// A single document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    PutBudget(Budget),
    PutTransaction(Transaction),
}

impl WriteOp {
    /// A label such as `transaction t1`, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            WriteOp::PutBudget(b) => format!("budget {}", b.id),
            WriteOp::PutTransaction(t) => format!("transaction {}", t.id),
        }
    }
}

/// The persistence collaborator.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_budget(&self, id: &BudgetId) -> Res<Option<Budget>>;

    async fn get_transaction(&self, id: &str) -> Res<Option<Transaction>>;

    async fn query_budgets(&self, filter: &BudgetFilter) -> Res<Vec<Budget>>;

    /// Transactions matching `filter`, ordered by date then id.
    async fn query_transactions(&self, filter: &TransactionFilter) -> Res<Vec<Transaction>>;

    /// Applies all of `ops` atomically: either every write lands or none does. Implementations
    /// reject batches larger than `MAX_BATCH_SIZE`.
    async fn batch_write(&self, ops: &[WriteOp]) -> Res<()>;
}
