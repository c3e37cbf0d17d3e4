use crate::error::{ErrorType, IntoResult, Result};
use crate::model::{Budget, BudgetId, CategoryId, Split, Transaction};
use crate::reassign::matcher::{OwnerBudgets, SplitMatcher};
use crate::store::{BudgetFilter, Store, TransactionFilter, WriteOp, MAX_BATCH_SIZE};
use crate::Error;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::once;
use tracing::{debug, info, warn};

/// Categories added to and removed from a budget. The budget in the store is expected to already
/// carry its new categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryChange {
    pub budget_id: BudgetId,
    pub categories_added: BTreeSet<CategoryId>,
    pub categories_removed: BTreeSet<CategoryId>,
}

impl CategoryChange {
    pub fn new(budget_id: impl Into<BudgetId>) -> Self {
        Self {
            budget_id: budget_id.into(),
            ..Default::default()
        }
    }

    pub fn added<S: Into<CategoryId>>(mut self, categories: impl IntoIterator<Item = S>) -> Self {
        self.categories_added
            .extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn removed<S: Into<CategoryId>>(mut self, categories: impl IntoIterator<Item = S>) -> Self {
        self.categories_removed
            .extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.categories_added.is_empty() && self.categories_removed.is_empty()
    }
}

/// The summary of a category-change reassignment.
///
/// `success` is false only when nothing could be written and at least one write failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReassignmentResult {
    pub success: bool,
    pub transactions_reassigned: usize,
    pub splits_reassigned: usize,
    pub errors: Vec<String>,
}

/// The summary of a deletion reassignment. `budget_assignments` counts the splits moved to each
/// destination, `"unassigned"` included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    pub success: bool,
    pub transactions_reassigned: usize,
    pub splits_reassigned: usize,
    pub budget_assignments: BTreeMap<BudgetId, usize>,
    pub errors: Vec<String>,
}

/// A split that changes budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMove {
    pub split_id: String,
    pub from: BudgetId,
    pub to: BudgetId,
}

/// A transaction with its splits already moved, and the moves that were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub transaction: Transaction,
    pub moves: Vec<SplitMove>,
}

/// Every write a reassignment intends to make. Building a plan does no I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassignmentPlan {
    updates: Vec<PlannedUpdate>,
}

impl ReassignmentPlan {
    /// Runs `matcher` over each split for which `select` returns true. Transactions where no
    /// split changes budget are left out of the plan.
    pub fn build(
        transactions: impl IntoIterator<Item = Transaction>,
        matcher: &dyn SplitMatcher,
        mut select: impl FnMut(&Transaction, &Split) -> bool,
    ) -> Self {
        let mut updates = Vec::new();
        for mut transaction in transactions {
            let targets: Vec<Option<BudgetId>> = transaction
                .splits
                .iter()
                .map(|split| {
                    if !select(&transaction, split) {
                        return None;
                    }
                    let to = matcher
                        .assign(split, split.match_date(transaction.date))
                        .budget_id();
                    (to != split.budget_id).then_some(to)
                })
                .collect();

            let mut moves = Vec::new();
            for (split, to) in transaction.splits.iter_mut().zip(targets) {
                if let Some(to) = to {
                    let from = std::mem::replace(&mut split.budget_id, to.clone());
                    moves.push(SplitMove {
                        split_id: split.split_id.clone(),
                        from,
                        to,
                    });
                }
            }
            if !moves.is_empty() {
                updates.push(PlannedUpdate { transaction, moves });
            }
        }
        Self { updates }
    }

    pub fn updates(&self) -> &[PlannedUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn split_count(&self) -> usize {
        self.updates.iter().map(|u| u.moves.len()).sum()
    }
}

/// What actually landed in the store.
struct Applied<'p> {
    written: Vec<&'p PlannedUpdate>,
    errors: Vec<String>,
}

impl Applied<'_> {
    fn success(&self) -> bool {
        !self.written.is_empty() || self.errors.is_empty()
    }

    fn splits(&self) -> usize {
        self.written.iter().map(|u| u.moves.len()).sum()
    }
}

/// Runs reassignments against a `Store`.
pub struct Reassigner<'a> {
    store: &'a dyn Store,
    max_batch_size: usize,
}

impl<'a> Reassigner<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Caps the number of transactions per write. Values are clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Reassigns splits after categories were added to or removed from a budget.
    ///
    /// - Added categories pull matching splits off the catch-all and `"unassigned"` when the
    ///   transaction date falls within the budget's range. Splits on any specific budget stay
    ///   put.
    /// - Removed categories re-evaluate every split of every transaction that has a split on the
    ///   edited budget. Such transactions are not also considered for the added categories.
    ///
    /// # Errors
    /// - `InvalidInput` if a category is both added and removed
    /// - `BudgetNotFound` if the budget does not exist
    /// - `MissingOwner` if the budget has no owner
    /// - `Database` if reading from the store fails
    ///
    /// Write failures do not produce an error; they are collected in the result.
    pub async fn category_change(&self, change: &CategoryChange) -> Result<ReassignmentResult> {
        let both: Vec<&str> = change
            .categories_added
            .intersection(&change.categories_removed)
            .map(String::as_str)
            .collect();
        if !both.is_empty() {
            return Err(Error::msg(
                ErrorType::InvalidInput,
                format!("Categories both added and removed: {}", both.join(", ")),
            ));
        }

        let budget = self.budget(&change.budget_id).await?;
        require_owner(&budget)?;
        if change.is_empty() {
            debug!("No category changes for budget {}", budget.id);
            return Ok(ReassignmentResult {
                success: true,
                ..Default::default()
            });
        }

        let owner_budgets = self.owner_budgets(&budget.owner_id).await?;
        let fallbacks: BTreeSet<BudgetId> = owner_budgets
            .iter()
            .filter(|b| b.is_catch_all)
            .map(|b| b.id.clone())
            .chain(once(BudgetId::unassigned()))
            .collect();

        let mut candidates: BTreeMap<String, Transaction> = BTreeMap::new();
        let mut full_reevaluation = BTreeSet::new();
        if !change.categories_removed.is_empty() {
            let filter =
                TransactionFilter::owner(&budget.owner_id).assigned_to([budget.id.clone()]);
            for t in self.transactions(&filter).await? {
                full_reevaluation.insert(t.id.clone());
                candidates.insert(t.id.clone(), t);
            }
        }
        if !change.categories_added.is_empty() {
            let filter = TransactionFilter::owner(&budget.owner_id)
                .between(budget.start_date, budget.end_date)
                .assigned_to(fallbacks.iter().cloned());
            for t in self.transactions(&filter).await? {
                candidates.entry(t.id.clone()).or_insert(t);
            }
        }

        let matcher = OwnerBudgets::new(owner_budgets);
        let plan = ReassignmentPlan::build(candidates.into_values(), &matcher, |t, split| {
            full_reevaluation.contains(&t.id)
                || (fallbacks.contains(&split.budget_id)
                    && budget.covers(t.date)
                    && split
                        .categories()
                        .any(|c| change.categories_added.contains(c)))
        });
        info!(
            "Category change on budget {}: moving {} splits across {} transactions",
            budget.id,
            plan.split_count(),
            plan.updates().len()
        );

        let applied = self.apply(&plan).await;
        Ok(ReassignmentResult {
            success: applied.success(),
            transactions_reassigned: applied.written.len(),
            splits_reassigned: applied.splits(),
            errors: applied.errors,
        })
    }

    /// Moves every split off a deactivated budget onto the best surviving match, the catch-all,
    /// or `"unassigned"`.
    ///
    /// # Errors
    /// - `BudgetNotFound` if the budget does not exist
    /// - `BudgetStillActive` if the budget has not been deactivated
    /// - `MissingOwner` if the budget has no owner
    /// - `Database` if reading from the store fails
    pub async fn budget_deleted(&self, budget_id: &BudgetId) -> Result<DeletionResult> {
        let budget = self.budget(budget_id).await?;
        if budget.is_active {
            return Err(Error::msg(
                ErrorType::BudgetStillActive,
                format!(
                    "Budget '{budget_id}' must be deactivated before its splits are reassigned"
                ),
            ));
        }
        require_owner(&budget)?;

        let owner_budgets = self.owner_budgets(&budget.owner_id).await?;
        let matcher = OwnerBudgets::excluding(owner_budgets, Some(&budget.id));
        let filter = TransactionFilter::owner(&budget.owner_id).assigned_to([budget.id.clone()]);
        let transactions = self.transactions(&filter).await?;
        let plan = ReassignmentPlan::build(transactions, &matcher, |_, split| {
            split.budget_id == budget.id
        });
        info!(
            "Budget {} deleted: moving {} splits across {} transactions",
            budget.id,
            plan.split_count(),
            plan.updates().len()
        );

        let applied = self.apply(&plan).await;
        let mut budget_assignments = BTreeMap::new();
        for m in applied.written.iter().flat_map(|u| &u.moves) {
            *budget_assignments.entry(m.to.clone()).or_insert(0) += 1;
        }
        Ok(DeletionResult {
            success: applied.success(),
            transactions_reassigned: applied.written.len(),
            splits_reassigned: applied.splits(),
            budget_assignments,
            errors: applied.errors,
        })
    }

    /// Writes the plan in batches. When a batch fails, its transactions are retried one at a time
    /// so that only the failing ones are reported.
    async fn apply<'p>(&self, plan: &'p ReassignmentPlan) -> Applied<'p> {
        let mut applied = Applied {
            written: Vec::new(),
            errors: Vec::new(),
        };
        for (n, chunk) in plan.updates.chunks(self.max_batch_size).enumerate() {
            let ops: Vec<WriteOp> = chunk
                .iter()
                .map(|u| WriteOp::PutTransaction(u.transaction.clone()))
                .collect();
            match self.store.batch_write(&ops).await {
                Ok(()) => {
                    debug!("Wrote batch {} with {} transactions", n + 1, ops.len());
                    applied.written.extend(chunk.iter());
                }
                Err(e) => {
                    warn!(
                        "Batch {} with {} transactions failed, retrying individually: {e:#}",
                        n + 1,
                        ops.len()
                    );
                    for (update, op) in chunk.iter().zip(&ops) {
                        match self.store.batch_write(std::slice::from_ref(op)).await {
                            Ok(()) => applied.written.push(update),
                            Err(e) => {
                                let message = format!("{}: {e:#}", op.describe());
                                warn!("Reassignment write failed for {message}");
                                applied.errors.push(message);
                            }
                        }
                    }
                }
            }
        }
        applied
    }

    async fn budget(&self, id: &BudgetId) -> Result<Budget> {
        self.store
            .get_budget(id)
            .await
            .pub_result(ErrorType::Database)?
            .ok_or_else(|| {
                Error::msg(ErrorType::BudgetNotFound, format!("Budget '{id}' not found"))
            })
    }

    async fn owner_budgets(&self, owner_id: &str) -> Result<Vec<Budget>> {
        self.store
            .query_budgets(&BudgetFilter::owner(owner_id))
            .await
            .pub_result(ErrorType::Database)
    }

    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.store
            .query_transactions(filter)
            .await
            .pub_result(ErrorType::Database)
    }
}

fn require_owner(budget: &Budget) -> Result<()> {
    if budget.owner_id.trim().is_empty() {
        return Err(Error::msg(
            ErrorType::MissingOwner,
            format!("Budget '{}' has no owner", budget.id),
        ));
    }
    Ok(())
}
