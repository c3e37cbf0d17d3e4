use crate::model::{Budget, BudgetId, Split};
use chrono::NaiveDate;
use std::cmp::Ordering;
use tracing::warn;

/// Where the matching rule sends a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// A specific, category-restricted budget.
    Budget(BudgetId),
    /// The owner's active catch-all budget.
    CatchAll(BudgetId),
    /// Nothing matched and the owner has no active catch-all.
    Unassigned,
}

impl Assignment {
    pub fn budget_id(&self) -> BudgetId {
        match self {
            Assignment::Budget(id) | Assignment::CatchAll(id) => id.clone(),
            Assignment::Unassigned => BudgetId::unassigned(),
        }
    }
}

/// Decides which budget a split belongs to.
pub trait SplitMatcher {
    /// `as_of` is the date the split is matched on, usually its payment date.
    fn assign(&self, split: &Split, as_of: NaiveDate) -> Assignment;
}

/// The budgets of a single owner, prepared for matching.
///
/// Only active budgets take part. Among specific budgets whose categories contain the split's
/// category and whose date range covers `as_of`, the most recently created wins, then the lowest
/// id. The detailed category is tried before the primary one.
#[derive(Debug, Clone, Default)]
pub struct OwnerBudgets {
    specific: Vec<Budget>,
    catch_all: Option<BudgetId>,
}

impl OwnerBudgets {
    pub fn new(budgets: impl IntoIterator<Item = Budget>) -> Self {
        Self::excluding(budgets, None)
    }

    /// Like `new` but `excluded` never receives a split, even if it is still marked active.
    pub fn excluding(
        budgets: impl IntoIterator<Item = Budget>,
        excluded: Option<&BudgetId>,
    ) -> Self {
        let mut specific = Vec::new();
        let mut catch_alls = Vec::new();
        for budget in budgets {
            if !budget.is_active || Some(&budget.id) == excluded {
                continue;
            }
            if budget.is_catch_all {
                catch_alls.push(budget);
            } else {
                specific.push(budget);
            }
        }
        specific.sort_by(precedence);
        catch_alls.sort_by(precedence);
        if catch_alls.len() > 1 {
            warn!(
                "Found {} active catch-all budgets, using the most recent: {}",
                catch_alls.len(),
                catch_alls[0].id
            );
        }
        Self {
            specific,
            catch_all: catch_alls.into_iter().next().map(|b| b.id),
        }
    }

    pub fn catch_all(&self) -> Option<&BudgetId> {
        self.catch_all.as_ref()
    }

    fn fallback(&self) -> Assignment {
        match &self.catch_all {
            Some(id) => Assignment::CatchAll(id.clone()),
            None => Assignment::Unassigned,
        }
    }
}

/// Most recently created first, then lowest id.
fn precedence(a: &Budget, b: &Budget) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

impl SplitMatcher for OwnerBudgets {
    fn assign(&self, split: &Split, as_of: NaiveDate) -> Assignment {
        for category in split.categories() {
            // `specific` is already in precedence order, so the first hit wins.
            if let Some(budget) = self
                .specific
                .iter()
                .find(|b| b.has_category(category) && b.covers(as_of))
            {
                return Assignment::Budget(budget.id.clone());
            }
        }
        self.fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Granularity};
    use crate::test::{date, timestamp};

    fn budget(id: &str, categories: &[&str], created: &str) -> Budget {
        Budget::new(
            id,
            "u1",
            Amount::from_cents(10000),
            Granularity::Monthly,
            date("2025-01-01"),
        )
        .with_categories(categories.iter().copied())
        .with_created_at(timestamp(created))
    }

    fn split(primary: &str, detailed: &str) -> Split {
        Split::unassigned("s1", Amount::from_cents(100)).with_category(primary, detailed)
    }

    #[test]
    fn test_most_recent_budget_wins() {
        let budgets = OwnerBudgets::new(vec![
            budget("old", &["Food"], "2025-01-01T00:00:00Z"),
            budget("new", &["Food"], "2025-02-01T00:00:00Z"),
        ]);
        assert_eq!(
            budgets.assign(&split("Food", ""), date("2025-03-01")),
            Assignment::Budget(BudgetId::from("new"))
        );
    }

    #[test]
    fn test_equal_creation_falls_back_to_lowest_id() {
        let budgets = OwnerBudgets::new(vec![
            budget("b", &["Food"], "2025-01-01T00:00:00Z"),
            budget("a", &["Food"], "2025-01-01T00:00:00Z"),
        ]);
        assert_eq!(
            budgets.assign(&split("Food", ""), date("2025-03-01")).budget_id(),
            BudgetId::from("a")
        );
    }

    #[test]
    fn test_detailed_category_preferred() {
        let budgets = OwnerBudgets::new(vec![
            budget("food", &["Food"], "2025-02-01T00:00:00Z"),
            budget("groceries", &["Groceries"], "2025-01-01T00:00:00Z"),
        ]);
        assert_eq!(
            budgets
                .assign(&split("Food", "Groceries"), date("2025-03-01"))
                .budget_id(),
            BudgetId::from("groceries")
        );
    }

    #[test]
    fn test_date_range_respected() {
        let bounded =
            budget("b1", &["Food"], "2025-01-01T00:00:00Z").with_end_date(date("2025-01-31"));
        let catch_all = budget("all", &[], "2025-01-01T00:00:00Z").into_catch_all();
        let budgets = OwnerBudgets::new(vec![bounded, catch_all]);
        assert_eq!(
            budgets.assign(&split("Food", ""), date("2025-01-31")),
            Assignment::Budget(BudgetId::from("b1"))
        );
        assert_eq!(
            budgets.assign(&split("Food", ""), date("2025-02-01")),
            Assignment::CatchAll(BudgetId::from("all"))
        );
    }

    #[test]
    fn test_inactive_and_excluded_budgets_ignored() {
        let inactive = budget("gone", &["Food"], "2025-03-01T00:00:00Z").deactivated();
        let excluded = budget("skip", &["Food"], "2025-02-01T00:00:00Z");
        let budgets =
            OwnerBudgets::excluding(vec![inactive, excluded], Some(&BudgetId::from("skip")));
        assert_eq!(
            budgets.assign(&split("Food", ""), date("2025-03-01")),
            Assignment::Unassigned
        );
        assert_eq!(Assignment::Unassigned.budget_id(), BudgetId::unassigned());
    }

    #[test]
    fn test_uncategorized_split_goes_to_catch_all() {
        let catch_all = budget("all", &[], "2025-01-01T00:00:00Z").into_catch_all();
        let food = budget("food", &["Food"], "2025-01-01T00:00:00Z");
        let budgets = OwnerBudgets::new(vec![food, catch_all]);
        assert_eq!(
            budgets.assign(&split("", ""), date("2025-03-01")),
            Assignment::CatchAll(BudgetId::from("all"))
        );
        assert_eq!(budgets.catch_all(), Some(&BudgetId::from("all")));
    }
}
