use crate::model::calendar::Granularity;
use crate::model::Amount;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Categories are referenced by their string id.
pub type CategoryId = String;

/// The sentinel budget id for splits that belong to no budget at all.
pub const UNASSIGNED: &str = "unassigned";

/// Identifies a budget, or the `"unassigned"` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetId(String);

impl BudgetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `"unassigned"` sentinel.
    pub fn unassigned() -> Self {
        Self(UNASSIGNED.to_string())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0 == UNASSIGNED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BudgetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BudgetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BudgetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A budget owned by a single user.
///
/// Budgets are deactivated rather than deleted so that historical split assignments keep
/// resolving. A catch-all budget has no categories and matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Budget {
    pub id: BudgetId,
    pub owner_id: String,
    #[serde(default)]
    pub category_ids: BTreeSet<CategoryId>,
    pub amount: Amount,
    pub granularity: Granularity,
    pub start_date: NaiveDate,
    /// `None` for open-ended budgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_catch_all: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Budget {
    /// Creates an active, open-ended budget with no categories.
    pub fn new(
        id: impl Into<BudgetId>,
        owner_id: impl Into<String>,
        amount: Amount,
        granularity: Granularity,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            category_ids: BTreeSet::new(),
            amount,
            granularity,
            start_date,
            end_date: None,
            is_active: true,
            is_catch_all: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_categories<S: Into<CategoryId>>(
        mut self,
        categories: impl IntoIterator<Item = S>,
    ) -> Self {
        self.category_ids = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Marks the budget as the owner's catch-all, clearing its categories.
    pub fn into_catch_all(mut self) -> Self {
        self.is_catch_all = true;
        self.category_ids.clear();
        self
    }

    /// Marks the budget as deactivated (soft-deleted).
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// True if `date` falls in `start_date..=end_date`, or on/after `start_date` when
    /// open-ended.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.category_ids.contains(category)
    }
}
