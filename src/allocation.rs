//! Converts a budget's nominal amount, denominated in one granularity, into the amount allocated
//! to a calendar period of any granularity.
//!
//! Same-granularity periods always receive the full nominal amount, even when the period is a
//! truncated instance. Other periods receive a daily rate times the days they span, where the
//! daily rate depends on the source granularity:
//!
//! - weekly: `amount / 7`
//! - monthly: `amount / days_in_month`, taken separately for each month the period touches
//! - half-month: `amount / days_in_half`, where the first half is 15 days and the second half is
//!   the remainder of the month
//!
//! Only the final allocation is rounded (half-up, to the minor unit).

use crate::model::calendar::{days_in_month, inclusive_days, Half, FIRST_HALF_DAYS};
use crate::model::{Amount, Budget, BudgetId, CalendarCatalog, CalendarPeriod, Granularity};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How a half-month amount is spread over a target period that carries no half metadata.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum HalfMonthConvention {
    /// Weekly targets use the 15-day first-half rate for every day. This under-allocates weeks
    /// that fall in a 16-day second half and over-allocates those in a 13 or 14 day one.
    #[default]
    #[value(name = "first_half")]
    FirstHalf,
    /// Every day uses the rate of the half it actually falls in.
    #[value(name = "by_day")]
    ByDay,
}

serde_plain::derive_display_from_serialize!(HalfMonthConvention);
serde_plain::derive_fromstr_from_deserialize!(HalfMonthConvention);

/// One budget period record: the amount a budget allocates to one catalog period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetPeriodAllocation {
    pub budget_id: BudgetId,
    pub period_id: String,
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub allocated: Amount,
}

/// Allocates budget amounts to calendar periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Allocator {
    half_month: HalfMonthConvention,
}

/// Allocates `amount`, denominated in `source`, to `target` using the default conventions.
pub fn allocate(amount: Amount, source: Granularity, target: &CalendarPeriod) -> Amount {
    Allocator::default().allocate(amount, source, target)
}

impl Allocator {
    pub fn new(half_month: HalfMonthConvention) -> Self {
        Self { half_month }
    }

    pub fn half_month_convention(&self) -> HalfMonthConvention {
        self.half_month
    }

    /// Returns the amount of a budget of `amount` per `source` period that belongs to `target`,
    /// rounded to the minor unit.
    pub fn allocate(&self, amount: Amount, source: Granularity, target: &CalendarPeriod) -> Amount {
        if target.granularity == source {
            return amount;
        }

        let raw = match source {
            Granularity::Weekly => {
                amount.scale(Decimal::from(target.day_count()), Decimal::from(7))
            }
            Granularity::Monthly => monthly_share(amount, target.start, target.end),
            Granularity::HalfMonth => self.half_month_share(amount, target),
        };
        trace!(
            "allocate {amount} {source} -> {} ({}..={}): {raw}",
            target.id,
            target.start,
            target.end
        );
        raw.round_cents()
    }

    /// Builds a budget period record for every `target` period in `catalog` that overlaps the
    /// budget's active range. Open-ended budgets stop at `horizon`.
    pub fn budget_periods(
        &self,
        budget: &Budget,
        catalog: &dyn CalendarCatalog,
        target: Granularity,
        horizon: NaiveDate,
    ) -> Vec<BudgetPeriodAllocation> {
        let to = budget.end_date.unwrap_or(horizon);
        if to < budget.start_date {
            return Vec::new();
        }
        catalog
            .periods(target, budget.start_date, to)
            .into_iter()
            .map(|period| BudgetPeriodAllocation {
                budget_id: budget.id.clone(),
                allocated: self.allocate(budget.amount, budget.granularity, &period),
                period_id: period.id,
                granularity: period.granularity,
                start: period.start,
                end: period.end,
            })
            .collect()
    }

    fn half_month_share(&self, amount: Amount, target: &CalendarPeriod) -> Amount {
        match (target.granularity, self.half_month) {
            (Granularity::Weekly, HalfMonthConvention::FirstHalf) => amount.scale(
                Decimal::from(target.day_count()),
                Decimal::from(FIRST_HALF_DAYS),
            ),
            _ => half_month_walk(amount, target.start, target.end),
        }
    }
}

/// Sums `amount / days_in_month` over every day in `start..=end`, one month segment at a time.
fn monthly_share(amount: Amount, start: NaiveDate, end: NaiveDate) -> Amount {
    let mut total = Amount::zero();
    let mut cursor = start;
    while cursor <= end {
        let dim = days_in_month(cursor);
        let month_end = cursor + Duration::days(i64::from(dim - cursor.day()));
        let segment_end = month_end.min(end);
        let days = inclusive_days(cursor, segment_end);
        total += amount.scale(Decimal::from(days), Decimal::from(dim));
        match segment_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    total
}

/// Sums `amount / days_in_half` over every day in `start..=end`, one half-month at a time.
fn half_month_walk(amount: Amount, start: NaiveDate, end: NaiveDate) -> Amount {
    let mut total = Amount::zero();
    let mut cursor = start;
    while cursor <= end {
        let half = Half::of(cursor);
        let last_day = match half {
            Half::First => FIRST_HALF_DAYS,
            Half::Second => days_in_month(cursor),
        };
        let half_end = cursor + Duration::days(i64::from(last_day - cursor.day()));
        let segment_end = half_end.min(end);
        let days = inclusive_days(cursor, segment_end);
        total += amount.scale(Decimal::from(days), Decimal::from(half.days(cursor)));
        match segment_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    total
}
