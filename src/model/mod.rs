//! Types that represent the core data model: money, calendar periods, budgets and transactions.
mod amount;
mod budget;
pub mod calendar;
mod transaction;

pub use amount::{Amount, AmountError, AmountFormat, MINOR_UNIT_DP};
pub use budget::{Budget, BudgetId, CategoryId, UNASSIGNED};
pub use calendar::{CalendarCatalog, CalendarPeriod, Granularity, Half, InMemoryCatalog};
pub use transaction::{Split, SplitFlags, Transaction};
