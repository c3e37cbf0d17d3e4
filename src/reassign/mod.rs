//! Moves splits between budgets when a budget's categories change or a budget is deleted.
//!
//! Matching is a pure function of a split and the owner's budgets (`SplitMatcher`). The engine
//! reads everything it needs, builds a `ReassignmentPlan` in memory and only then writes, in
//! batches no larger than the store accepts.

mod engine;
mod matcher;

pub use engine::{
    CategoryChange, DeletionResult, PlannedUpdate, ReassignmentPlan, ReassignmentResult,
    Reassigner, SplitMove,
};
pub use matcher::{Assignment, OwnerBudgets, SplitMatcher};
