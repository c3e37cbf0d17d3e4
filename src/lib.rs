//! Budget amount allocation and transaction split consistency.
//!
//! - `allocation` converts a budget amount denominated in one granularity into the amount that
//!   belongs to any calendar period.
//! - `splits` keeps a transaction's splits summing exactly to its amount.
//! - `reassign` moves splits between budgets when a budget's categories change or the budget is
//!   deleted, writing through a `store::Store`.

pub mod allocation;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
pub mod reassign;
pub mod splits;
pub mod store;
mod utils;


pub use config::Config;
pub use error::{Error, ErrorType, Result};
