//! Execution engine for viki
//!
//! The engine orchestrates:
//! 1. Display - Show the plan and its diagnostics
//! 2. Approval - Gate mutating commands behind an explicit `yes`
//! 3. Executing - Insert pass, then remove pass, then a re-planned summary

pub mod differ;
pub mod executor;

pub use executor::{ApplySummary, TokenConfirm, approve, execute, print_summary};
