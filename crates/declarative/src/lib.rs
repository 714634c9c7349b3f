//! # Declarative
//!
//! Reconciliation engine for remote hosts driven by shell command templates.
//!
//! The crate compares the resources an operator declared against the state
//! recorded after the last apply, and runs the insert/remove commands that
//! close the gap over an injected remote channel.
//!
//! ## Core Concepts
//!
//! - **Catalog**: Registry of resource kinds (insert/remove templates) and
//!   probe kinds (one read-only fetch template)
//! - **CommandTemplate**: Shell text with `${name}` placeholders plus an
//!   elevation flag
//! - **Plan**: Insert and remove deltas, keyed by kind and instance name
//! - **FetchDriver / ApplyDriver**: Run probes or deltas one entry at a time
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyDriver, Catalog, NoProgress, Plan};
//!
//! let catalog = Catalog::builtin();
//! let plan = Plan::compute(&catalog, &declared, &state);
//!
//! let mut driver = ApplyDriver::new(&catalog, &mut session).with_secret(Some("pw"));
//! driver.apply_insert(&plan.insert, &mut state, &mut NoProgress)?;
//! driver.apply_remove(&plan.remove, &mut state, &mut NoProgress)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`RemoteExecutor`]: Runs a command on the managed host
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles the approval gate
//!
//! This keeps the crate free of any SSH client, terminal UI or prompt.

pub mod apply;
pub mod catalog;
pub mod context;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod template;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use apply::ApplyDriver;
pub use catalog::{Catalog, KindLookup, ProbeSpec, ResourceSpec, Section};
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, Phase, ProgressCallback,
    RemoteExecutor,
};
pub use diff::{Diagnostic, Plan, count, plan_insert, plan_remove};
pub use error::{Error, Result};
pub use fetch::{FetchDriver, check_tools};
pub use template::{CommandTemplate, elevate, shell_quote};
pub use types::{
    ApplyResult, CommandOutput, DeclaredSet, Delta, KindMap, NameMap, OUTPUT_KEY, ParamMap,
    StateEntry, StateSet,
};
