//! Provider traits for the remote channel, progress reporting and approval
//!
//! These keep the engine free of any particular transport, terminal UI or
//! prompt implementation.

use crate::error::Result;
use crate::types::{ApplyResult, CommandOutput};
use std::fmt;

/// A command-execution channel to the managed host.
///
/// One session is reused for the whole run and called strictly sequentially.
pub trait RemoteExecutor {
    /// Run a shell command on the host.
    ///
    /// A non-zero exit status is a normal `Ok` value; `Err` means the channel
    /// itself is unusable. `secret`, when given, is sensitive text contained
    /// in `command` that must never be logged.
    fn run(&mut self, command: &str, secret: Option<&str>) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&mut self, command: &str) -> Result<bool> {
        Ok(self.run(command, None)?.success())
    }
}

impl<E: RemoteExecutor + ?Sized> RemoteExecutor for &mut E {
    fn run(&mut self, command: &str, secret: Option<&str>) -> Result<CommandOutput> {
        (**self).run(command, secret)
    }
}

/// Which driver pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Insert,
    Remove,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for driver passes
pub trait ProgressCallback {
    /// Called before the first entry of a pass
    fn on_phase_start(&mut self, phase: Phase, count: usize);

    /// Called before an entry's command runs
    fn on_entry_start(&mut self, kind: &str, name: &str);

    /// Called once an entry's outcome is known
    fn on_entry_complete(&mut self, kind: &str, name: &str, result: &ApplyResult);

    /// Called after the last entry of a pass
    fn on_phase_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _phase: Phase, _count: usize) {}
    fn on_entry_start(&mut self, _kind: &str, _name: &str) {}
    fn on_entry_complete(&mut self, _kind: &str, _name: &str, _result: &ApplyResult) {}
    fn on_phase_complete(&mut self) {}
}

/// The approval gate in front of mutating commands
pub trait ConfirmCallback {
    /// Ask the operator to approve; `true` only on explicit approval
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(false)
    }
}
