//! Scripted executor shared by the driver tests

use crate::context::{Phase, ProgressCallback, RemoteExecutor};
use crate::error::{Error, Result};
use crate::types::{ApplyResult, CommandOutput};

/// Records every command and answers from a list of substring rules.
/// Commands matching no rule succeed with output `ok: <command>`.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub commands: Vec<String>,
    pub secrets: Vec<Option<String>>,
    rules: Vec<(String, Reply)>,
}

enum Reply {
    Status(i32, String),
    Broken,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `status`
    pub fn failing(mut self, pattern: &str, status: i32, output: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::Status(status, output.to_string())));
        self
    }

    /// Commands containing `pattern` fail at the transport level
    pub fn broken(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::Broken));
        self
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn run(&mut self, command: &str, secret: Option<&str>) -> Result<CommandOutput> {
        self.commands.push(command.to_string());
        self.secrets.push(secret.map(str::to_string));
        match self.rules.iter().find(|(p, _)| command.contains(p.as_str())) {
            Some((_, Reply::Status(status, output))) => Ok(CommandOutput::new(*status, output.clone())),
            Some((_, Reply::Broken)) => Err(Error::Executor("connection reset".into())),
            None => Ok(CommandOutput::new(0, format!("ok: {command}"))),
        }
    }
}

/// Progress callback that keeps everything it is told
#[derive(Default)]
pub struct RecordingProgress {
    pub phases: Vec<(Phase, usize)>,
    pub completed: Vec<(String, String, ApplyResult)>,
}

impl ProgressCallback for RecordingProgress {
    fn on_phase_start(&mut self, phase: Phase, count: usize) {
        self.phases.push((phase, count));
    }

    fn on_entry_start(&mut self, _kind: &str, _name: &str) {}

    fn on_entry_complete(&mut self, kind: &str, name: &str, result: &ApplyResult) {
        self.completed
            .push((kind.to_string(), name.to_string(), result.clone()));
    }

    fn on_phase_complete(&mut self) {}
}
