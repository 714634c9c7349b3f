//! Apply driver - runs insert/remove commands for a delta and updates the
//! live state entry by entry
//!
//! Each entry moves `Absent -> Present` (insert) or `Present -> Absent`
//! (remove) only when its command exits 0. A failed entry leaves its state
//! untouched and the pass carries on with the next one.

use crate::catalog::{Catalog, Section};
use crate::context::{Phase, ProgressCallback, RemoteExecutor};
use crate::error::{Error, Result};
use crate::template::CommandTemplate;
use crate::types::{ApplyResult, CommandOutput, Delta, ParamMap, StateEntry, StateSet};

/// What happened when one template was run
pub(crate) enum Outcome {
    Ran(CommandOutput),
    /// The template could not be rendered; nothing was sent
    Unrenderable { placeholder: String },
}

/// Render a template and run it, handing the secret to the executor only
/// when it was actually embedded in the command
pub(crate) fn run_template<E: RemoteExecutor + ?Sized>(
    executor: &mut E,
    template: CommandTemplate,
    params: &ParamMap,
    secret: Option<&str>,
) -> Result<Outcome> {
    let command = match template.render(params, secret) {
        Ok(command) => command,
        Err(Error::MissingParameter { placeholder }) => {
            return Ok(Outcome::Unrenderable { placeholder });
        }
        Err(e) => return Err(e),
    };
    let embedded = secret.filter(|s| template.elevated && !s.is_empty());
    Ok(Outcome::Ran(executor.run(&command, embedded)?))
}

/// Applies deltas through a remote executor
pub struct ApplyDriver<'a, E: RemoteExecutor + ?Sized> {
    catalog: &'a Catalog,
    executor: &'a mut E,
    secret: Option<&'a str>,
}

impl<'a, E: RemoteExecutor + ?Sized> ApplyDriver<'a, E> {
    pub fn new(catalog: &'a Catalog, executor: &'a mut E) -> Self {
        Self {
            catalog,
            executor,
            secret: None,
        }
    }

    /// Secret piped into `sudo -S` for elevated kinds
    pub fn with_secret(mut self, secret: Option<&'a str>) -> Self {
        self.secret = secret;
        self
    }

    /// Run the insert command of every entry in `delta`.
    ///
    /// Successful entries are written to `state` with the captured output.
    /// Returns `Err` only for structural failures (a kind the catalog does
    /// not know, or a broken channel); `state` keeps every change made
    /// before that point.
    pub fn apply_insert<P: ProgressCallback>(
        &mut self,
        delta: &Delta,
        state: &mut StateSet,
        progress: &mut P,
    ) -> Result<()> {
        progress.on_phase_start(Phase::Insert, delta.count());
        for (kind, name, params) in delta.iter() {
            let spec = self.catalog.resource(kind).require(Section::Resources, kind)?;
            progress.on_entry_start(kind, name);

            let result = match run_template(&mut *self.executor, spec.insert, params, self.secret)? {
                Outcome::Ran(out) if out.success() => {
                    state
                        .entry(kind.to_string())
                        .or_default()
                        .insert(name.to_string(), StateEntry::applied(params.clone(), out.output));
                    log::info!(component = "apply", op = "insert"; "{kind}.{name} created");
                    ApplyResult::Created
                }
                Outcome::Ran(out) => failed(Phase::Insert, kind, name, out),
                Outcome::Unrenderable { placeholder } => unrenderable(Phase::Insert, kind, name, &placeholder),
            };
            progress.on_entry_complete(kind, name, &result);
        }
        progress.on_phase_complete();
        Ok(())
    }

    /// Run the remove command of every entry in `delta` still present in
    /// `state`, rendering from the stored parameters.
    ///
    /// Successful entries are deleted from `state`.
    pub fn apply_remove<P: ProgressCallback>(
        &mut self,
        delta: &Delta,
        state: &mut StateSet,
        progress: &mut P,
    ) -> Result<()> {
        progress.on_phase_start(Phase::Remove, delta.count());
        for (kind, name, _) in delta.iter() {
            let spec = self.catalog.resource(kind).require(Section::Resources, kind)?;
            progress.on_entry_start(kind, name);

            let Some(stored) = state.get(kind).and_then(|names| names.get(name)) else {
                let result = ApplyResult::Skipped {
                    reason: "no longer in state".to_string(),
                };
                log::debug!(component = "apply", op = "remove"; "{kind}.{name} already absent from state");
                progress.on_entry_complete(kind, name, &result);
                continue;
            };

            let result = match run_template(&mut *self.executor, spec.remove, &stored.params, self.secret)? {
                Outcome::Ran(out) if out.success() => {
                    if let Some(names) = state.get_mut(kind) {
                        names.shift_remove(name);
                        if names.is_empty() {
                            state.shift_remove(kind);
                        }
                    }
                    log::info!(component = "apply", op = "remove"; "{kind}.{name} destroyed");
                    ApplyResult::Removed
                }
                Outcome::Ran(out) => failed(Phase::Remove, kind, name, out),
                Outcome::Unrenderable { placeholder } => unrenderable(Phase::Remove, kind, name, &placeholder),
            };
            progress.on_entry_complete(kind, name, &result);
        }
        progress.on_phase_complete();
        Ok(())
    }
}

fn failed(phase: Phase, kind: &str, name: &str, out: CommandOutput) -> ApplyResult {
    log::error!(
        component = "apply", op = phase.as_str();
        "commandFailed({kind}, {}) {name}: {}", out.status, out.output.trim()
    );
    ApplyResult::Failed {
        status: out.status,
        output: out.output,
    }
}

fn unrenderable(phase: Phase, kind: &str, name: &str, placeholder: &str) -> ApplyResult {
    log::error!(
        component = "apply", op = phase.as_str();
        "{kind}.{name} not run: parameter '{placeholder}' is missing"
    );
    ApplyResult::Skipped {
        reason: format!("missing parameter '{placeholder}'"),
    }
}
