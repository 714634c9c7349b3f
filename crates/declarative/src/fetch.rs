//! Fetch driver - runs read-only probes and builds a fresh snapshot
//!
//! The snapshot is built from nothing on every call: a probe that fails
//! is simply absent from the result.

use crate::apply::{Outcome, run_template};
use crate::catalog::{Catalog, KindLookup};
use crate::context::{Phase, ProgressCallback, RemoteExecutor};
use crate::error::Result;
use crate::types::{ApplyResult, DeclaredSet, StateEntry, StateSet};

/// Runs probe commands through a remote executor
pub struct FetchDriver<'a, E: RemoteExecutor + ?Sized> {
    catalog: &'a Catalog,
    executor: &'a mut E,
    secret: Option<&'a str>,
}

impl<'a, E: RemoteExecutor + ?Sized> FetchDriver<'a, E> {
    pub fn new(catalog: &'a Catalog, executor: &'a mut E) -> Self {
        Self {
            catalog,
            executor,
            secret: None,
        }
    }

    /// Secret piped into `sudo -S` for elevated probes
    pub fn with_secret(mut self, secret: Option<&'a str>) -> Self {
        self.secret = secret;
        self
    }

    /// Run every declared probe and return the resulting snapshot.
    ///
    /// Unknown probe kinds are logged and skipped. Only a broken channel
    /// returns `Err`.
    pub fn fetch<P: ProgressCallback>(
        &mut self,
        probes: &DeclaredSet,
        progress: &mut P,
    ) -> Result<StateSet> {
        let mut snapshot = StateSet::new();
        let total = probes.values().map(|names| names.len()).sum();
        progress.on_phase_start(Phase::Fetch, total);

        for (kind, names) in probes {
            let KindLookup::Known(spec) = self.catalog.probe(kind) else {
                log::warn!(component = "fetch", op = "probe"; "unknown probe kind '{kind}', skipped");
                continue;
            };
            for (name, params) in names {
                progress.on_entry_start(kind, name);
                let result = match run_template(&mut *self.executor, spec.fetch, params, self.secret)? {
                    Outcome::Ran(out) if out.success() => {
                        log::debug!(component = "fetch", op = "probe"; "{kind}.{name} fetched");
                        snapshot
                            .entry(kind.clone())
                            .or_default()
                            .insert(name.clone(), StateEntry::applied(params.clone(), out.output));
                        ApplyResult::Fetched
                    }
                    Outcome::Ran(out) => {
                        log::error!(
                            component = "fetch", op = "probe";
                            "commandFailed({kind}, {}) {name}: {}", out.status, out.output.trim()
                        );
                        ApplyResult::Failed {
                            status: out.status,
                            output: out.output,
                        }
                    }
                    Outcome::Unrenderable { placeholder } => {
                        log::error!(
                            component = "fetch", op = "probe";
                            "{kind}.{name} not run: parameter '{placeholder}' is missing"
                        );
                        ApplyResult::Skipped {
                            reason: format!("missing parameter '{placeholder}'"),
                        }
                    }
                };
                progress.on_entry_complete(kind, name, &result);
            }
        }

        progress.on_phase_complete();
        Ok(snapshot)
    }
}

/// Check that each tool resolves on the remote `PATH`.
///
/// Returns the tools that are missing. A missing tool is only logged;
/// the command that needs it will fail on its own later.
pub fn check_tools<'t, E: RemoteExecutor + ?Sized>(
    executor: &mut E,
    tools: impl IntoIterator<Item = &'t str>,
) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for tool in tools {
        if executor.run_status(&format!("which {tool}"))? {
            log::info!(component = "tools", op = "check"; "{tool} is available");
        } else {
            log::error!(component = "tools", op = "check"; "{tool} was not found on the remote host");
            missing.push(tool.to_string());
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::error::Error;
    use crate::testing::{RecordingProgress, ScriptedExecutor};
    use crate::types::ParamMap;

    fn probes(entries: &[(&str, &str, &[(&str, &str)])]) -> DeclaredSet {
        let mut set = DeclaredSet::new();
        for (kind, name, pairs) in entries {
            let params: ParamMap = pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            set.entry((*kind).to_string())
                .or_default()
                .insert((*name).to_string(), params);
        }
        set
    }

    #[test]
    fn test_fetch_stores_output_and_params() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new();
        let declared = probes(&[("ls", "home", &[("path", "~")])]);

        let snapshot = FetchDriver::new(&catalog, &mut exec)
            .fetch(&declared, &mut NoProgress)
            .unwrap();

        assert_eq!(exec.commands, vec!["ls ~"]);
        let entry = &snapshot["ls"]["home"];
        assert_eq!(entry.params["path"], "~");
        assert_eq!(entry.output.as_deref(), Some("ok: ls ~"));
    }

    #[test]
    fn test_failed_probe_is_absent() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new().failing("/missing", 2, "No such file or directory");
        let declared = probes(&[
            ("ls", "gone", &[("path", "/missing")]),
            ("df", "disk", &[]),
        ]);
        let mut progress = RecordingProgress::default();

        let snapshot = FetchDriver::new(&catalog, &mut exec)
            .fetch(&declared, &mut progress)
            .unwrap();

        assert!(!snapshot.contains_key("ls"));
        assert!(snapshot["df"].contains_key("disk"));
        assert_eq!(progress.phases, vec![(Phase::Fetch, 2)]);
    }

    #[test]
    fn test_unknown_probe_kind_is_skipped() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new();
        let declared = probes(&[("mkdir", "a", &[("path", "/a")]), ("uptime", "u", &[])]);

        let snapshot = FetchDriver::new(&catalog, &mut exec)
            .fetch(&declared, &mut NoProgress)
            .unwrap();

        assert!(exec.commands.is_empty());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_elevated_probe_uses_secret() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new();
        let declared = probes(&[("docker", "containers", &[])]);

        FetchDriver::new(&catalog, &mut exec)
            .with_secret(Some("pw"))
            .fetch(&declared, &mut NoProgress)
            .unwrap();

        assert_eq!(exec.commands, vec!["echo pw | sudo -S docker ps"]);
        assert_eq!(exec.secrets, vec![Some("pw".to_string())]);
    }

    #[test]
    fn test_probe_missing_parameter_is_not_sent() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new();
        let declared = probes(&[("lsl", "etc", &[])]);
        let mut progress = RecordingProgress::default();

        let snapshot = FetchDriver::new(&catalog, &mut exec)
            .fetch(&declared, &mut progress)
            .unwrap();

        assert!(exec.commands.is_empty());
        assert!(snapshot.is_empty());
        assert!(matches!(progress.completed[0].2, ApplyResult::Skipped { .. }));
    }

    #[test]
    fn test_broken_channel_propagates() {
        let catalog = Catalog::builtin();
        let mut exec = ScriptedExecutor::new().broken("df");
        let declared = probes(&[("df", "disk", &[])]);

        let err = FetchDriver::new(&catalog, &mut exec)
            .fetch(&declared, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Executor(_)));
    }

    #[test]
    fn test_check_tools_reports_missing() {
        let mut exec = ScriptedExecutor::new().failing("which wget", 1, "");

        let missing = check_tools(&mut exec, ["mkdir", "wget"]).unwrap();

        assert_eq!(exec.commands, vec!["which mkdir", "which wget"]);
        assert_eq!(missing, vec!["wget"]);
    }
}
