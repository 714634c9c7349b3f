//! Execution engine - approval gate, apply passes and the final summary

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    ApplyDriver, Catalog, ConfirmCallback, DeclaredSet, Delta, Plan, ProgressCallback,
    RemoteExecutor, StateSet,
};

/// The only answer that approves an apply (case-insensitive)
pub const APPROVAL_TOKEN: &str = "yes";

const APPROVAL_PROMPT: &str = "Do you want to perform these actions?\n  \
viki will perform the actions described above.\n  \
Only 'yes' will be accepted to approve.\n\n  Enter a value";

/// Whether operator input approves the apply
pub fn is_approval(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(APPROVAL_TOKEN)
}

/// Approval gate that requires the operator to type `yes`
pub struct TokenConfirm;

impl ConfirmCallback for TokenConfirm {
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool> {
        let answer: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| match e {
                dialoguer::Error::IO(io) => io,
            })?;
        Ok(is_approval(&answer))
    }
}

/// Ask for approval unless `yes` was given
pub fn approve<C: ConfirmCallback>(confirm: &mut C, yes: bool) -> Result<bool> {
    if yes {
        log::info!(component = "apply", op = "approve"; "Approval skipped (--yes)");
        return Ok(true);
    }
    println!();
    confirm
        .confirm(APPROVAL_PROMPT)
        .context("Failed to read approval")
}

/// Run the insert pass, then the remove pass, mutating `state` in place.
///
/// On `Err`, `state` holds every change made before the failure and must
/// still be persisted by the caller.
pub fn execute<E: RemoteExecutor + ?Sized, P: ProgressCallback>(
    catalog: &Catalog,
    plan: &Plan,
    state: &mut StateSet,
    executor: &mut E,
    secret: Option<&str>,
    progress: &mut P,
) -> declarative::Result<()> {
    let mut driver = ApplyDriver::new(catalog, executor).with_secret(secret);
    if !plan.insert.is_empty() {
        driver.apply_insert(&plan.insert, state, progress)?;
    }
    if !plan.remove.is_empty() {
        driver.apply_remove(&plan.remove, state, progress)?;
    }
    Ok(())
}

/// Outcome of an apply, measured against the state it left behind
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub added: usize,
    pub destroyed: usize,
    /// Entries that should have been added but were not
    pub pending_insert: Delta,
    /// Entries that should have been destroyed but were not
    pub pending_remove: Delta,
}

impl ApplySummary {
    /// Re-plan against the mutated state and compare with the original plan
    pub fn measure(catalog: &Catalog, plan: &Plan, declared: &DeclaredSet, state: &StateSet) -> Self {
        let after = Plan::build(catalog, declared, state);
        let pending_insert = restrict(&after.insert, &plan.insert);
        let pending_remove = restrict(&after.remove, &plan.remove);
        Self {
            added: plan.count_insert() - pending_insert.count(),
            destroyed: plan.count_remove() - pending_remove.count(),
            pending_insert,
            pending_remove,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending_insert.count() + self.pending_remove.count()
    }

    pub fn is_success(&self) -> bool {
        self.pending() == 0
    }
}

/// Entries of `delta` that were part of `planned`
fn restrict(delta: &Delta, planned: &Delta) -> Delta {
    let mut out = Delta::new();
    for (kind, name, params) in delta.iter() {
        if planned.contains(kind, name) {
            out.insert(kind, name, params.clone());
        }
    }
    out
}

/// Print final summary
pub fn print_summary(summary: &ApplySummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Apply complete! {} added, {} destroyed.",
            "✓".green().bold(),
            summary.added,
            summary.destroyed
        );
        return;
    }

    println!(
        "  {} Apply finished with errors: {} added, {} destroyed, {} {}",
        "⚠".yellow().bold(),
        summary.added,
        summary.destroyed,
        summary.pending(),
        "failed".red()
    );
    for (kind, name, _) in summary.pending_insert.iter() {
        println!("    • {kind}.{name} was not created");
    }
    for (kind, name, _) in summary.pending_remove.iter() {
        println!("    • {kind}.{name} was not destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{AutoConfirm, AutoDecline, CommandOutput, NoProgress, ParamMap};

    /// Executor that fails every command containing `fail`
    struct FakeHost {
        fail: &'static str,
        commands: Vec<String>,
    }

    impl RemoteExecutor for FakeHost {
        fn run(&mut self, command: &str, _secret: Option<&str>) -> declarative::Result<CommandOutput> {
            self.commands.push(command.to_string());
            let status = i32::from(command.contains(self.fail));
            Ok(CommandOutput::new(status, "done"))
        }
    }

    fn dirs(entries: &[(&str, &str)]) -> DeclaredSet {
        let mut set = DeclaredSet::new();
        for (name, path) in entries {
            let params: ParamMap = [("path".to_string(), (*path).to_string())].into();
            set.entry("mkdir".into())
                .or_default()
                .insert((*name).to_string(), params);
        }
        set
    }

    #[test]
    fn test_is_approval() {
        assert!(is_approval("yes"));
        assert!(is_approval("YES"));
        assert!(is_approval(" Yes \n"));
        assert!(!is_approval("y"));
        assert!(!is_approval(""));
        assert!(!is_approval("yes please"));
    }

    #[test]
    fn test_approve() {
        assert!(approve(&mut AutoDecline, true).unwrap());
        assert!(approve(&mut AutoConfirm, false).unwrap());
        assert!(!approve(&mut AutoDecline, false).unwrap());
    }

    #[test]
    fn test_execute_and_measure_success() {
        let catalog = Catalog::builtin();
        let declared = dirs(&[("a", "/a")]);
        let mut state = StateSet::new();
        let plan = Plan::compute(&catalog, &declared, &state);
        let mut host = FakeHost {
            fail: "never",
            commands: Vec::new(),
        };

        execute(&catalog, &plan, &mut state, &mut host, None, &mut NoProgress).unwrap();
        let summary = ApplySummary::measure(&catalog, &plan, &declared, &state);

        assert!(summary.is_success());
        assert_eq!((summary.added, summary.destroyed), (1, 0));
    }

    #[test]
    fn test_measure_reports_pending_entries() {
        let catalog = Catalog::builtin();
        let declared = dirs(&[("a", "/a"), ("b", "/fail")]);
        let mut state = StateSet::new();
        let plan = Plan::compute(&catalog, &declared, &state);
        let mut host = FakeHost {
            fail: "fail",
            commands: Vec::new(),
        };

        execute(&catalog, &plan, &mut state, &mut host, None, &mut NoProgress).unwrap();
        let summary = ApplySummary::measure(&catalog, &plan, &declared, &state);

        assert!(!summary.is_success());
        assert_eq!(summary.added, 1);
        assert!(summary.pending_insert.contains("mkdir", "b"));
        assert_eq!(host.commands, vec!["mkdir -p /a", "mkdir -p /fail"]);
    }
}
