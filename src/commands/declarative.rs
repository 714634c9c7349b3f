//! Declarative commands for viki
//!
//! - `fetch` - Run the data probes and record their output
//! - `plan` - Preview what apply would change (offline)
//! - `apply` - Make the host match the configuration

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{Catalog, FetchDriver, Plan, Section, StateSet, check_tools};
use std::collections::BTreeSet;
use std::path::Path;

use crate::Context;
use crate::config::Config;
use crate::engine::{self, ApplySummary, TokenConfirm, differ};
use crate::env::Environment;
use crate::progress::PassProgress;
use crate::ssh::SshSession;
use crate::state::VikiState;
use crate::ui;

/// Configuration and stored state of a working directory
struct Workspace {
    config: Config,
    state: VikiState,
}

impl Workspace {
    fn open(dir: &Path) -> Result<Self> {
        let mut env = Environment::from_process();
        env.load_dotenv(dir);
        let config = Config::load(dir, &env)?;
        let state = VikiState::load(dir)?;
        Ok(Self { config, state })
    }
}

// ============================================================================
// Fetch Command
// ============================================================================

pub fn fetch(ctx: &Context) -> Result<()> {
    let Workspace { config, mut state } = Workspace::open(&ctx.path)?;
    let catalog = Catalog::builtin();

    let creds = config.credentials()?;
    let mut session = SshSession::connect(&creds)?;
    let tools = catalog.tools_for(Section::Probes, &config.data);
    report_missing_tools(&check_tools(&mut session, tools)?);

    let mut progress = PassProgress::new(ctx.quiet);
    let snapshot = FetchDriver::new(&catalog, &mut session)
        .with_secret(creds.sudo_password.as_deref())
        .fetch(&config.data, &mut progress)?;

    let declared: usize = config.data.values().map(|names| names.len()).sum();
    let fetched = count_entries(&snapshot);
    if !ctx.quiet {
        display_snapshot(&snapshot, ctx.verbose > 0);
    }

    state.viki.data = snapshot;
    state.touch(&ctx.path)?;

    if fetched == declared {
        ui::success(&format!("Fetched {fetched} probe(s)"));
    } else {
        ui::warn(&format!(
            "Fetched {fetched} of {declared} probe(s); see the log for failures"
        ));
    }
    Ok(())
}

fn count_entries(set: &StateSet) -> usize {
    set.values().map(|names| names.len()).sum()
}

fn display_snapshot(snapshot: &StateSet, full: bool) {
    if snapshot.is_empty() {
        return;
    }
    ui::header("Data");
    for (kind, names) in snapshot {
        for (name, entry) in names {
            let output = entry.output.as_deref().unwrap_or_default();
            ui::captured(&format!("{kind}.{name}"), output, full);
        }
    }
    println!();
}

// ============================================================================
// Plan Command
// ============================================================================

pub fn plan(ctx: &Context) -> Result<()> {
    let Workspace { config, state } = Workspace::open(&ctx.path)?;
    let plan = Plan::compute(&Catalog::builtin(), &config.mods, &state.viki.mods);
    differ::display_plan(&plan);
    Ok(())
}

// ============================================================================
// Apply Command
// ============================================================================

pub fn apply(ctx: &Context, yes: bool) -> Result<()> {
    let Workspace { config, mut state } = Workspace::open(&ctx.path)?;
    let catalog = Catalog::builtin();

    let plan = Plan::compute(&catalog, &config.mods, &state.viki.mods);
    differ::display_plan(&plan);
    if !plan.has_changes() {
        return Ok(());
    }

    let creds = config.credentials()?;
    let secret = creds.sudo_password.as_deref();
    let mut session = SshSession::connect(&creds)?;

    let mut tools: BTreeSet<&str> = catalog.tools_for(Section::Probes, &config.data);
    tools.extend(catalog.tools_for(Section::Resources, &config.mods));
    tools.extend(catalog.tools_for(Section::Resources, &state.viki.mods));
    report_missing_tools(&check_tools(&mut session, tools)?);

    let mut progress = PassProgress::new(ctx.quiet);
    let snapshot = FetchDriver::new(&catalog, &mut session)
        .with_secret(secret)
        .fetch(&config.data, &mut progress)?;

    if !engine::approve(&mut TokenConfirm, yes)? {
        println!();
        println!("  {} Apply cancelled.", "✗".red());
        return Ok(());
    }

    log::info!(component = "apply", op = "run"; "{}", differ::plan_summary(&plan));
    state.viki.data = snapshot;
    let result = engine::execute(
        &catalog,
        &plan,
        &mut state.viki.mods,
        &mut session,
        secret,
        &mut progress,
    );

    // Persist whatever was applied, even if the run was cut short
    let saved = state.touch(&ctx.path);
    if let Err(e) = result {
        if let Err(save_err) = &saved {
            log::error!(component = "apply", op = "persist"; "{save_err:#}");
        }
        return Err(anyhow::Error::new(e).context("Apply aborted"));
    }
    saved?;

    let summary = ApplySummary::measure(&catalog, &plan, &config.mods, &state.viki.mods);
    engine::print_summary(&summary);
    if !summary.is_success() {
        bail!("{} change(s) could not be applied", summary.pending());
    }
    Ok(())
}

fn report_missing_tools(missing: &[String]) {
    if !missing.is_empty() {
        ui::warn(&format!(
            "Missing on the remote host: {} (commands using them will fail)",
            missing.join(", ")
        ));
    }
}
