//! Progress bar for driver passes

use colored::Colorize;
use console::Term;
use declarative::{ApplyResult, Phase, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Shows one bar per pass and prints a line per finished entry
pub struct PassProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
    interactive: bool,
}

impl PassProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: None,
            quiet,
            interactive: Term::stderr().is_term(),
        }
    }
}

impl ProgressCallback for PassProgress {
    fn on_phase_start(&mut self, phase: Phase, count: usize) {
        if count == 0 {
            return;
        }
        let pb = ProgressBar::new(count as u64);
        if self.quiet || !self.interactive {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_prefix(phase.to_string());
        self.bar = Some(pb);
    }

    fn on_entry_start(&mut self, kind: &str, name: &str) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("{kind}.{name}"));
        }
    }

    fn on_entry_complete(&mut self, kind: &str, name: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::Created | ApplyResult::Fetched => "✓".green(),
            ApplyResult::Removed => "-".red(),
            ApplyResult::Failed { .. } => "✗".red(),
            ApplyResult::Skipped { .. } => "⊘".yellow(),
        };
        let detail = match result {
            ApplyResult::Failed { status, .. } => format!(" (exit {status})"),
            ApplyResult::Skipped { reason } => format!(" ({reason})"),
            _ => String::new(),
        };
        let line = format!("    {symbol} {kind}.{name}{}", detail.dimmed());

        match &self.bar {
            Some(pb) => {
                if !self.quiet {
                    pb.suspend(|| println!("{line}"));
                }
                pb.inc(1);
            }
            None if !self.quiet => println!("{line}"),
            None => {}
        }
    }

    fn on_phase_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}
