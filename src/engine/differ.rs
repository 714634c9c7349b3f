//! Plan display

use crate::ui;
use colored::Colorize;
use declarative::{Delta, Diagnostic, Plan};

/// One-line plan summary
pub fn plan_summary(plan: &Plan) -> String {
    format!(
        "Plan: {} to add, {} to destroy.",
        plan.count_insert(),
        plan.count_remove()
    )
}

/// Print diagnostics collected while planning
pub fn display_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.level() {
            log::Level::Error => ui::error(&diagnostic.to_string()),
            _ => ui::warn(&diagnostic.to_string()),
        }
    }
}

/// Display the plan in a user-friendly format
pub fn display_plan(plan: &Plan) {
    display_diagnostics(&plan.diagnostics);

    if !plan.has_changes() {
        println!();
        println!(
            "  {} No changes. Your server matches the configuration.",
            "✓".green()
        );
        return;
    }

    log::info!(component = "plan", op = "display"; "add:\n{}", ui::pretty_json(&plan.insert));
    log::info!(component = "plan", op = "display"; "destroy:\n{}", ui::pretty_json(&plan.remove));

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");
    display_delta(&plan.insert, "+".green(), "will be created");
    display_delta(&plan.remove, "-".red(), "will be destroyed");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ {} {} to add, {} to destroy.",
        "Plan:".bold(),
        plan.count_insert().to_string().green(),
        plan.count_remove().to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn display_delta(delta: &Delta, symbol: colored::ColoredString, action: &str) {
    for (kind, names) in delta.kinds() {
        println!("│ {}", kind.bold());
        for (name, params) in names {
            println!("│   {} {:<30} {}", symbol, name, action.dimmed());
            for (key, value) in params {
                println!("│       {} = {}", key.dimmed(), value);
            }
        }
        println!("│");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Catalog, DeclaredSet, StateSet};

    #[test]
    fn test_plan_summary() {
        let mut declared = DeclaredSet::new();
        declared
            .entry("mkdir".into())
            .or_default()
            .insert("a".into(), [("path".to_string(), "/a".to_string())].into());

        let plan = Plan::compute(&Catalog::builtin(), &declared, &StateSet::new());
        assert_eq!(plan_summary(&plan), "Plan: 1 to add, 0 to destroy.");
    }
}
