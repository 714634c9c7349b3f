use colored::Colorize;
use serde::Serialize;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Width of the one-line output preview
const PREVIEW_WIDTH: usize = 60;

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print the output captured for `label`: all of it, or a one-line preview
pub fn captured(label: &str, output: &str, full: bool) {
    if full {
        println!("  {}:", label.dimmed());
        for line in output.lines() {
            println!("    {}", line.dimmed());
        }
    } else {
        println!("  {}: {}", label.dimmed(), first_line(output, PREVIEW_WIDTH));
    }
}

/// Indented JSON for display
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

/// Cut multi-line command output down to its first line
pub fn first_line(text: &str, max_len: usize) -> String {
    let line = text.trim().lines().next().unwrap_or_default();
    if line.chars().count() <= max_len {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_pretty_json() {
        let mut map = BTreeMap::new();
        map.insert("path", "/tmp/a");
        assert_eq!(pretty_json(&map), "{\n  \"path\": \"/tmp/a\"\n}");
    }

    #[test]
    fn test_first_line_short() {
        assert_eq!(first_line("  ok\nmore\n", 20), "ok");
        assert_eq!(first_line("", 20), "");
    }

    #[test]
    fn test_first_line_long() {
        assert_eq!(first_line("abcdefghij", 8), "abcde...");
    }
}
