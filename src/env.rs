//! Environment overlay for variable resolution
//!
//! The process environment is read once and never modified. A `.env` file
//! in the working directory is layered on top, and `VK_VAR_<NAME>` entries
//! of the combined view override declared variables.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Prefix marking an environment variable as a viki variable override
pub const VAR_PREFIX: &str = "VK_VAR_";

/// Dotenv file name inside the working directory
pub const DOTENV_FILE: &str = ".env";

/// Process environment plus dotenv entries
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment (non-unicode entries are skipped)
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    #[cfg(test)]
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Layer `dir/.env` over the environment, if the file exists.
    ///
    /// An unreadable file is logged and ignored.
    pub fn load_dotenv(&mut self, dir: &Path) {
        let path = dir.join(DOTENV_FILE);
        if !path.exists() {
            return;
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                let count = self.apply_dotenv(&content);
                log::debug!(component = "env", op = "dotenv"; "Loaded {count} entries from {}", path.display());
            }
            Err(e) => {
                log::warn!(component = "env", op = "dotenv"; "Could not read {}: {e}", path.display());
            }
        }
    }

    /// Apply dotenv-formatted text line by line; returns the number of entries set.
    ///
    /// References are expanded against everything set so far, including
    /// earlier lines of the same file.
    pub fn apply_dotenv(&mut self, content: &str) -> usize {
        let mut count = 0;
        for line in content.lines() {
            let Some((key, raw)) = parse_line(line) else {
                continue;
            };
            let value = match raw {
                RawValue::Literal(v) => v.to_string(),
                RawValue::Expand(v) => self.expand(v).into_owned(),
            };
            self.vars.insert(key.to_string(), value);
            count += 1;
        }
        count
    }

    /// Expand `$NAME` / `${NAME}` against this environment; unknown names stay verbatim
    pub fn expand<'a>(&self, value: &'a str) -> Cow<'a, str> {
        shellexpand::env_with_context_no_errors(value, |name| self.get(name))
    }

    /// `VK_VAR_` entries with the prefix stripped
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().filter_map(|(k, v)| {
            k.strip_prefix(VAR_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name, v.as_str()))
        })
    }
}

enum RawValue<'a> {
    /// Single-quoted; taken as is
    Literal(&'a str),
    Expand(&'a str),
}

fn parse_line(line: &str) -> Option<(&str, RawValue<'_>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let raw = if let Some(inner) = unquote(value, '\'') {
        RawValue::Literal(inner)
    } else if let Some(inner) = unquote(value, '"') {
        RawValue::Expand(inner)
    } else {
        RawValue::Expand(value)
    };
    Some((key, raw))
}

fn unquote(value: &str, quote: char) -> Option<&str> {
    value
        .strip_prefix(quote)
        .and_then(|v| v.strip_suffix(quote))
}
