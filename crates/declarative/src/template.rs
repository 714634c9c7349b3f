//! Command templater - turns a kind's template and an instance's parameters
//! into the literal shell command sent to the host.
//!
//! Rendering is pure: no I/O, no environment lookups.

use crate::error::{Error, Result};
use crate::types::ParamMap;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}").unwrap_or_else(|e| panic!("invalid placeholder regex: {e}"))
});

/// A command template plus whether it runs with elevated privileges.
///
/// Elevated templates are written without the `sudo` prefix; the templater
/// adds it, piping the secret into `sudo -S` when one is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub text: &'static str,
    pub elevated: bool,
}

impl CommandTemplate {
    /// Template that runs as the connecting user
    pub const fn plain(text: &'static str) -> Self {
        Self {
            text,
            elevated: false,
        }
    }

    /// Template that runs under sudo
    pub const fn elevated(text: &'static str) -> Self {
        Self {
            text,
            elevated: true,
        }
    }

    /// Render with the given parameters and optional elevation secret
    pub fn render(&self, params: &ParamMap, secret: Option<&str>) -> Result<String> {
        let command = substitute(self.text, params)?;
        if self.elevated {
            Ok(elevate(&command, secret))
        } else {
            Ok(command)
        }
    }
}

/// Replace every `${key}` with `params[key]`.
///
/// Keys in `params` that the template never mentions are ignored. Values are
/// inserted verbatim and not scanned again.
pub fn substitute(template: &str, params: &ParamMap) -> Result<String> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .find(|name| !params.contains_key(name.as_str()))
    {
        return Err(Error::MissingParameter {
            placeholder: missing.as_str().to_string(),
        });
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        params
            .get(&caps[1])
            .map(String::as_str)
            .unwrap_or_default()
            .to_string()
    });
    Ok(rendered.into_owned())
}

/// Wrap a rendered command in sudo.
///
/// With a non-empty secret the password is piped into `sudo -S`; without one
/// the target is assumed to allow passwordless sudo.
pub fn elevate(command: &str, secret: Option<&str>) -> String {
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => format!("echo {} | sudo -S {}", shell_quote(secret), command),
        None => format!("sudo {command}"),
    }
}

/// Quote a word for a POSIX shell, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
