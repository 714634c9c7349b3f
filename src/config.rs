use crate::env::Environment;
use anyhow::{Context, Result, bail};
use declarative::{DeclaredSet, OUTPUT_KEY, ParamMap};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// File name suffixes recognised as configuration fragments
pub const FRAGMENT_SUFFIXES: [&str; 3] = [".vk.yaml", ".vk.yml", ".vk.toml"];

/// Default SSH port when `port` is not declared
pub const DEFAULT_PORT: u16 = 22;

static VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}")
        .unwrap_or_else(|e| panic!("variable reference pattern is invalid: {e}"))
});

// ============================================================================
// Fragment Format
// ============================================================================

#[derive(Debug, Deserialize)]
struct FragmentFile {
    viki: Option<Fragment>,
}

/// One `*.vk.*` file; every section and level may be left empty
#[derive(Debug, Default, Deserialize)]
struct Fragment {
    #[serde(default)]
    data: Option<RawSection>,
    #[serde(default)]
    vars: Option<BTreeMap<String, Option<Scalar>>>,
    #[serde(default)]
    mods: Option<RawSection>,
}

/// kind -> name -> parameter, in file order
type RawSection = IndexMap<String, Option<IndexMap<String, Option<IndexMap<String, Option<Scalar>>>>>>;

/// Scalar parameter value; numbers and booleans are kept as their text
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s,
        }
    }
}

fn text(value: Option<Scalar>) -> String {
    value.map(Scalar::into_string).unwrap_or_default()
}

// ============================================================================
// Merged Configuration
// ============================================================================

/// Two fragments declaring the same key; the first one is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub section: &'static str,
    pub key: String,
    pub kept: PathBuf,
    pub ignored: PathBuf,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate {} key '{}' in {} (already declared in {}), ignored",
            self.section,
            self.key,
            self.ignored.display(),
            self.kept.display()
        )
    }
}

/// The declared configuration of a working directory
#[derive(Debug, Default)]
pub struct Config {
    /// Probe instances (`data`)
    pub data: DeclaredSet,
    /// Resolved variables (`vars` with `VK_VAR_` overrides applied)
    pub vars: BTreeMap<String, String>,
    /// Mutable resource instances (`mods`)
    pub mods: DeclaredSet,
    /// Fragments that were merged, in processing order
    pub files: Vec<PathBuf>,
    pub conflicts: Vec<MergeConflict>,
}

impl Config {
    /// Discover, parse and merge every fragment in `dir`, then resolve variables
    pub fn load(dir: &Path, env: &Environment) -> Result<Self> {
        let mut config = Self::default();
        let mut origins: BTreeMap<(&'static str, String), PathBuf> = BTreeMap::new();

        for path in discover(dir)? {
            let fragment = parse_fragment(&path)?;
            config.merge(fragment, &path, &mut origins)?;
            config.files.push(path);
        }

        for conflict in &config.conflicts {
            log::error!(component = "config", op = "merge"; "{conflict}");
        }

        config.apply_overrides(env);
        config.expand_params();

        log::info!(
            component = "config", op = "load";
            "Loaded {} fragment(s) from {}", config.files.len(), dir.display()
        );
        Ok(config)
    }

    fn merge(
        &mut self,
        fragment: Fragment,
        path: &Path,
        origins: &mut BTreeMap<(&'static str, String), PathBuf>,
    ) -> Result<()> {
        let mut claim = |section: &'static str, key: String, conflicts: &mut Vec<MergeConflict>| {
            match origins.get(&(section, key.clone())) {
                Some(kept) => {
                    conflicts.push(MergeConflict {
                        section,
                        key,
                        kept: kept.clone(),
                        ignored: path.to_path_buf(),
                    });
                    false
                }
                None => {
                    origins.insert((section, key), path.to_path_buf());
                    true
                }
            }
        };

        for (name, value) in fragment.vars.unwrap_or_default() {
            if claim("vars", name.clone(), &mut self.conflicts) {
                self.vars.insert(name, text(value));
            }
        }

        for (section, raw, target) in [
            ("data", fragment.data, &mut self.data),
            ("mods", fragment.mods, &mut self.mods),
        ] {
            for (kind, names) in raw.unwrap_or_default() {
                for (name, params) in names.unwrap_or_default() {
                    let params = params.unwrap_or_default();
                    if params.contains_key(OUTPUT_KEY) {
                        bail!(
                            "{section}.{kind}.{name} in {} uses the reserved parameter name '{OUTPUT_KEY}'",
                            path.display()
                        );
                    }
                    if !claim(section, format!("{kind}.{name}"), &mut self.conflicts) {
                        continue;
                    }
                    let params: ParamMap = params.into_iter().map(|(k, v)| (k, text(v))).collect();
                    target.entry(kind.clone()).or_default().insert(name, params);
                }
            }
        }
        Ok(())
    }

    /// `VK_VAR_<NAME>` replaces declared variable `<NAME>`
    fn apply_overrides(&mut self, env: &Environment) {
        for (name, value) in env.overrides() {
            match self.vars.get_mut(name) {
                Some(slot) => {
                    *slot = value.to_string();
                    log::debug!(component = "config", op = "vars"; "{name} set from environment");
                }
                None => {
                    log::debug!(component = "config", op = "vars"; "{name} is not a declared variable, ignored");
                }
            }
        }
    }

    /// Substitute `${NAME}` in parameter values with resolved variables
    fn expand_params(&mut self) {
        let vars = &self.vars;
        for set in [&mut self.data, &mut self.mods] {
            for params in set.values_mut().flat_map(|names| names.values_mut()) {
                for value in params.values_mut() {
                    if let Some(expanded) = expand_vars(value, vars) {
                        *value = expanded;
                    }
                }
            }
        }
    }

    /// Connection settings for the managed host
    pub fn credentials(&self) -> Result<Credentials> {
        let required = ["hostname", "username", "password"];
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|key| self.var(key).is_none())
            .collect();
        if !missing.is_empty() {
            bail!(
                "SSH credentials not found: {} must be declared under vars and non-empty (or set VK_VAR_<name>)",
                missing.join(", ")
            );
        }

        let port = match self.var("port") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("Invalid port '{port}'"))?,
            None => DEFAULT_PORT,
        };

        Ok(Credentials {
            hostname: self.var("hostname").unwrap_or_default().to_string(),
            username: self.var("username").unwrap_or_default().to_string(),
            password: self.var("password").unwrap_or_default().to_string(),
            port,
            sudo_password: self.var("sudo_password").map(str::to_string),
        })
    }

    /// A resolved, non-empty variable
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Replace known `${NAME}` references; `None` when nothing changed
fn expand_vars(value: &str, vars: &BTreeMap<String, String>) -> Option<String> {
    if !VAR_REF.is_match(value) {
        return None;
    }
    let expanded = VAR_REF.replace_all(value, |caps: &regex::Captures<'_>| {
        vars.get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Some(expanded.into_owned())
}

/// Fragment files directly inside `dir`, sorted by file name
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Configuration directory not found: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let is_fragment = {
            let name = entry.file_name().to_string_lossy();
            FRAGMENT_SUFFIXES.iter().any(|s| name.ends_with(s))
        };
        if entry.file_type().is_file() && is_fragment {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn parse_fragment(path: &Path) -> Result<Fragment> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    let file: FragmentFile = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content)
            .with_context(|| format!("Invalid configuration fragment: {}", path.display()))?
    } else if content.trim().is_empty() {
        FragmentFile { viki: None }
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid configuration fragment: {}", path.display()))?
    };

    if file.viki.is_none() {
        log::warn!(component = "config", op = "load"; "{} has no viki section", path.display());
    }
    Ok(file.viki.unwrap_or_default())
}

// ============================================================================
// Credentials
// ============================================================================

/// SSH connection settings
#[derive(Clone)]
pub struct Credentials {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    /// Piped into `sudo -S` for elevated kinds
    pub sudo_password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"***")
            .field("port", &self.port)
            .field(
                "sudo_password",
                &self.sudo_password.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
