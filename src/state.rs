use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::StateSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the state document inside the working directory
pub const STATE_FILE: &str = "state.vk.json";

// ============================================================================
// State Structures
// ============================================================================

/// The persisted state document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VikiState {
    pub viki: StateSections,

    /// Last time the state was written; absent in documents from older tools
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

/// Probe snapshot and applied resources
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StateSections {
    /// Output of the last fetch, per probe kind
    #[serde(default)]
    pub data: StateSet,

    /// Resources applied to the host, per resource kind
    #[serde(default)]
    pub mods: StateSet,
}

// ============================================================================
// VikiState Implementation
// ============================================================================

impl VikiState {
    /// Path of the state file under a working directory
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Load state from `dir`, or return an empty state if there is none yet
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);

        if !path.exists() {
            log::debug!(component = "state", op = "load"; "{} does not exist, using empty state", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!(component = "state", op = "load"; "Loaded state from {}", path.display());
        Ok(state)
    }

    /// Write state to `dir`, replacing the previous file atomically
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::path_in(dir);
        let tmp = dir.join(format!(".{STATE_FILE}.tmp"));

        let content =
            serde_json::to_string_pretty(&self).context("Failed to serialize state to JSON")?;

        fs::write(&tmp, content + "\n")
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!(component = "state", op = "save"; "Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, dir: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(dir)
    }
}

impl Default for VikiState {
    fn default() -> Self {
        Self {
            viki: StateSections::default(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ParamMap, StateEntry};
    use tempfile::TempDir;

    fn wget_entry() -> StateEntry {
        let params: ParamMap = [
            ("path", "/opt"),
            ("output", "tool.tar.gz"),
            ("url", "https://example.com/tool.tar.gz"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        StateEntry::applied(params, "saved 'tool.tar.gz'")
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = VikiState::load(dir.path()).unwrap();
        assert!(state.viki.data.is_empty());
        assert!(state.viki.mods.is_empty());
    }

    #[test]
    fn test_round_trip_keeps_output_apart_from_params() {
        let dir = TempDir::new().unwrap();
        let mut state = VikiState::default();
        state
            .viki
            .mods
            .entry("wget".into())
            .or_default()
            .insert("tool".into(), wget_entry());

        state.touch(dir.path()).unwrap();
        let loaded = VikiState::load(dir.path()).unwrap();

        assert_eq!(loaded, state);
        let entry = &loaded.viki.mods["wget"]["tool"];
        assert_eq!(entry.params["output"], "tool.tar.gz");
        assert_eq!(entry.output.as_deref(), Some("saved 'tool.tar.gz'"));
    }

    #[test]
    fn test_document_shape() {
        let dir = TempDir::new().unwrap();
        let mut state = VikiState::default();
        state
            .viki
            .mods
            .entry("wget".into())
            .or_default()
            .insert("tool".into(), wget_entry());
        state.save(dir.path()).unwrap();

        let raw = fs::read_to_string(VikiState::path_in(dir.path())).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert!(json["last_updated"].is_string());
        assert!(json["viki"]["data"].is_object());
        assert_eq!(json["viki"]["mods"]["wget"]["tool"]["_output"], "saved 'tool.tar.gz'");
        assert_eq!(json["viki"]["mods"]["wget"]["tool"]["output"], "tool.tar.gz");
        // No temp file left behind
        assert!(!dir.path().join(".state.vk.json.tmp").exists());
    }

    #[test]
    fn test_document_without_timestamp_loads() {
        let dir = TempDir::new().unwrap();
        fs::write(
            VikiState::path_in(dir.path()),
            r#"{"viki": {"data": {}, "mods": {"mkdir": {"a": {"path": "/tmp/a"}}}}}"#,
        )
        .unwrap();

        let state = VikiState::load(dir.path()).unwrap();

        let entry = &state.viki.mods["mkdir"]["a"];
        assert_eq!(entry.params["path"], "/tmp/a");
        assert_eq!(entry.output, None);
        assert!(state.viki.data.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(VikiState::path_in(dir.path()), "{not json").unwrap();
        let err = VikiState::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
