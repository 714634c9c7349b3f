//! Core types for declared resources, stored state and deltas

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Placeholder name to value, supplied per named instance of a kind
pub type ParamMap = IndexMap<String, String>;

/// Instance name -> value, in declaration order
pub type NameMap<T> = IndexMap<String, T>;

/// kind -> instance name -> value.
///
/// Both levels keep insertion order; the drivers run entries in that order.
pub type KindMap<T> = IndexMap<String, NameMap<T>>;

/// Desired state: kind -> name -> parameters
pub type DeclaredSet = KindMap<ParamMap>;

/// Last-known-applied state: kind -> name -> stored entry
pub type StateSet = KindMap<StateEntry>;

/// State-file key holding a stored entry's captured output.
///
/// Parameter maps must not use it; configuration loading rejects it.
pub const OUTPUT_KEY: &str = "_output";

/// A stored instance: the parameters it was applied with plus captured output.
///
/// The output lives under the reserved [`OUTPUT_KEY`] so that a user parameter
/// named `output` survives a round trip through the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(flatten)]
    pub params: ParamMap,

    #[serde(rename = "_output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl StateEntry {
    /// Entry recorded after a successful command
    pub fn applied(params: ParamMap, output: impl Into<String>) -> Self {
        Self {
            params,
            output: Some(output.into()),
        }
    }
}

impl From<ParamMap> for StateEntry {
    fn from(params: ParamMap) -> Self {
        Self {
            params,
            output: None,
        }
    }
}

/// Entries to insert or remove, keyed like a [`DeclaredSet`].
///
/// Kinds never map to an empty instance table, so `is_empty` and `count`
/// agree with what a reader of the serialized form sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Delta {
    entries: KindMap<ParamMap>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or overwrite) one entry
    pub fn insert(&mut self, kind: &str, name: &str, params: ParamMap) {
        self.entries
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), params);
    }

    /// Total number of name entries across all kinds
    pub fn count(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a (kind, name) pair is part of this delta
    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.entries
            .get(kind)
            .is_some_and(|names| names.contains_key(name))
    }

    /// Instances for one kind
    pub fn get(&self, kind: &str) -> Option<&NameMap<ParamMap>> {
        self.entries.get(kind)
    }

    /// Iterate `(kind, name, params)` in map order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ParamMap)> {
        self.entries.iter().flat_map(|(kind, names)| {
            names
                .iter()
                .map(move |(name, params)| (kind.as_str(), name.as_str(), params))
        })
    }

    /// Iterate kinds with their instance tables
    pub fn kinds(&self) -> impl Iterator<Item = (&str, &NameMap<ParamMap>)> {
        self.entries.iter().map(|(kind, names)| (kind.as_str(), names))
    }
}

impl From<KindMap<ParamMap>> for Delta {
    fn from(mut entries: KindMap<ParamMap>) -> Self {
        entries.retain(|_, names| !names.is_empty());
        Self { entries }
    }
}

/// Outcome of running one entry's command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Insert command succeeded and the entry was recorded
    Created,
    /// Remove command succeeded and the entry was dropped
    Removed,
    /// Probe command succeeded and its output was captured
    Fetched,
    /// Command exited non-zero
    Failed { status: i32, output: String },
    /// Command was never run
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

/// What a remote command returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; 0 is success
    pub status: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    pub fn new(status: i32, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_delta_count_sums_all_kinds() {
        let mut delta = Delta::new();
        delta.insert("mkdir", "a", params(&[("path", "/tmp/a")]));
        delta.insert("mkdir", "b", params(&[("path", "/tmp/b")]));
        delta.insert("wget", "c", ParamMap::new());

        assert_eq!(delta.count(), 3);
        assert!(delta.contains("mkdir", "b"));
        assert!(!delta.contains("wget", "a"));
        assert_eq!(delta.iter().count(), 3);
    }

    #[test]
    fn test_delta_from_map_drops_empty_kinds() {
        let mut map = KindMap::new();
        map.insert("mkdir".to_string(), NameMap::new());
        let delta = Delta::from(map);
        assert!(delta.is_empty());
        assert_eq!(delta.count(), 0);
    }

    #[test]
    fn test_state_entry_keeps_output_param_apart() {
        let entry = StateEntry::applied(
            params(&[("path", "/srv"), ("output", "app.tar.gz")]),
            "saved",
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["output"], "app.tar.gz");
        assert_eq!(json["_output"], "saved");

        let back: StateEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.params.get("output").map(String::as_str), Some("app.tar.gz"));
    }

    #[test]
    fn test_state_entry_without_output() {
        let back: StateEntry = serde_json::from_str(r#"{"path": "/tmp/a"}"#).unwrap();
        assert_eq!(back.output, None);
        assert_eq!(back.params, params(&[("path", "/tmp/a")]));
    }

    #[test]
    fn test_apply_result_classification() {
        assert!(ApplyResult::Created.is_success());
        assert!(ApplyResult::Fetched.is_success());
        let failed = ApplyResult::Failed {
            status: 1,
            output: String::new(),
        };
        assert!(!failed.is_success());
        assert!(
            !ApplyResult::Skipped {
                reason: "x".into()
            }
            .is_success()
        );
    }
}
