//! Durable pipeline progress.
//!
//! The state document is one flat JSON object at a configurable path. Keys
//! map to booleans (stage completion, `step_<name>`) or integers (row cursors
//! such as `ocr_index`). Every call re-reads the whole document and every
//! write rewrites it; there is no locking, so a single runner per document is
//! assumed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// A value stored in the state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Flag(bool),
    Cursor(u64),
}

impl StateValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(StateValue::Flag(*b)),
            Value::Number(n) => n.as_u64().map(StateValue::Cursor),
            _ => None,
        }
    }

    fn to_json(self) -> Value {
        match self {
            StateValue::Flag(b) => Value::Bool(b),
            StateValue::Cursor(n) => Value::from(n),
        }
    }

    /// Truthiness, so a cursor written under a step key still reads as done.
    pub fn as_flag(self) -> bool {
        match self {
            StateValue::Flag(b) => b,
            StateValue::Cursor(n) => n != 0,
        }
    }

    pub fn as_cursor(self) -> Option<u64> {
        match self {
            StateValue::Cursor(n) => Some(n),
            StateValue::Flag(_) => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Flag(b)
    }
}

impl From<u64> for StateValue {
    fn from(n: u64) -> Self {
        StateValue::Cursor(n)
    }
}

impl From<usize> for StateValue {
    fn from(n: usize) -> Self {
        StateValue::Cursor(n as u64)
    }
}

/// Key under which a stage's completion is recorded.
pub fn step_key(stage: &str) -> String {
    format!("step_{}", stage)
}

/// Read-modify-write access to the state document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document. A missing, unreadable or corrupt file reads
    /// as an empty document.
    fn load(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = ?self.path, error = %e, "State file unreadable, treating as empty");
                }
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!(path = ?self.path, "State file is not a JSON object, treating as empty");
                Map::new()
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "State file corrupt, treating as empty");
                Map::new()
            }
        }
    }

    fn save(&self, state: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create state directory {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;
        Ok(())
    }

    /// Value stored under `key`, or `default` if the key is absent, holds a
    /// value of an unsupported type, or the document cannot be read.
    pub fn get(&self, key: &str, default: StateValue) -> StateValue {
        self.load()
            .get(key)
            .and_then(StateValue::from_json)
            .unwrap_or(default)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key, StateValue::Flag(false)).as_flag()
    }

    pub fn cursor(&self, key: &str) -> u64 {
        self.get(key, StateValue::Cursor(0)).as_cursor().unwrap_or(0)
    }

    /// Update one key and rewrite the document. Other keys, including ones
    /// this crate does not understand, are preserved.
    pub fn set(&self, key: &str, value: impl Into<StateValue>) -> Result<()> {
        let mut state = self.load();
        state.insert(key.to_string(), value.into().to_json());
        self.save(&state)
    }

    /// Forget all progress. The next run starts from the first stage.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove state file {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        assert_eq!(store.get("step_fetch", StateValue::Flag(false)), StateValue::Flag(false));
        assert_eq!(store.get("ocr_index", StateValue::Cursor(7)), StateValue::Cursor(7));
        assert!(!store.flag("step_fetch"));
        assert_eq!(store.cursor("ocr_index"), 0);
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ \"step_fetch\": tru").unwrap();
        let store = StateStore::new(&path);

        assert!(!store.flag("step_fetch"));

        // A write over a corrupt document starts from scratch.
        store.set("step_download", true).unwrap();
        assert!(store.flag("step_download"));
        assert!(!store.flag("step_fetch"));
    }

    #[test]
    fn test_set_creates_parent_and_preserves_keys() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("results/state.json"));

        store.set("step_fetch", true).unwrap();
        store.set("social_index", 42usize).unwrap();
        store.set("step_fetch", true).unwrap();

        assert!(store.flag("step_fetch"));
        assert_eq!(store.cursor("social_index"), 42);

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["step_fetch"], Value::Bool(true));
        assert_eq!(raw["social_index"], Value::from(42));
    }

    #[test]
    fn test_foreign_values_are_kept_but_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"note": "manual", "ocr_index": -3}"#).unwrap();
        let store = StateStore::new(&path);

        assert_eq!(store.cursor("ocr_index"), 0);
        store.set("step_hash", true).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["note"], Value::from("manual"));
    }

    #[test]
    fn test_clear_resets_progress() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.set(&step_key("fetch"), true).unwrap();

        store.clear().unwrap();
        assert!(!store.flag("step_fetch"));
        store.clear().unwrap();
    }
}
