//! Key-value persistence
//!
//! The host supplies an installation-scoped key-value store that survives
//! restarts. The session reaches it only through [`KeyValueStore`]; this
//! module also carries an in-memory store and a JSON file store.

use crate::error::VibeflowError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const ASSIST_MODE_KEY: &str = "vibeflow.assistMode";
pub const HISTORY_KEY: &str = "vibeflow.history";
pub const MOODS_KEY: &str = "vibeflow.moods";
pub const EVENTS_KEY: &str = "vibeflow.events";

/// Installation-scoped get/set store
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), VibeflowError>;
}

/// Read and decode a typed value. A present but undecodable value is an error.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, VibeflowError> {
    match store.get(key) {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| VibeflowError::Store(format!("Failed to decode '{}': {}", key, e))),
        None => Ok(None),
    }
}

/// Encode and write a typed value
pub fn save<T: Serialize + ?Sized>(store: &mut dyn KeyValueStore, key: &str, value: &T) -> Result<(), VibeflowError> {
    let value = serde_json::to_value(value)?;
    store.set(key, value)
}

/// Process-lifetime store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), VibeflowError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Whole-document JSON file store, rewritten on every `set`
///
/// Writes go to a sibling `.tmp` file that is then renamed over the state
/// file, so a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, serde_json::Value>,
}

impl JsonFileStore {
    /// Open a store, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VibeflowError> {
        let path = path.into();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                VibeflowError::Store(format!("Failed to read state from {}: {}", path.display(), e))
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    VibeflowError::Store(format!("Invalid state file {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn persist(&self) -> Result<(), VibeflowError> {
        let serialized = serde_json::to_string(&self.values)?;
        let temp = self.staging_path();
        fs::write(&temp, serialized)
            .and_then(|()| fs::rename(&temp, &self.path))
            .map_err(|e| {
                VibeflowError::Store(format!("Failed to write state to {}: {}", self.path.display(), e))
            })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), VibeflowError> {
        self.values.insert(key.to_string(), value);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("vibeflow-store-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_typed_round_trip() {
        let mut store = MemoryStore::new();
        save(&mut store, ASSIST_MODE_KEY, &true).unwrap();

        let value: Option<bool> = load(&store, ASSIST_MODE_KEY).unwrap();
        assert_eq!(value, Some(true));

        let missing: Option<bool> = load(&store, "nope").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_load_reports_type_mismatch() {
        let mut store = MemoryStore::new();
        store.set(ASSIST_MODE_KEY, json!("yes")).unwrap();
        let result: Result<Option<bool>, _> = load(&store, ASSIST_MODE_KEY);
        assert!(matches!(result, Err(VibeflowError::Store(_))));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_path();
        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.set(ASSIST_MODE_KEY, json!(false)).unwrap();
            store.set(MOODS_KEY, json!([])).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(ASSIST_MODE_KEY), Some(json!(false)));
        assert_eq!(reopened.keys().count(), 2);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_store_replaces_atomically() {
        let path = temp_path();
        let mut store = JsonFileStore::open(&path).unwrap();
        store.set(ASSIST_MODE_KEY, json!(true)).unwrap();

        // A torn write from an earlier crash is left in the temp file only
        fs::write(store.staging_path(), "{ \"vibeflow.assist").unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(ASSIST_MODE_KEY), Some(json!(true)));

        store.set(MOODS_KEY, json!([])).unwrap();
        assert!(!store.staging_path().exists());
        assert_eq!(JsonFileStore::open(&path).unwrap().keys().count(), 2);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = temp_path();
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_store_write_failure() {
        let dir = std::env::temp_dir().join(format!("vibeflow-missing-{}", uuid::Uuid::new_v4()));
        let mut store = JsonFileStore::open(dir.join("state.json")).unwrap();
        let result = store.set(ASSIST_MODE_KEY, json!(true));
        assert!(matches!(result, Err(VibeflowError::Store(_))));
    }
}
