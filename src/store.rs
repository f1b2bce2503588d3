//! Persistence for custom commands and preferences.
//!
//! Storage is a plain key-value interface holding one JSON document per key.
//! [`FileStore`] keeps each key in `<dir>/<key>.json`; [`MemoryStore`] is
//! for embedding hosts that persist elsewhere and for tests.

use crate::error::{AssistantError, Result};
use crate::router::CustomCommand;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key holding the ordered custom-command list.
pub const CUSTOM_COMMANDS_KEY: &str = "custom_commands";

/// Key holding the preferences blob.
pub const PREFERENCES_KEY: &str = "preferences";

/// String-keyed document store.
pub trait KeyValueStore: Send + Sync {
    /// Read the document stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Replace the document stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Directory-backed store, one `<key>.json` file per key.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AssistantError::Storage(format!("invalid key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AssistantError::Storage(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AssistantError::Storage(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        // Readers only ever see a complete document.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| AssistantError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            AssistantError::Storage(format!("cannot replace {}: {e}", path.display()))
        })?;
        debug!("persisted {key} to {}", path.display());
        Ok(())
    }
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AssistantError::Storage(format!("store lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AssistantError::Storage(format!("store lock poisoned: {e}")))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Free-form user preferences, persisted as one JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(BTreeMap<String, serde_json::Value>);

impl Preferences {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Load the custom-command list. Missing or unreadable data loads as empty.
pub fn load_custom_commands(store: &dyn KeyValueStore) -> Vec<CustomCommand> {
    load_or_default(store, CUSTOM_COMMANDS_KEY)
}

/// Replace the persisted custom-command list.
///
/// # Errors
///
/// Returns an error if the list cannot be serialized or written.
pub fn save_custom_commands(store: &dyn KeyValueStore, commands: &[CustomCommand]) -> Result<()> {
    let json = serde_json::to_string(commands)?;
    store.set(CUSTOM_COMMANDS_KEY, &json)
}

/// Load preferences. Missing or unreadable data loads as empty.
pub fn load_preferences(store: &dyn KeyValueStore) -> Preferences {
    load_or_default(store, PREFERENCES_KEY)
}

/// Replace the persisted preferences.
///
/// # Errors
///
/// Returns an error if the preferences cannot be serialized or written.
pub fn save_preferences(store: &dyn KeyValueStore, preferences: &Preferences) -> Result<()> {
    let json = serde_json::to_string(preferences)?;
    store.set(PREFERENCES_KEY, &json)
}

fn load_or_default<T: Default + for<'de> Deserialize<'de>>(
    store: &dyn KeyValueStore,
    key: &str,
) -> T {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!("cannot load {key}: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("ignoring corrupt {key}: {e}");
            T::default()
        }
    }
}
