//! Small string key-value stores and typed visitor preferences.
//!
//! Flags that a browser would keep in local/session storage (cookie consent,
//! staff mode, first-visit marker, availability months already loaded) live
//! behind [`KeyValueStore`]. [`MemoryStore`] holds per-process state;
//! [`FileStore`] persists to a JSON object on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is not a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&self, key: &str) -> Result<(), KvError>;
    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>, KvError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// JSON-file backed store. Every call reads the file; writes rewrite it.
/// A missing file is an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, KvError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), KvError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), KvError> {
        let _guard = lock(&self.guard);
        let mut entries = self.read()?;
        f(&mut entries);
        self.write(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let _guard = lock(&self.guard);
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        let _guard = lock(&self.guard);
        Ok(self.read()?.into_keys().collect())
    }
}

// =============================================================================
// Preferences
// =============================================================================

pub const CONSENT_KEY: &str = "cookie_consent";
pub const STAFF_MODE_KEY: &str = "staff_mode";
pub const HAS_VISITED_KEY: &str = "has_visited";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    Accepted,
    Rejected,
}

impl ConsentState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentState::Accepted => "accepted",
            ConsentState::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ConsentState {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ConsentState::Accepted),
            "rejected" => Ok(ConsentState::Rejected),
            other => Err(KvError::InvalidValue {
                key: CONSENT_KEY.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Typed accessors over a [`KeyValueStore`].
pub struct Preferences<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// `None` until the visitor has answered the consent banner.
    pub fn consent(&self) -> Result<Option<ConsentState>, KvError> {
        self.store
            .get(CONSENT_KEY)?
            .map(|v| v.parse())
            .transpose()
    }

    pub fn set_consent(&self, state: ConsentState) -> Result<(), KvError> {
        self.store.set(CONSENT_KEY, state.as_str())
    }

    pub fn staff_mode(&self) -> Result<bool, KvError> {
        self.flag(STAFF_MODE_KEY)
    }

    pub fn set_staff_mode(&self, enabled: bool) -> Result<(), KvError> {
        if enabled {
            self.store.set(STAFF_MODE_KEY, "true")
        } else {
            self.store.remove(STAFF_MODE_KEY)
        }
    }

    pub fn has_visited(&self) -> Result<bool, KvError> {
        self.flag(HAS_VISITED_KEY)
    }

    pub fn mark_visited(&self) -> Result<(), KvError> {
        self.store.set(HAS_VISITED_KEY, "true")
    }

    fn flag(&self, key: &str) -> Result<bool, KvError> {
        match self.store.get(key)?.as_deref() {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(KvError::InvalidValue {
                key: key.to_string(),
                value: other.to_string(),
            }),
        }
    }
}
