//! Durable user preferences (dark mode, language).
//!
//! Only these values outlive a session; everything else in the listing state
//! is in memory. Storage is injected through [`PreferenceStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::error::{AdminError, AdminResult};

pub const DARK_MODE_KEY: &str = "darkMode";
pub const DEFAULT_LANGUAGE_KEY: &str = "piccoloAdminDefaultLanguage";

/// Key-value storage for preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> AdminResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AdminResult<()>;
}

/// Read the dark mode flag. Missing or unparseable values mean off.
pub fn load_dark_mode(store: &dyn PreferenceStore) -> bool {
    match store.get(DARK_MODE_KEY) {
        Ok(Some(value)) => value == "true",
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read dark mode preference");
            false
        }
    }
}

pub fn store_dark_mode(store: &dyn PreferenceStore, enabled: bool) -> AdminResult<()> {
    store.set(DARK_MODE_KEY, if enabled { "true" } else { "false" })
}

pub fn load_default_language(store: &dyn PreferenceStore) -> Option<String> {
    match store.get(DEFAULT_LANGUAGE_KEY) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read language preference");
            None
        }
    }
}

pub fn store_default_language(store: &dyn PreferenceStore, code: &str) -> AdminResult<()> {
    store.set(DEFAULT_LANGUAGE_KEY, code)
}

/// In-memory preferences, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> AdminResult<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| AdminError::Preferences(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AdminResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| AdminError::Preferences(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences stored as a JSON object in a file.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/piccolo-admin/preferences.json`.
    pub fn default_path() -> AdminResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("piccolo-admin").join("preferences.json"))
            .ok_or_else(|| AdminError::Preferences("No config directory available".into()))
    }

    fn read_all(&self) -> AdminResult<IndexMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(IndexMap::new()),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| AdminError::Preferences(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexMap::new()),
            Err(e) => Err(AdminError::Preferences(e.to_string())),
        }
    }

    fn write_all(&self, values: &IndexMap<String, String>) -> AdminResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AdminError::Preferences(e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| AdminError::Preferences(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| AdminError::Preferences(e.to_string()))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> AdminResult<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| AdminError::Preferences(e.to_string()))?;
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AdminResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| AdminError::Preferences(e.to_string()))?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }
}
