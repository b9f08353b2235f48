use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::OverrideError;

pub type OverrideMap = BTreeMap<String, bool>;

/// Persistent key-value storage for debug overrides.
pub trait OverrideStore: Send + Sync {
    /// Reads the persisted overrides. A store that has never been written
    /// returns an empty map.
    fn load(&self) -> Result<OverrideMap, OverrideError>;
    /// Replaces the persisted overrides.
    fn save(&self, overrides: &OverrideMap) -> Result<(), OverrideError>;
}

/// Per-user configuration directory for pvflags files.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("pvflags");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pvflags");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("pvflags");
    }

    PathBuf::from(".")
}

pub fn default_overrides_path() -> PathBuf {
    config_dir().join("overrides.toml")
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct OverrideFile {
    overrides: OverrideMap,
}

/// Overrides kept in a TOML file under an `[overrides]` table.
#[derive(Debug, Clone)]
pub struct TomlOverrideStore {
    path: PathBuf,
}

impl TomlOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverrideStore for TomlOverrideStore {
    fn load(&self) -> Result<OverrideMap, OverrideError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OverrideMap::new()),
            Err(source) => {
                return Err(OverrideError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: OverrideFile = toml::from_str(&text).map_err(|source| OverrideError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(file.overrides)
    }

    fn save(&self, overrides: &OverrideMap) -> Result<(), OverrideError> {
        let io_err = |source| OverrideError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let text = toml::to_string_pretty(&OverrideFile {
            overrides: overrides.clone(),
        })?;
        std::fs::write(&self.path, text).map_err(io_err)
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    saved: Mutex<OverrideMap>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: OverrideMap) -> Self {
        Self {
            saved: Mutex::new(overrides),
        }
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn load(&self) -> Result<OverrideMap, OverrideError> {
        Ok(self.saved.lock().map(|m| m.clone()).unwrap_or_default())
    }

    fn save(&self, overrides: &OverrideMap) -> Result<(), OverrideError> {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = overrides.clone();
        }
        Ok(())
    }
}

/// Forced per-key values that win over the gate evaluator.
///
/// Every mutation is written through to the store before it becomes visible;
/// a failed write leaves the previous values in place.
pub struct DebugOverrides {
    values: OverrideMap,
    store: Box<dyn OverrideStore>,
}

impl std::fmt::Debug for DebugOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugOverrides")
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl DebugOverrides {
    /// Loads persisted overrides. A broken store is reported and treated as
    /// empty so startup never fails on it.
    pub fn open(store: Box<dyn OverrideStore>) -> Self {
        let values = match store.load() {
            Ok(values) => {
                if !values.is_empty() {
                    info!("Loaded {} debug override(s)", values.len());
                }
                values
            }
            Err(e) => {
                warn!("Failed to load debug overrides: {e}; starting with none");
                OverrideMap::new()
            }
        };
        Self { values, store }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.values.get(key).copied()
    }

    pub fn all(&self) -> &OverrideMap {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, key: &str, value: bool) -> Result<(), OverrideError> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    /// Returns the removed value, if any.
    pub fn clear(&mut self, key: &str) -> Result<Option<bool>, OverrideError> {
        let Some(previous) = self.values.get(key).copied() else {
            return Ok(None);
        };
        let mut next = self.values.clone();
        next.remove(key);
        self.commit(next)?;
        Ok(Some(previous))
    }

    /// Returns the keys that had overrides.
    pub fn clear_all(&mut self) -> Result<Vec<String>, OverrideError> {
        let cleared = self.values.keys().cloned().collect();
        self.commit(OverrideMap::new())?;
        Ok(cleared)
    }

    fn commit(&mut self, next: OverrideMap) -> Result<(), OverrideError> {
        self.store.save(&next)?;
        self.values = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_live_in_the_config_dir() {
        assert_eq!(
            default_overrides_path().parent(),
            Some(config_dir().as_path())
        );
    }

    struct FailingStore;

    impl OverrideStore for FailingStore {
        fn load(&self) -> Result<OverrideMap, OverrideError> {
            Ok(OverrideMap::new())
        }

        fn save(&self, _overrides: &OverrideMap) -> Result<(), OverrideError> {
            Err(OverrideError::Io {
                path: PathBuf::from("/dev/full"),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn overrides_are_independent_per_key() {
        let mut o = DebugOverrides::open(Box::new(MemoryOverrideStore::new()));
        o.set("a", true).unwrap();
        o.set("b", false).unwrap();

        assert_eq!(o.clear("a").unwrap(), Some(true));
        assert_eq!(o.get("a"), None);
        assert_eq!(o.get("b"), Some(false));
        assert_eq!(o.clear("a").unwrap(), None);
    }

    #[test]
    fn failed_save_keeps_previous_state() {
        let mut o = DebugOverrides::open(Box::new(FailingStore));
        assert!(o.set("a", true).is_err());
        assert_eq!(o.get("a"), None);
        assert!(o.is_empty());
    }

    #[test]
    fn clear_all_reports_cleared_keys() {
        let mut o = DebugOverrides::open(Box::new(MemoryOverrideStore::with_overrides(
            [("x".to_string(), true), ("y".to_string(), false)].into(),
        )));
        let cleared = o.clear_all().unwrap();
        assert_eq!(cleared, vec!["x".to_string(), "y".to_string()]);
        assert!(o.is_empty());
    }
}
