//! Persisted client key/value store
//!
//! A small JSON object on disk, written through on every change. Holds the
//! theme preference and the auth token between runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub const THEME_KEY: &str = "therapybridge-theme";
pub const TOKEN_KEY: &str = "therapybridge-token";

pub struct LocalStore {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open (or lazily create) the store at `path`. A corrupt file is
    /// treated as empty and overwritten on the next write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read storage at {:?}", path))?;
            match serde_json::from_str(&raw) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable storage file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened storage at {:?}", path);
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.into());
        self.flush(&values)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(path, content).with_context(|| format!("Failed to write storage at {:?}", path))
    }
}
