//! Durable key-value storage for the token pair

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::debug;

use crate::error::AuthError;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "authToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key-value storage that survives restarts
pub trait TokenStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError>;

    fn store(&self, key: &str, value: &str) -> Result<(), AuthError>;

    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// In-process store. Used when sessions should not outlive the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError> {
        let entries = self.entries.read().map_err(AuthError::storage)?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.write().map_err(AuthError::storage)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.write().map_err(AuthError::storage)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
pub struct FileTokenStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, AuthError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let data = std::fs::read_to_string(&self.path).map_err(AuthError::storage)?;
        if data.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(AuthError::storage)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(AuthError::storage)?;
            }
        }

        let data = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, data).map_err(AuthError::storage)?;
        debug!("Wrote token store {}", self.path.display());
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> Result<Option<String>, AuthError> {
        let _guard = self.lock.read().map_err(AuthError::storage)?;
        Ok(self.read_all()?.remove(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _guard = self.lock.write().map_err(AuthError::storage)?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.lock.write().map_err(AuthError::storage)?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}
