//! Key/value storage backends behind the credential store
//!
//! The browser backends live in `keyway-web`. This module carries the trait,
//! an in-memory implementation and, on native targets, a JSON file backend.

use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Durable string key/value surface
///
/// Implementations must be cheap to call; the credential store invokes them
/// inside a short critical section.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// In-memory storage
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the session persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}


#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use super::KeyValueStorage;
    use crate::error::StorageError;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, PoisonError};

    /// Session file name inside the storage directory
    const SESSION_FILE: &str = "session.json";

    /// JSON file backed storage for native clients
    ///
    /// The whole map is rewritten on every mutation through a temporary file
    /// and a rename, so a crash never leaves a half-written file behind.
    #[derive(Debug)]
    pub struct FileStorage {
        path: PathBuf,
        lock: Mutex<()>,
    }

    impl FileStorage {
        /// Storage rooted in `dir`, using `session.json` as the file name
        pub fn new(dir: impl AsRef<Path>) -> Self {
            Self {
                path: dir.as_ref().join(SESSION_FILE),
                lock: Mutex::new(()),
            }
        }

        /// Storage in the platform data directory for `app_name`
        pub fn in_data_dir(app_name: &str) -> Result<Self, StorageError> {
            let data_dir = dirs::data_dir().ok_or_else(|| {
                StorageError::Unavailable("could not determine data directory".to_string())
            })?;
            Ok(Self::new(data_dir.join(app_name)))
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read_map(&self) -> Result<HashMap<String, String>, StorageError> {
            if !self.path.exists() {
                return Ok(HashMap::new());
            }
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                return Ok(HashMap::new());
            }
            Ok(serde_json::from_str(&contents)?)
        }

        fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(map)?;
            let tmp = self.path.with_extension("json.tmp");
            std::fs::write(&tmp, contents)?;
            std::fs::rename(&tmp, &self.path)?;
            Ok(())
        }
    }

    impl KeyValueStorage for FileStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(self.read_map()?.remove(key))
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut map = self.read_map()?;
            map.insert(key.to_string(), value.to_string());
            self.write_map(&map)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut map = self.read_map()?;
            if map.remove(key).is_some() {
                self.write_map(&map)?;
            }
            Ok(())
        }
    }
}
