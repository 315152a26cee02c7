//! Credential store: the access token, refresh token and cached user profile
//!
//! All reads and writes go through one lock so a concurrent [`CredentialStore::load`]
//! never observes a partially written set. The store also owns the session
//! generation: every login commit and every clear bumps it, and operations that
//! were started under an older generation must not write.

use crate::error::StorageError;
use crate::storage::KeyValueStorage;
use crate::types::{Credentials, User};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Storage key names for the three credential fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub user: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "accessToken".to_string(),
            refresh_token: "refreshToken".to_string(),
            user: "user".to_string(),
        }
    }
}

impl StorageKeys {
    fn all(&self) -> [&str; 3] {
        [&self.access_token, &self.refresh_token, &self.user]
    }
}

/// Durable credential persistence over a [`KeyValueStorage`] backend
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStorage>,
    keys: StorageKeys,
    /// Session generation; the lock also serializes every transaction
    generation: Mutex<u64>,
}

impl CredentialStore {
    /// Create a store using the default key names
    pub fn new(backend: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_keys(backend, StorageKeys::default())
    }

    pub fn with_keys(backend: Arc<dyn KeyValueStorage>, keys: StorageKeys) -> Self {
        Self {
            backend,
            keys,
            generation: Mutex::new(0),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Current session generation
    pub fn generation(&self) -> u64 {
        *self.lock()
    }

    /// Read the persisted credentials
    ///
    /// Backend read failures and an unreadable user record are logged and
    /// reported as absent fields.
    pub fn load(&self) -> Credentials {
        let _guard = self.lock();
        self.read_unlocked()
    }

    /// Read only the access token
    pub fn access_token(&self) -> Option<String> {
        let _guard = self.lock();
        self.read_key(&self.keys.access_token)
    }

    /// Replace the stored credentials and start a new generation
    pub fn commit(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let mut generation = self.lock();
        *generation += 1;
        self.write_unlocked(credentials)
    }

    /// Like [`commit`](Self::commit), but only if no other commit or clear
    /// happened since `expected` was observed. Returns whether it wrote.
    pub fn commit_if(&self, expected: u64, credentials: &Credentials) -> Result<bool, StorageError> {
        let mut generation = self.lock();
        if *generation != expected {
            debug!(
                "Skipping credential commit: generation {} superseded by {}",
                expected, *generation
            );
            return Ok(false);
        }
        *generation += 1;
        self.write_unlocked(credentials).map(|()| true)
    }

    /// Store renewed tokens for the current session
    ///
    /// The refresh token is only replaced when a rotated one is supplied. This
    /// does not start a new generation. Returns false without writing when the
    /// session ended after `expected` was observed.
    pub fn update_tokens_if(
        &self,
        expected: u64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut generation = self.lock();
        if *generation != expected {
            debug!(
                "Skipping token update: generation {} superseded by {}",
                expected, *generation
            );
            return Ok(false);
        }

        let mut result = self.backend.set(&self.keys.access_token, access_token);
        if result.is_ok() {
            if let Some(refresh_token) = refresh_token {
                result = self.backend.set(&self.keys.refresh_token, refresh_token);
            }
        }
        if let Err(err) = result {
            error!("Failed to persist renewed tokens, clearing credentials: {}", err);
            *generation += 1;
            let _ = self.remove_all_unlocked();
            return Err(err);
        }
        Ok(true)
    }

    /// Remove every credential field and start a new generation
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut generation = self.lock();
        *generation += 1;
        self.remove_all_unlocked()
    }

    /// Clear only if the generation is still `expected`
    pub fn clear_if(&self, expected: u64) -> Result<bool, StorageError> {
        let mut generation = self.lock();
        if *generation != expected {
            return Ok(false);
        }
        *generation += 1;
        self.remove_all_unlocked().map(|()| true)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to read credential key {}: {}", key, err);
                None
            }
        }
    }

    fn read_unlocked(&self) -> Credentials {
        let user = self
            .read_key(&self.keys.user)
            .and_then(|raw| match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!("Ignoring unreadable stored user: {}", err);
                    None
                }
            });

        Credentials {
            access_token: self.read_key(&self.keys.access_token),
            refresh_token: self.read_key(&self.keys.refresh_token),
            user,
        }
    }

    fn write_unlocked(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let result = self.try_write_unlocked(credentials);
        if let Err(err) = &result {
            error!("Credential commit failed, rolling back: {}", err);
            // Rollback errors are already logged; the original error is the one to report
            let _ = self.remove_all_unlocked();
        }
        result
    }

    fn try_write_unlocked(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let user = credentials
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.put(&self.keys.access_token, credentials.access_token.as_deref())?;
        self.put(&self.keys.refresh_token, credentials.refresh_token.as_deref())?;
        self.put(&self.keys.user, user.as_deref())
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.backend.set(key, value),
            None => self.backend.remove(key),
        }
    }

    /// Attempt every removal even if one fails; report the first failure
    fn remove_all_unlocked(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in self.keys.all() {
            if let Err(err) = self.backend.remove(key) {
                error!("Failed to remove credential key {}: {}", key, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("keys", &self.keys)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
