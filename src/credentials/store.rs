//! Password storage contract.
//!
//! The engine only ever asks a [`SecretStore`] for the password of a key
//! container; where and how it is kept is up to the implementation.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Key/value password vault.
pub trait SecretStore: Send + Sync {
    /// Password stored under `key`, if any.
    fn lookup(&self, key: &str) -> Option<String>;

    /// Store `password` under `key` with a human-readable `label`.
    fn store(&self, key: &str, label: &str, password: &str) -> Result<()>;

    /// Forget the password stored under `key`.
    fn clear(&self, key: &str);
}

/// Derive the store key for a key container path.
///
/// ```
/// use stamp_signer::credentials::secret_key_for;
///
/// assert_eq!(secret_key_for("/certs/me.p12".as_ref()), "stamp_signer:/certs/me.p12");
/// ```
pub fn secret_key_for(path: &Path) -> String {
    format!("{}:{}", crate::NAME, path.to_string_lossy())
}

#[derive(Clone)]
struct Entry {
    label: String,
    password: String,
}

/// Process-local [`SecretStore`].
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Label recorded for `key`.
    pub fn label(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).map(|e| e.label.clone()))
    }

    /// Number of stored passwords.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no password is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("entries", &self.len())
            .finish()
    }
}

impl SecretStore for InMemorySecretStore {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).map(|e| e.password.clone()))
    }

    fn store(&self, key: &str, label: &str, password: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::SecretStore("secret store lock poisoned".to_string()))?;
        entries.insert(
            key.to_string(),
            Entry {
                label: label.to_string(),
                password: password.to_string(),
            },
        );
        Ok(())
    }

    fn clear(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}
