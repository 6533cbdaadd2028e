//! Registry of key container paths.

use super::loader::{Credential, CredentialLoader};
use super::store::{secret_key_for, SecretStore};
use crate::error::{CredentialError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque handle to a registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CredentialRef {
    path: PathBuf,
}

impl CredentialRef {
    /// Handle for the container at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Container path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which the container password is stored.
    pub fn secret_key(&self) -> String {
        secret_key_for(&self.path)
    }
}

/// Keeps the list of known containers and their passwords.
pub struct CredentialManager {
    paths: Vec<PathBuf>,
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager").field("paths", &self.paths).finish()
    }
}

impl CredentialManager {
    /// Create an empty registry backed by `secrets`.
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            paths: Vec::new(),
            secrets,
        }
    }

    /// Replace the registered paths (e.g. from saved settings).
    pub fn set_paths<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.clear();
        for path in paths {
            self.register_path(path);
        }
    }

    /// Registered paths in insertion order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The secret store this registry writes to.
    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    fn register_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Test `path` with `password` and register it on success.
    ///
    /// The password is stored under the path-derived key with the label
    /// `"Certificate password for <CN>"`. Returns the common name.
    pub fn add(&mut self, path: impl AsRef<Path>, password: &str) -> Result<Option<String>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Could not read certificate file {}: {}", path.display(), e);
                return Ok(None);
            },
        };
        let Some(common_name) = CredentialLoader::test_credential(&bytes, password) else {
            return Ok(None);
        };

        self.secrets.store(
            &secret_key_for(path),
            &format!("Certificate password for {}", common_name),
            password,
        )?;
        self.register_path(path);
        log::info!("Registered certificate {} for {}", path.display(), common_name);
        Ok(Some(common_name))
    }

    /// Unregister `path` and forget its password.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.secrets.clear(&secret_key_for(path));
        self.paths.retain(|p| p != path);
    }

    /// Decrypt the container behind `credential` with its stored password.
    pub fn load(&self, credential: &CredentialRef) -> std::result::Result<Credential, CredentialError> {
        let password = self
            .secrets
            .lookup(&credential.secret_key())
            .ok_or(CredentialError::BadPasswordOrCorruptFile)?;
        let bytes = std::fs::read(credential.path()).map_err(|e| {
            log::warn!("Could not read certificate file {}: {}", credential.path().display(), e);
            CredentialError::BadPasswordOrCorruptFile
        })?;
        CredentialLoader::load(&bytes, &password)
    }

    /// `{common name -> path}` for every container that opens with its
    /// stored password. Others are skipped.
    pub fn display_names(&self) -> BTreeMap<String, PathBuf> {
        let mut names = BTreeMap::new();
        for path in &self.paths {
            let credential = CredentialRef::new(path.clone());
            if self.secrets.lookup(&credential.secret_key()).is_none() {
                continue;
            }
            match self.load(&credential) {
                Ok(loaded) => {
                    names.insert(loaded.certificate().subject_common_name(), path.clone());
                },
                Err(_) => log::debug!("Skipping unloadable certificate {}", path.display()),
            }
        }
        names
    }
}
