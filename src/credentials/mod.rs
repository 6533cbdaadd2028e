//! Signing credentials.
//!
//! - [`CredentialLoader`] decrypts a PKCS#12 container into a [`Credential`]
//! - [`SecretStore`] is the password vault contract
//! - [`CredentialManager`] keeps the list of registered containers

pub mod certificate;
mod loader;
mod manager;
mod store;

pub use certificate::Certificate;
pub use loader::{Credential, CredentialLoader};
pub use manager::{CredentialManager, CredentialRef};
pub use store::{secret_key_for, InMemorySecretStore, SecretStore};
