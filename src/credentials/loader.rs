//! PKCS#12 key container decoding.

use super::certificate::Certificate;
use crate::error::CredentialError;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{Id, PKey, Private};
use openssl::x509::X509;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

/// A decrypted private key with its certificate.
///
/// Lives only for the duration of one signing operation.
#[derive(Clone)]
pub struct Credential {
    private_key: RsaPrivateKey,
    certificate: Certificate,
    chain: Vec<Certificate>,
}

impl Credential {
    /// Build a credential from already-decoded parts.
    pub fn new(private_key: RsaPrivateKey, certificate: Certificate, chain: Vec<Certificate>) -> Self {
        Self {
            private_key,
            certificate,
            chain,
        }
    }

    /// The signer certificate paired with the private key.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Other certificates found in the container.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The RSA private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("subject", &self.certificate.subject())
            .field("private_key", &"[REDACTED]")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

/// Decodes password-protected key containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialLoader;

impl CredentialLoader {
    /// Decrypt `container` with `password`.
    ///
    /// Every failure maps to [`CredentialError::BadPasswordOrCorruptFile`];
    /// only the log says which step failed.
    pub fn load(container: &[u8], password: &str) -> Result<Credential, CredentialError> {
        let pkcs12 = Pkcs12::from_der(container).map_err(|e| {
            log::warn!("Corrupt certificate container: {}", e);
            CredentialError::BadPasswordOrCorruptFile
        })?;
        let parsed = pkcs12.parse2(password).map_err(|_| {
            log::warn!("Could not decrypt certificate container: bad password");
            CredentialError::BadPasswordOrCorruptFile
        })?;

        let pkey = parsed.pkey.ok_or_else(|| {
            log::warn!("Certificate container holds no private key");
            CredentialError::BadPasswordOrCorruptFile
        })?;
        if pkey.id() != Id::RSA {
            log::warn!("Unsupported private key type {:?} in certificate container", pkey.id());
            return Err(CredentialError::BadPasswordOrCorruptFile);
        }

        let mut candidates: Vec<X509> = parsed.cert.into_iter().collect();
        if let Some(ca) = parsed.ca {
            candidates.extend(ca);
        }
        let leaf_index = candidates
            .iter()
            .position(|cert| matches_key(cert, &pkey))
            .ok_or_else(|| {
                log::warn!("No certificate in the container matches its private key");
                CredentialError::BadPasswordOrCorruptFile
            })?;
        let leaf = candidates.remove(leaf_index);

        let certificate = to_certificate(&leaf)?;
        let chain = candidates
            .iter()
            .filter_map(|cert| match to_certificate(cert) {
                Ok(c) => Some(c),
                Err(_) => {
                    log::debug!("Skipping unreadable chain certificate");
                    None
                },
            })
            .collect();

        let pkcs8 = pkey.private_key_to_pkcs8().map_err(|e| {
            log::warn!("Could not export private key: {}", e);
            CredentialError::BadPasswordOrCorruptFile
        })?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&pkcs8).map_err(|e| {
            log::warn!("Could not decode RSA private key: {}", e);
            CredentialError::BadPasswordOrCorruptFile
        })?;

        log::info!("Loaded credential for {}", certificate.subject_common_name());
        Ok(Credential::new(private_key, certificate, chain))
    }

    /// Check that `container` opens with `password`.
    ///
    /// Returns the subject common name (or the full subject DN when the
    /// certificate has no CN).
    pub fn test_credential(container: &[u8], password: &str) -> Option<String> {
        Self::load(container, password)
            .ok()
            .map(|credential| credential.certificate().subject_common_name())
    }
}

fn matches_key(cert: &X509, pkey: &PKey<Private>) -> bool {
    cert.public_key()
        .map(|public| public.public_eq(pkey))
        .unwrap_or(false)
}

fn to_certificate(cert: &X509) -> Result<Certificate, CredentialError> {
    let der = cert.to_der().map_err(|e| {
        log::warn!("Could not encode certificate: {}", e);
        CredentialError::BadPasswordOrCorruptFile
    })?;
    Certificate::from_der(&der).map_err(|e| {
        log::warn!("Could not parse certificate: {}", e);
        CredentialError::BadPasswordOrCorruptFile
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_container() {
        assert_eq!(
            CredentialLoader::load(b"definitely not pkcs12", "secret").unwrap_err(),
            CredentialError::BadPasswordOrCorruptFile
        );
        assert_eq!(CredentialLoader::test_credential(&[], "secret"), None);
    }
}
