//! PDF signature verification.
//!
//! Each check is reported on its own: integrity of the covered bytes, the
//! CMS signature over the signed attributes, the certificate chain, trust
//! in the chain's root, and revocation.

use super::byterange::ByteRangeCalculator;
use super::pkcs7::{rsa_verify, SignedData};
use super::trust::TrustStore;
use super::types::DigestAlgorithm;
use crate::credentials::Certificate;
use chrono::{DateTime, Utc};

const MAX_CHAIN_DEPTH: usize = 10;

/// Outcome of verifying one signature.
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    /// Byte range well formed and covered bytes hash to the signed digest
    pub intact: bool,
    /// CMS signature verifies with the signer's public key
    pub signature_verified: bool,
    /// Certificate path up to a root or anchor verifies link by link
    pub chain_verified: bool,
    /// Path ends at a trust anchor and the signer certificate is current
    pub trusted: bool,
    /// Signer serial number is on the revocation list
    pub revoked: bool,
    /// Signer certificate, when it could be identified
    pub signer: Option<Certificate>,
    /// Parsed CMS structure
    pub signed_data: Option<SignedData>,
    /// Why checks failed
    pub messages: Vec<String>,
}

impl VerificationResult {
    /// All cryptographic checks passed.
    pub fn cryptographically_valid(&self) -> bool {
        self.intact && self.signature_verified && self.chain_verified
    }
}

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone)]
pub struct SignatureVerifier<'a> {
    trust: &'a TrustStore,
    now: DateTime<Utc>,
}

impl<'a> SignatureVerifier<'a> {
    /// Create a verifier that checks validity periods against the current time.
    pub fn new(trust: &'a TrustStore) -> Self {
        Self {
            trust,
            now: Utc::now(),
        }
    }

    /// Check validity periods against `now` instead.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Verify the signature whose `/ByteRange` is `byte_range` and whose
    /// decoded `/Contents` is `contents`.
    pub fn verify(
        &self,
        pdf_data: &[u8],
        byte_range: &[i64; 4],
        contents: &[u8],
    ) -> VerificationResult {
        let mut result = VerificationResult::default();

        let slices = match ByteRangeCalculator::validate_byte_range(byte_range, pdf_data.len())
            .and_then(|_| ByteRangeCalculator::signed_slices(pdf_data, byte_range))
        {
            Ok(slices) => Some(slices),
            Err(e) => {
                result.messages.push(format!("ByteRange validation failed: {}", e));
                None
            },
        };

        let signed_data = match SignedData::parse(contents) {
            Ok(parsed) => parsed,
            Err(e) => {
                result.messages.push(format!("Unreadable CMS signature: {}", e));
                return result;
            },
        };

        let certificates: Vec<Certificate> = signed_data
            .certificates
            .iter()
            .filter_map(|der| match Certificate::from_der(der) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    log::debug!("Skipping unreadable embedded certificate: {}", e);
                    None
                },
            })
            .collect();
        let signer_info = &signed_data.signer;
        let signer = certificates
            .iter()
            .find(|cert| {
                signer_info.issuer_raw.as_deref() == Some(cert.issuer_raw())
                    && signer_info.serial.as_deref() == Some(cert.raw_serial())
            })
            .or_else(|| certificates.first())
            .cloned();

        match signer_info.digest_algorithm {
            Some(digest) => {
                if let Some((first, second)) = slices {
                    let content_digest = digest.digest_parts(&[first, second]);
                    self.check_signature(
                        &mut result,
                        &signed_data,
                        signer.as_ref(),
                        digest,
                        &content_digest,
                        first,
                        second,
                    );
                }
            },
            None => result.messages.push(format!(
                "Unsupported digest algorithm {}",
                signer_info.digest_algorithm_oid
            )),
        }

        if let Some(signer) = &signer {
            let (chain_verified, ends_at_anchor) = self.verify_chain(signer, &certificates);
            result.chain_verified = chain_verified;
            if !chain_verified {
                result.messages.push("Certificate chain could not be verified".to_string());
            }
            let current = signer.is_valid_at(self.now);
            if !current {
                result.messages.push("Signer certificate is outside its validity period".to_string());
            }
            result.trusted = chain_verified && ends_at_anchor && current;
            result.revoked = self.trust.is_revoked(signer);
        } else {
            result.messages.push("No signer certificate embedded".to_string());
        }

        result.signer = signer;
        result.signed_data = Some(signed_data);
        result
    }

    fn check_signature(
        &self,
        result: &mut VerificationResult,
        signed_data: &SignedData,
        signer: Option<&Certificate>,
        digest: DigestAlgorithm,
        content_digest: &[u8],
        first: &[u8],
        second: &[u8],
    ) {
        let info = &signed_data.signer;
        if !is_rsa_signature(&info.signature_algorithm_oid) {
            result.messages.push(format!(
                "Unsupported signature algorithm {}",
                info.signature_algorithm_oid
            ));
        }
        let verify = |message: &[u8]| -> bool {
            let Some(signer) = signer else { return false };
            if !is_rsa_signature(&info.signature_algorithm_oid) {
                return false;
            }
            rsa_verify(signer.public_key(), digest, message, &info.signature).unwrap_or(false)
        };

        match &info.signed_attributes {
            Some(attributes) => {
                result.intact = info.message_digest.as_deref() == Some(content_digest);
                if !result.intact {
                    result
                        .messages
                        .push("Document digest does not match the signed digest".to_string());
                }
                result.signature_verified = verify(attributes);
            },
            None => {
                // Without signed attributes the signature covers the content itself
                let mut content = Vec::with_capacity(first.len() + second.len());
                content.extend_from_slice(first);
                content.extend_from_slice(second);
                result.signature_verified = verify(&content);
                result.intact = result.signature_verified;
            },
        }
        if !result.signature_verified {
            result.messages.push("Signature value does not verify".to_string());
        }
    }

    /// Returns `(verified, ends_at_anchor)`.
    fn verify_chain(&self, signer: &Certificate, embedded: &[Certificate]) -> (bool, bool) {
        let mut current = signer.clone();
        for _ in 0..MAX_CHAIN_DEPTH {
            if self.trust.is_anchor(&current) {
                return (true, true);
            }
            if current.is_self_issued() {
                return (verify_issued_by(&current, &current), false);
            }
            let issuer = embedded
                .iter()
                .chain(self.trust.anchors())
                .filter(|candidate| candidate.subject_raw() == current.issuer_raw())
                .find(|candidate| verify_issued_by(&current, candidate));
            match issuer {
                Some(issuer) => current = issuer.clone(),
                None => return (false, false),
            }
        }
        (false, false)
    }
}

fn is_rsa_signature(oid: &str) -> bool {
    oid == "1.2.840.113549.1.1.1" || rsa_signature_digest(oid).is_some()
}

/// Digest of a `shaNWithRSAEncryption` algorithm.
fn rsa_signature_digest(oid: &str) -> Option<DigestAlgorithm> {
    match oid {
        "1.2.840.113549.1.1.5" => Some(DigestAlgorithm::Sha1),
        "1.2.840.113549.1.1.11" => Some(DigestAlgorithm::Sha256),
        "1.2.840.113549.1.1.12" => Some(DigestAlgorithm::Sha384),
        "1.2.840.113549.1.1.13" => Some(DigestAlgorithm::Sha512),
        _ => None,
    }
}

/// Whether `issuer`'s key verifies `child`'s certificate signature.
fn verify_issued_by(child: &Certificate, issuer: &Certificate) -> bool {
    let Some(digest) = rsa_signature_digest(child.signature_algorithm()) else {
        log::debug!("Unsupported certificate signature algorithm {}", child.signature_algorithm());
        return false;
    };
    rsa_verify(issuer.public_key(), digest, child.tbs(), child.signature()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::pkcs7::build_signed_data;
    use crate::test_support;
    use chrono::TimeZone;

    fn signed_blob(
        credential: &crate::credentials::Credential,
        data: &[u8],
        range: &[i64; 4],
    ) -> Vec<u8> {
        let covered = ByteRangeCalculator::extract_signed_bytes(data, range).unwrap();
        let digest = DigestAlgorithm::Sha256.digest(&covered);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        build_signed_data(credential, DigestAlgorithm::Sha256, &digest, &at).unwrap()
    }

    #[test]
    fn test_self_signed_untrusted() {
        let credential = test_support::self_signed_credential("Alice");
        let data = b"0123456789<gap>abcdefghij".to_vec();
        let range = [0, 10, 15, 10];
        let contents = signed_blob(&credential, &data, &range);

        let trust = TrustStore::new();
        let result = SignatureVerifier::new(&trust).verify(&data, &range, &contents);
        assert!(result.intact, "{:?}", result.messages);
        assert!(result.signature_verified);
        assert!(result.chain_verified);
        assert!(result.cryptographically_valid());
        assert!(!result.trusted);
        assert!(!result.revoked);
        assert_eq!(result.signer.unwrap().subject_common_name(), "Alice");
    }

    #[test]
    fn test_anchor_makes_trusted() {
        let (credential, ca_der) = test_support::ca_issued_credential("Bob", 77);
        let data = b"0123456789<gap>abcdefghij".to_vec();
        let range = [0, 10, 15, 10];
        let contents = signed_blob(&credential, &data, &range);

        let mut trust = TrustStore::new();
        let untrusted = SignatureVerifier::new(&trust).verify(&data, &range, &contents);
        assert!(untrusted.chain_verified);
        assert!(!untrusted.trusted);

        trust.add_anchor_der(&ca_der).unwrap();
        let trusted = SignatureVerifier::new(&trust).verify(&data, &range, &contents);
        assert!(trusted.trusted);
        assert!(trusted.cryptographically_valid());

        // Long after the certificate expired
        let later = Utc::now() + chrono::Duration::days(3650);
        let expired = SignatureVerifier::new(&trust).at(later).verify(&data, &range, &contents);
        assert!(!expired.trusted);
        assert!(expired.cryptographically_valid());
    }

    #[test]
    fn test_tampered_content() {
        let credential = test_support::self_signed_credential("Carol");
        let mut data = b"0123456789<gap>abcdefghij".to_vec();
        let range = [0, 10, 15, 10];
        let contents = signed_blob(&credential, &data, &range);
        data[2] = b'X';

        let trust = TrustStore::new();
        let result = SignatureVerifier::new(&trust).verify(&data, &range, &contents);
        assert!(!result.intact);
        assert!(result.signature_verified);
        assert!(!result.cryptographically_valid());
        assert!(result.signer.is_some());
    }

    #[test]
    fn test_revoked_serial() {
        let (credential, _) = test_support::ca_issued_credential("Dave", 0x1234);
        let data = b"0123456789<gap>abcdefghij".to_vec();
        let range = [0, 10, 15, 10];
        let contents = signed_blob(&credential, &data, &range);

        let mut trust = TrustStore::new();
        trust.revoke_serial("1234");
        let result = SignatureVerifier::new(&trust).verify(&data, &range, &contents);
        assert!(result.revoked);
        assert!(result.intact);
    }

    #[test]
    fn test_garbage_contents() {
        let trust = TrustStore::new();
        let result =
            SignatureVerifier::new(&trust).verify(b"0123456789", &[0, 2, 4, 6], &[0u8; 32]);
        assert!(!result.intact);
        assert!(!result.cryptographically_valid());
        assert!(result.signer.is_none());
        assert!(!result.messages.is_empty());
    }
}
