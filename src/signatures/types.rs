//! Digest and dictionary vocabulary shared by signing and verification.

use der::oid::db::rfc5912;
use der::oid::ObjectIdentifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash applied to the covered bytes and the signed attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    /// Accepted when verifying older documents
    Sha1,
    /// Default for new signatures
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

/// Display name and OID per algorithm.
const DIGESTS: [(DigestAlgorithm, &str, ObjectIdentifier); 4] = [
    (DigestAlgorithm::Sha1, "SHA-1", rfc5912::ID_SHA_1),
    (DigestAlgorithm::Sha256, "SHA-256", rfc5912::ID_SHA_256),
    (DigestAlgorithm::Sha384, "SHA-384", rfc5912::ID_SHA_384),
    (DigestAlgorithm::Sha512, "SHA-512", rfc5912::ID_SHA_512),
];

impl DigestAlgorithm {
    fn entry(self) -> (DigestAlgorithm, &'static str, ObjectIdentifier) {
        DIGESTS[self as usize]
    }

    /// OID placed in an `AlgorithmIdentifier`.
    pub fn oid(&self) -> ObjectIdentifier {
        self.entry().2
    }

    /// Algorithm for an OID read from a CMS blob.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        DIGESTS.iter().find(|(_, _, known)| known == oid).map(|(alg, _, _)| *alg)
    }

    /// Name for log lines, e.g. `SHA-256`.
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Hash `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Hash the concatenation of `parts` without copying them together.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            DigestAlgorithm::Sha1 => run::<Sha1>(parts),
            DigestAlgorithm::Sha256 => run::<Sha256>(parts),
            DigestAlgorithm::Sha384 => run::<Sha384>(parts),
            DigestAlgorithm::Sha512 => run::<Sha512>(parts),
        }
    }
}

/// `/SubFilter` of a signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// `adbe.pkcs7.detached`, written by this crate
    #[default]
    Pkcs7Detached,
    /// `ETSI.CAdES.detached`, read but never written
    CadesDetached,
}

impl SignatureSubFilter {
    /// Name as written after `/SubFilter`.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            Self::Pkcs7Detached => "adbe.pkcs7.detached",
            Self::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Recognize a `/SubFilter` name.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        [Self::Pkcs7Detached, Self::CadesDetached]
            .into_iter()
            .find(|candidate| candidate.as_pdf_name() == name)
    }
}

/// Descriptive entries of a signature dictionary.
///
/// Optional entries that are `None` are left out of the dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureMetadata {
    /// `/Name`, normally the certificate subject CN
    pub name: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
}

impl SignatureMetadata {
    /// `/Name`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `/Reason`.
    pub fn with_reason(mut self, text: impl Into<String>) -> Self {
        self.reason = Some(text.into());
        self
    }

    /// `/Location`.
    pub fn with_location(mut self, text: impl Into<String>) -> Self {
        self.location = Some(text.into());
        self
    }

    /// `/ContactInfo`.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }
}
