//! Owned X.509 certificate summary.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

/// OID of rsaEncryption.
pub const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// A parsed certificate with the fields signing and verification need.
///
/// The DER bytes are kept so the certificate can be embedded in a CMS
/// structure unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    subject_cn: Option<String>,
    issuer_cn: Option<String>,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    serial_decimal: String,
    serial_hex: String,
    raw_serial: Vec<u8>,
    not_before: i64,
    not_after: i64,
    public_key_algorithm: String,
    public_key: Vec<u8>,
    tbs: Vec<u8>,
    signature_algorithm: String,
    signature: Vec<u8>,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) =
            parse_x509_certificate(der).map_err(|e| Error::Certificate(format!("invalid certificate: {}", e)))?;

        let first_cn = |name: &X509Name<'_>| {
            name.iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
        };
        let tbs = &cert.tbs_certificate;
        let spki = cert.public_key();

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_cn: first_cn(cert.subject()),
            issuer_cn: first_cn(cert.issuer()),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            serial_decimal: tbs.serial.to_string(),
            serial_hex: tbs.serial.to_str_radix(16),
            raw_serial: tbs.raw_serial().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            public_key_algorithm: spki.algorithm.algorithm.to_id_string(),
            public_key: spki.subject_public_key.data.to_vec(),
            tbs: tbs.as_ref().to_vec(),
            signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
        })
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name as a string.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name as a string.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject common name, falling back to the full subject DN.
    pub fn subject_common_name(&self) -> String {
        self.subject_cn.clone().unwrap_or_else(|| self.subject.clone())
    }

    /// Issuer common name, falling back to the full issuer DN.
    pub fn issuer_common_name(&self) -> String {
        self.issuer_cn.clone().unwrap_or_else(|| self.issuer.clone())
    }

    /// Raw DER of the subject name.
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// Raw DER of the issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// Serial number in decimal.
    pub fn serial_decimal(&self) -> &str {
        &self.serial_decimal
    }

    /// Serial number in lowercase hex without separators.
    pub fn serial_hex(&self) -> &str {
        &self.serial_hex
    }

    /// Content octets of the serial INTEGER.
    pub fn raw_serial(&self) -> &[u8] {
        &self.raw_serial
    }

    /// Start of the validity period.
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.not_before, 0).single()
    }

    /// End of the validity period.
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.not_after, 0).single()
    }

    /// Whether `at` falls inside the validity period.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        let ts = at.timestamp();
        self.not_before <= ts && ts <= self.not_after
    }

    /// Dotted OID of the subject public key algorithm.
    pub fn public_key_algorithm(&self) -> &str {
        &self.public_key_algorithm
    }

    /// Subject public key bits (a PKCS#1 `RSAPublicKey` for RSA keys).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Whether the subject key is RSA.
    pub fn is_rsa(&self) -> bool {
        self.public_key_algorithm == RSA_ENCRYPTION_OID
    }

    /// DER of the to-be-signed part.
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    /// Dotted OID of the issuer's signature algorithm.
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    /// Issuer signature over [`tbs`](Self::tbs).
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Whether subject and issuer are the same name.
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// SHA-256 of the DER encoding, lowercase hex.
    pub fn fingerprint(&self) -> String {
        Sha256::digest(&self.der).iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(Certificate::from_der(b"not a certificate"), Err(Error::Certificate(_))));
        assert!(Certificate::from_der(&[]).is_err());
    }
}
