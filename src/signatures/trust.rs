//! Trust anchors and a point-in-time revocation list.

use crate::credentials::Certificate;
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Certificates accepted as roots, plus serial numbers known to be revoked.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<Certificate>,
    revoked: HashSet<String>,
}

impl TrustStore {
    /// Create an empty store. Nothing is trusted and nothing is revoked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trust anchor.
    pub fn add_anchor(&mut self, certificate: Certificate) {
        if !self.anchors.contains(&certificate) {
            self.anchors.push(certificate);
        }
    }

    /// Add a DER-encoded trust anchor.
    pub fn add_anchor_der(&mut self, der: &[u8]) -> Result<()> {
        self.add_anchor(Certificate::from_der(der)?);
        Ok(())
    }

    /// Add every certificate of a PEM bundle. Returns how many were added.
    pub fn add_anchors_pem(&mut self, pem: &[u8]) -> Result<usize> {
        let mut added = 0;
        for block in x509_parser::pem::Pem::iter_from_buffer(pem) {
            let block = block.map_err(|e| Error::Certificate(format!("invalid PEM: {}", e)))?;
            if block.label != "CERTIFICATE" {
                continue;
            }
            self.add_anchor_der(&block.contents)?;
            added += 1;
        }
        Ok(added)
    }

    /// Trust anchors in insertion order.
    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// Whether `certificate` is one of the anchors.
    pub fn is_anchor(&self, certificate: &Certificate) -> bool {
        self.anchors.iter().any(|anchor| {
            anchor.der() == certificate.der()
                || (anchor.subject_raw() == certificate.subject_raw()
                    && anchor.public_key() == certificate.public_key())
        })
    }

    /// Mark a serial number as revoked.
    ///
    /// Accepts hex with or without `:` separators, in any case.
    pub fn revoke_serial(&mut self, serial_hex: &str) {
        self.revoked.insert(normalize_serial(serial_hex));
    }

    /// Whether the certificate's serial number is revoked.
    pub fn is_revoked(&self, certificate: &Certificate) -> bool {
        self.revoked.contains(&normalize_serial(certificate.serial_hex()))
    }
}

fn normalize_serial(serial: &str) -> String {
    let hex: String = serial
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
