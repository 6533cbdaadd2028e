//! PDF digital signatures.
//!
//! Creation and verification of `adbe.pkcs7.detached` signatures:
//!
//! - **Signing**: [`PdfSigner`] appends a signed revision holding the
//!   signature dictionary, a visible widget and the updated form
//! - **Verification**: [`SignatureVerifier`] checks integrity, the CMS
//!   signature, the certificate chain, trust and revocation separately
//! - **Scanning**: [`SignatureScanner`] finds every signature in a document
//!   and reports on each as a [`SignatureRecord`]
//! - **ByteRange Calculation**: [`ByteRangeCalculator`] handles the
//!   placeholder, patching and covered-byte extraction
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 - Cryptographic Message Syntax

mod byterange;
pub mod pkcs7;
mod scanner;
mod signer;
mod trust;
mod types;
mod verifier;

pub use byterange::{bytes_to_hex, ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
pub use scanner::{SignatureRecord, SignatureScanner, UNKNOWN};
pub use signer::{
    existing_field_names, format_pdf_date, unique_field_name, PdfSigner, SignaturePlacement,
    SignedRevision,
};
pub use trust::TrustStore;
pub use types::{DigestAlgorithm, SignatureMetadata, SignatureSubFilter};
pub use verifier::{SignatureVerifier, VerificationResult};
