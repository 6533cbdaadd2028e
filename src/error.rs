//! Error types for the signing engine.
//!
//! [`Error`] covers the PDF and cryptographic layers. The user-facing
//! operations surface narrower enums: [`CredentialError`] from credential
//! loading and [`SignError`] from the signing engine. Scanning never fails
//! as a whole; per-field problems are reported as [`FieldError`] and logged.

/// Result type alias for PDF and crypto layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure in the PDF, DER or crypto layers.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Input does not begin with `%PDF-`
    #[error("not a PDF: header starts with '{0}'")]
    InvalidHeader(String),

    /// Object syntax error
    #[error("syntax error at byte {offset}: {reason}")]
    ParseError {
        /// Offset into the file
        offset: usize,
        /// What the parser expected
        reason: String,
    },

    /// `startxref`, the xref table or an xref stream could not be read
    #[error("cross-reference data is unreadable")]
    InvalidXref,

    /// No xref entry for a referenced object
    #[error("object {0} {1} R is not in the cross-reference data")]
    ObjectNotFound(u32, u16),

    /// An entry holds a different object type than required
    #[error("expected {expected}, got {found}")]
    InvalidObjectType {
        /// Required type
        expected: String,
        /// Type present
        found: String,
    },

    /// File system failure
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Valid PDF the signer does not handle, such as an encrypted file
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Structurally wrong document
    #[error("malformed PDF: {0}")]
    InvalidPdf(String),

    /// Filter failed on stream data
    #[error("stream decode failed: {0}")]
    Decode(String),

    /// `/Filter` names a filter with no decoder
    #[error("no decoder for filter {0}")]
    UnsupportedFilter(String),

    /// Malformed DER / ASN.1 structure
    #[error("DER error: {0}")]
    Der(String),

    /// Certificate could not be parsed or used
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Signature creation or verification primitive failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secret store backend failure
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// Nesting deeper than the parser allows
    #[error("nesting deeper than {0} levels")]
    RecursionLimitExceeded(u32),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Der(err.to_string())
    }
}

/// Failure to decode a key container.
///
/// A wrong password and a corrupt file are deliberately reported the same
/// way; the loader logs which one actually happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The container could not be decrypted or parsed.
    #[error("Bad password or corrupt certificate file")]
    BadPasswordOrCorruptFile,
}

/// Failure of a signing operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    /// A document, a selection or an active credential is missing.
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// The secret store holds no password for the active credential.
    #[error("No stored password for the active certificate")]
    MissingPassword,

    /// The key container could not be opened with the stored password.
    #[error("Could not load the certificate: bad password or corrupt file")]
    CredentialLoadFailed,

    /// Anything from field placement through the final write failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl From<Error> for SignError {
    fn from(err: Error) -> Self {
        SignError::SigningFailed(err.to_string())
    }
}

impl From<CredentialError> for SignError {
    fn from(_: CredentialError) -> Self {
        SignError::CredentialLoadFailed
    }
}

/// A single signature attribute that could not be read during a scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The attribute is not present.
    #[error("{0} is not present")]
    Missing(&'static str),

    /// The attribute is present but unreadable.
    #[error("{field} is malformed: {reason}")]
    Malformed {
        /// Attribute name
        field: &'static str,
        /// What went wrong
        reason: String,
    },
}
