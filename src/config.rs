//! Configuration for the signing engine.

use crate::error::{Error, Result};
use crate::signatures::{DigestAlgorithm, SignatureMetadata};
use crate::template::TemplateSet;
use crate::writer::FontFamily;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest selection, in view pixels, accepted for a stamp.
pub const DEFAULT_MIN_SELECTION_PX: f64 = 5.0;

/// Bytes reserved for the CMS signature.
pub const DEFAULT_ESTIMATED_SIGNATURE_SIZE: usize = 8192;

/// Signing engine configuration.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```ignore
/// use stamp_signer::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "default_reason": "Approved" }"#)?;
/// assert_eq!(config.estimated_signature_size, 8192);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum selection width and height in view pixels
    pub min_selection_px: f64,

    /// Bytes reserved for the CMS signature in `/Contents`
    pub estimated_signature_size: usize,

    /// Digest for the document and signed attributes
    pub digest_algorithm: DigestAlgorithm,

    /// `/Reason` used when a request gives none
    pub default_reason: Option<String>,

    /// `/Location` used when a request gives none
    pub default_location: Option<String>,

    /// `/ContactInfo` used when a request gives none
    pub default_contact_info: Option<String>,

    /// Family for stamp text whose markup names none
    pub font_family: FontFamily,

    /// Stamp templates and the active one
    pub templates: TemplateSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create configuration with defaults.
    pub fn new() -> Self {
        Self {
            min_selection_px: DEFAULT_MIN_SELECTION_PX,
            estimated_signature_size: DEFAULT_ESTIMATED_SIGNATURE_SIZE,
            digest_algorithm: DigestAlgorithm::default(),
            default_reason: None,
            default_location: None,
            default_contact_info: None,
            font_family: FontFamily::default(),
            templates: TemplateSet::default(),
        }
    }

    /// Parse configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        log::debug!("Loading engine configuration from {}", path.display());
        Self::from_json(&json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.min_selection_px.is_finite() || self.min_selection_px < 0.0 {
            return Err(Error::Config(format!(
                "min_selection_px must be a non-negative number, got {}",
                self.min_selection_px
            )));
        }
        if self.estimated_signature_size == 0 {
            return Err(Error::Config("estimated_signature_size must be positive".to_string()));
        }
        if self.templates.templates().is_empty() {
            return Err(Error::Config("at least one stamp template is required".to_string()));
        }
        Ok(())
    }

    /// Set the minimum selection size.
    pub fn with_min_selection_px(mut self, px: f64) -> Self {
        self.min_selection_px = px;
        self
    }

    /// Set the signature size budget.
    pub fn with_estimated_signature_size(mut self, size: usize) -> Self {
        self.estimated_signature_size = size;
        self
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    /// Set the default reason.
    pub fn with_default_reason(mut self, reason: impl Into<String>) -> Self {
        self.default_reason = Some(reason.into());
        self
    }

    /// Set the default location.
    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = Some(location.into());
        self
    }

    /// Set the default contact info.
    pub fn with_default_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.default_contact_info = Some(contact_info.into());
        self
    }

    /// Set the fallback font family.
    pub fn with_font_family(mut self, family: FontFamily) -> Self {
        self.font_family = family;
        self
    }

    /// Replace the template set.
    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    /// Metadata from the defaults, overridden field by field by `request`.
    pub fn metadata_for(&self, request: &SignatureMetadata) -> SignatureMetadata {
        SignatureMetadata {
            name: request.name.clone(),
            reason: request.reason.clone().or_else(|| self.default_reason.clone()),
            location: request.location.clone().or_else(|| self.default_location.clone()),
            contact_info: request
                .contact_info
                .clone()
                .or_else(|| self.default_contact_info.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StampTemplate;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_selection_px, 5.0);
        assert_eq!(config.estimated_signature_size, 8192);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.font_family, FontFamily::Sans);
        assert_eq!(config.templates.active_id(), "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{ "default_reason": "Approved", "digest_algorithm": "sha512", "font_family": "serif" }"#,
        )
        .unwrap();
        assert_eq!(config.default_reason.as_deref(), Some("Approved"));
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(config.font_family, FontFamily::Serif);
        assert_eq!(config.estimated_signature_size, 8192);
    }

    #[test]
    fn test_json_round_trip() {
        let mut templates = TemplateSet::default();
        templates.upsert(StampTemplate::new("short", "Short", "$$SUBJECTCN$$"));
        templates.set_active("short").unwrap();
        let config = EngineConfig::new()
            .with_default_location("Porto")
            .with_templates(templates);

        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values() {
        assert!(EngineConfig::from_json(r#"{ "estimated_signature_size": 0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "min_selection_px": -1.0 }"#).is_err());
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "min_selection_px": 12.5 }"#).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().min_selection_px, 12.5);
        assert!(EngineConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_metadata_defaults() {
        let config = EngineConfig::new()
            .with_default_reason("Default reason")
            .with_default_contact_info("ops@example.com");
        let metadata = config.metadata_for(&SignatureMetadata::default().with_reason("Mine"));
        assert_eq!(metadata.reason.as_deref(), Some("Mine"));
        assert_eq!(metadata.contact_info.as_deref(), Some("ops@example.com"));
        assert_eq!(metadata.location, None);
    }
}
