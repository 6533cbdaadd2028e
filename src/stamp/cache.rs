//! Preview cache.

use super::preview::StampPreview;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What a preview depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    /// SHA-256 fingerprint of the signer certificate
    pub certificate_fingerprint: String,
    /// Template identifier
    pub template_id: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl PreviewKey {
    /// Build a key.
    pub fn new(
        certificate_fingerprint: impl Into<String>,
        template_id: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            certificate_fingerprint: certificate_fingerprint.into(),
            template_id: template_id.into(),
            width,
            height,
        }
    }
}

/// Rendered previews keyed by [`PreviewKey`].
///
/// Entries must be dropped explicitly when a template or the active
/// credential changes.
#[derive(Debug, Default)]
pub struct PreviewCache {
    entries: Mutex<HashMap<PreviewKey, Arc<StampPreview>>>,
}

impl PreviewCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached preview for `key`.
    pub fn get(&self, key: &PreviewKey) -> Option<Arc<StampPreview>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Cached preview for `key`, rendering it with `render` on a miss.
    pub fn get_or_insert_with<E>(
        &self,
        key: PreviewKey,
        render: impl FnOnce() -> Result<StampPreview, E>,
    ) -> Result<Arc<StampPreview>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let preview = Arc::new(render()?);
        self.insert(key, Arc::clone(&preview));
        Ok(preview)
    }

    /// Store a preview.
    pub fn insert(&self, key: PreviewKey, preview: Arc<StampPreview>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, preview);
        }
    }

    /// Drop every entry rendered from `template_id`.
    pub fn invalidate_template(&self, template_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|k, _| k.template_id != template_id);
        }
    }

    /// Drop every entry rendered for the certificate `fingerprint`.
    pub fn invalidate_certificate(&self, fingerprint: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|k, _| k.certificate_fingerprint != fingerprint);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Number of cached previews.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stamp::StampRenderer;

    fn render() -> Result<StampPreview, Error> {
        StampRenderer::new().preview("x", 8, 8)
    }

    #[test]
    fn test_hit_skips_render() {
        let cache = PreviewCache::new();
        let key = PreviewKey::new("ab", "default", 8, 8);
        cache.get_or_insert_with(key.clone(), render).unwrap();
        let hit = cache.get_or_insert_with(key, || -> Result<StampPreview, Error> {
            panic!("should not render twice")
        });
        assert!(hit.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidation() {
        let cache = PreviewCache::new();
        cache.get_or_insert_with(PreviewKey::new("a", "t1", 8, 8), render).unwrap();
        cache.get_or_insert_with(PreviewKey::new("a", "t2", 8, 8), render).unwrap();
        cache.get_or_insert_with(PreviewKey::new("b", "t1", 8, 8), render).unwrap();
        assert_eq!(cache.len(), 3);

        cache.invalidate_template("t1");
        assert_eq!(cache.len(), 1);
        cache.invalidate_certificate("a");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_is_part_of_key() {
        let cache = PreviewCache::new();
        cache.get_or_insert_with(PreviewKey::new("a", "t", 8, 8), render).unwrap();
        assert!(cache.get(&PreviewKey::new("a", "t", 9, 8)).is_none());
    }
}
