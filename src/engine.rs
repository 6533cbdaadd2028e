//! The signing engine.
//!
//! [`SigningEngine::sign`] turns a [`SignatureRequest`] into a new signed
//! file next to the source document:
//!
//! 1. check the request has a document, a selection and a credential
//! 2. fetch the container password from the [`SecretStore`] and decrypt it
//! 3. map the selection to PDF user space
//! 4. resolve the stamp template and render the appearance
//! 5. append a signed revision and write it to `<stem>-signed.<ext>`
//!    (or `-signed-1`, `-signed-2`, …), never overwriting anything
//!
//! Either a complete signed file appears or nothing on disk changes.

use crate::config::EngineConfig;
use crate::credentials::{Certificate, Credential, CredentialLoader, CredentialRef, SecretStore};
use crate::document::PdfDocument;
use crate::error::{Error, Result, SignError};
use crate::geometry::{CoordinateMapper, DocRect, ViewRect};
use crate::signatures::{
    PdfSigner, SignatureMetadata, SignaturePlacement, SignatureRecord, SignatureScanner, TrustStore,
};
use crate::stamp::{PreviewCache, PreviewKey, StampPreview, StampRenderer};
use crate::template::{StampTemplate, TemplateResolver};
use chrono::{DateTime, FixedOffset, Local};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where a signing operation got to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningState {
    /// Nothing has happened yet
    #[default]
    Idle,
    /// The credential was decrypted
    CredentialResolved,
    /// The stamp appearance was rendered
    AppearanceRendered,
    /// The signature field was laid out on the page
    FieldPlaced,
    /// The signed revision was assembled in memory
    Signed,
    /// The signed file was written
    Written(PathBuf),
    /// The operation stopped
    Failed(String),
}

/// One sign action from the user.
#[derive(Debug, Clone, Default)]
pub struct SignatureRequest {
    /// Document to sign
    pub document_path: Option<PathBuf>,
    /// Zero-based page index
    pub page_index: usize,
    /// Selection on the displayed page
    pub view_rect: Option<ViewRect>,
    /// Width of the displayed page in pixels
    pub view_width: f64,
    /// Credential to sign with
    pub credential: Option<CredentialRef>,
    /// Stamp template; the active one when `None`
    pub template_id: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
}

impl SignatureRequest {
    /// Request signing `document_path` at `view_rect` on page `page_index`
    /// shown `view_width` pixels wide.
    pub fn new(
        document_path: impl Into<PathBuf>,
        page_index: usize,
        view_rect: ViewRect,
        view_width: f64,
        credential: CredentialRef,
    ) -> Self {
        Self {
            document_path: Some(document_path.into()),
            page_index,
            view_rect: Some(view_rect),
            view_width,
            credential: Some(credential),
            ..Self::default()
        }
    }

    /// Use the template `id`.
    pub fn with_template(mut self, id: impl Into<String>) -> Self {
        self.template_id = Some(id.into());
        self
    }

    /// Set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the contact info.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }

    fn metadata(&self) -> SignatureMetadata {
        SignatureMetadata {
            name: None,
            reason: self.reason.clone(),
            location: self.location.clone(),
            contact_info: self.contact_info.clone(),
        }
    }
}

/// Removes a document from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.path);
        }
    }
}

/// Signs documents and scans them for signatures.
pub struct SigningEngine {
    config: EngineConfig,
    secrets: Arc<dyn SecretStore>,
    trust: TrustStore,
    renderer: StampRenderer,
    previews: PreviewCache,
    in_flight: Mutex<HashSet<PathBuf>>,
    state: Mutex<SigningState>,
}

impl std::fmt::Debug for SigningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningEngine")
            .field("config", &self.config)
            .field("trust", &self.trust)
            .field("previews", &self.previews.len())
            .finish()
    }
}

impl SigningEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig, secrets: Arc<dyn SecretStore>, trust: TrustStore) -> Self {
        let renderer = StampRenderer::new().with_font_family(config.font_family);
        Self {
            config,
            secrets,
            trust,
            renderer,
            previews: PreviewCache::new(),
            in_flight: Mutex::new(HashSet::new()),
            state: Mutex::new(SigningState::Idle),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Trust anchors and revocations used by [`scan`](Self::scan).
    pub fn trust(&self) -> &TrustStore {
        &self.trust
    }

    /// Mutable access to the trust store.
    pub fn trust_mut(&mut self) -> &mut TrustStore {
        &mut self.trust
    }

    /// State reached by the most recent signing operation.
    pub fn last_state(&self) -> SigningState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn set_state(&self, state: SigningState) {
        log::debug!("Signing state: {:?}", state);
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Make `id` the active template. Cached previews are dropped.
    pub fn set_active_template(&mut self, id: &str) -> Result<()> {
        self.config.templates.set_active(id)?;
        self.previews.clear();
        Ok(())
    }

    /// Add or replace a template. Its cached previews are dropped.
    pub fn upsert_template(&mut self, template: StampTemplate) {
        self.previews.invalidate_template(&template.id);
        self.config.templates.upsert(template);
    }

    /// Drop cached previews rendered for `certificate`.
    pub fn invalidate_credential(&self, certificate: &Certificate) {
        self.previews.invalidate_certificate(&certificate.fingerprint());
    }

    /// Drop every cached preview, e.g. when the selection box changes.
    pub fn clear_previews(&self) {
        self.previews.clear();
    }

    fn template(&self, id: Option<&str>) -> Option<&StampTemplate> {
        match id {
            Some(id) => self.config.templates.get(id),
            None => self.config.templates.active(),
        }
    }

    /// Sign with the current local time.
    pub fn sign(&self, request: &SignatureRequest) -> std::result::Result<PathBuf, SignError> {
        self.sign_at(request, Local::now().into())
    }

    /// Sign with `now` as the signing time.
    pub fn sign_at(
        &self,
        request: &SignatureRequest,
        now: DateTime<FixedOffset>,
    ) -> std::result::Result<PathBuf, SignError> {
        self.set_state(SigningState::Idle);
        let result = self.run(request, &now);
        match &result {
            Ok(path) => {
                log::info!("Wrote signed document {}", path.display());
                self.set_state(SigningState::Written(path.clone()));
            },
            Err(e) => {
                log::error!("Signing failed: {}", e);
                self.set_state(SigningState::Failed(e.to_string()));
            },
        }
        result
    }

    fn run(
        &self,
        request: &SignatureRequest,
        now: &DateTime<FixedOffset>,
    ) -> std::result::Result<PathBuf, SignError> {
        // Prerequisites
        let source = request
            .document_path
            .as_deref()
            .filter(|path| path.is_file())
            .ok_or_else(|| SignError::MissingPrerequisite("document".to_string()))?;
        let view_rect = request
            .view_rect
            .filter(|rect| rect.is_valid_selection(self.config.min_selection_px))
            .ok_or_else(|| SignError::MissingPrerequisite("selection".to_string()))?;
        let credential_ref = request
            .credential
            .as_ref()
            .ok_or_else(|| SignError::MissingPrerequisite("credential".to_string()))?;
        let template = self.template(request.template_id.as_deref()).ok_or_else(|| {
            SignError::MissingPrerequisite(format!(
                "stamp template '{}'",
                request.template_id.as_deref().unwrap_or_default()
            ))
        })?;

        let _guard = self.lock_document(source)?;

        let credential = self.load_credential(credential_ref)?;
        self.set_state(SigningState::CredentialResolved);

        let data = std::fs::read(source).map_err(Error::from)?;
        let doc = PdfDocument::from_bytes(data)?;
        let pages = doc.pages()?;
        let page = pages.get(request.page_index).ok_or_else(|| {
            SignError::SigningFailed(format!(
                "page {} does not exist (document has {})",
                request.page_index,
                pages.len()
            ))
        })?;
        let rect = CoordinateMapper::for_media_box(request.view_width, page.media_box)
            .map_to_document(&view_rect);

        let markup = TemplateResolver::resolve(&template.markup, credential.certificate(), now);
        let appearance = self.renderer.render(&markup, rect.width(), rect.height());
        self.set_state(SigningState::AppearanceRendered);

        let placement = SignaturePlacement {
            page_index: request.page_index,
            rect,
            field_name: format!("Signature-{}", now.timestamp_millis()),
            appearance,
        };
        self.set_state(SigningState::FieldPlaced);

        let signed = PdfSigner::new(&credential, self.config.estimated_signature_size)
            .with_digest_algorithm(self.config.digest_algorithm)
            .with_metadata(self.config.metadata_for(&request.metadata()))
            .sign_document(&doc, &placement, now)?;
        self.set_state(SigningState::Signed);

        let output = signed_output_path(source);
        write_new_file(&output, &signed.data)?;
        Ok(output)
    }

    fn lock_document(&self, source: &Path) -> std::result::Result<InFlightGuard<'_>, SignError> {
        let path = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| SignError::SigningFailed("document lock poisoned".to_string()))?;
        if !in_flight.insert(path.clone()) {
            return Err(SignError::SigningFailed(format!(
                "{} is already being signed",
                source.display()
            )));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            path,
        })
    }

    fn load_credential(&self, credential: &CredentialRef) -> std::result::Result<Credential, SignError> {
        let password = self
            .secrets
            .lookup(&credential.secret_key())
            .ok_or(SignError::MissingPassword)?;
        let container = std::fs::read(credential.path()).map_err(|e| {
            log::warn!("Could not read certificate file {}: {}", credential.path().display(), e);
            SignError::CredentialLoadFailed
        })?;
        Ok(CredentialLoader::load(&container, &password)?)
    }

    /// Certificate of a registered credential, without keeping the key.
    pub fn certificate_for(
        &self,
        credential: &CredentialRef,
    ) -> std::result::Result<Certificate, SignError> {
        Ok(self.load_credential(credential)?.certificate().clone())
    }

    /// Widget rectangle for a selection, as it would be signed.
    pub fn document_rect(&self, view_rect: &ViewRect, view_width: f64, page_width: f64, page_height: f64) -> DocRect {
        CoordinateMapper::new(view_width, page_width, page_height).map_to_document(view_rect)
    }

    /// Raster preview of the stamp `certificate` would get with template
    /// `template_id` (the active one when `None`). Cached per certificate,
    /// template and size.
    pub fn preview(
        &self,
        certificate: &Certificate,
        template_id: Option<&str>,
        width_px: u32,
        height_px: u32,
        now: &DateTime<FixedOffset>,
    ) -> Result<Arc<StampPreview>> {
        let template = self.template(template_id).ok_or_else(|| {
            Error::Config(format!("unknown stamp template '{}'", template_id.unwrap_or_default()))
        })?;
        let key = PreviewKey::new(certificate.fingerprint(), template.id.clone(), width_px, height_px);
        self.previews.get_or_insert_with(key, || {
            let markup = TemplateResolver::resolve(&template.markup, certificate, now);
            self.renderer.preview(&markup, width_px, height_px)
        })
    }

    /// Scan document bytes for signatures.
    pub fn scan(&self, data: &[u8]) -> Vec<SignatureRecord> {
        SignatureScanner::new(&self.trust).scan(data)
    }

    /// Scan a document file for signatures.
    pub fn scan_file(&self, path: impl AsRef<Path>) -> Result<Vec<SignatureRecord>> {
        let data = std::fs::read(path)?;
        Ok(self.scan(&data))
    }
}

/// Write `data` to `path`, failing if it exists. A partial file is removed.
fn write_new_file(path: &Path, data: &[u8]) -> std::result::Result<(), SignError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| SignError::SigningFailed(format!("cannot create {}: {}", path.display(), e)))?;
    if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
        drop(file);
        if let Err(remove) = std::fs::remove_file(path) {
            log::warn!("Could not remove partial output {}: {}", path.display(), remove);
        }
        return Err(SignError::SigningFailed(format!("cannot write {}: {}", path.display(), e)));
    }
    Ok(())
}

fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_stem().map(|s| s.to_os_string()).unwrap_or_else(OsString::new);
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// `<stem>-signed.<ext>` beside `source`.
pub fn signed_base_path(source: &Path) -> PathBuf {
    with_stem_suffix(source, "-signed")
}

/// `base` if `exists` says it is free, else `<stem>-1.<ext>`, `<stem>-2.<ext>`, …
pub fn next_free_path(base: &Path, exists: impl Fn(&Path) -> bool) -> PathBuf {
    if !exists(base) {
        return base.to_path_buf();
    }
    let mut n: u64 = 1;
    loop {
        let candidate = with_stem_suffix(base, &format!("-{}", n));
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// First free output name for signing `source`.
pub fn signed_output_path(source: &Path) -> PathBuf {
    next_free_path(&signed_base_path(source), |p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{secret_key_for, InMemorySecretStore};
    use crate::test_support;
    use crate::writer::PdfWriter;
    use chrono::TimeZone;

    struct Fixture {
        dir: tempfile::TempDir,
        document: PathBuf,
        credential: CredentialRef,
        secrets: Arc<InMemorySecretStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("contract.pdf");
        PdfWriter::new().add_page(612.0, 792.0).save(&document).unwrap();

        let key = test_support::rsa_key();
        let cert = test_support::certificate("Engine Signer", &key, 4242, None);
        let container = dir.path().join("engine.p12");
        std::fs::write(&container, test_support::pkcs12(&cert, &key, &[], test_support::PASSWORD)).unwrap();

        let secrets = Arc::new(InMemorySecretStore::new());
        secrets
            .store(&secret_key_for(&container), "test", test_support::PASSWORD)
            .unwrap();
        Fixture {
            dir,
            document,
            credential: CredentialRef::new(container),
            secrets,
        }
    }

    fn engine(fixture: &Fixture, config: EngineConfig) -> SigningEngine {
        SigningEngine::new(config, fixture.secrets.clone(), TrustStore::new())
    }

    fn request(fixture: &Fixture) -> SignatureRequest {
        SignatureRequest::new(
            &fixture.document,
            0,
            ViewRect::new(100.0, 100.0, 200.0, 60.0),
            612.0,
            fixture.credential.clone(),
        )
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .unwrap()
    }

    #[test]
    fn test_naming() {
        let source = Path::new("/tmp/docs/report.pdf");
        assert_eq!(signed_base_path(source), PathBuf::from("/tmp/docs/report-signed.pdf"));

        let taken: HashSet<PathBuf> = [
            PathBuf::from("/tmp/docs/report-signed.pdf"),
            PathBuf::from("/tmp/docs/report-signed-1.pdf"),
        ]
        .into_iter()
        .collect();
        let base = signed_base_path(source);
        assert_eq!(
            next_free_path(&base, |p| taken.contains(p)),
            PathBuf::from("/tmp/docs/report-signed-2.pdf")
        );
        assert_eq!(next_free_path(Path::new("/x/noext"), |_| false), PathBuf::from("/x/noext"));
        assert_eq!(
            signed_base_path(Path::new("/x/noext")),
            PathBuf::from("/x/noext-signed")
        );
    }

    #[test]
    fn test_missing_prerequisites() {
        let fixture = fixture();
        let engine = engine(&fixture, EngineConfig::default());

        let mut no_document = request(&fixture);
        no_document.document_path = None;
        assert!(matches!(
            engine.sign_at(&no_document, now()),
            Err(SignError::MissingPrerequisite(what)) if what == "document"
        ));

        let mut tiny = request(&fixture);
        tiny.view_rect = Some(ViewRect::new(10.0, 10.0, 4.0, 100.0));
        assert!(matches!(
            engine.sign_at(&tiny, now()),
            Err(SignError::MissingPrerequisite(what)) if what == "selection"
        ));

        let mut no_credential = request(&fixture);
        no_credential.credential = None;
        assert!(matches!(
            engine.sign_at(&no_credential, now()),
            Err(SignError::MissingPrerequisite(what)) if what == "credential"
        ));

        let unknown_template = request(&fixture).with_template("nope");
        assert!(matches!(
            engine.sign_at(&unknown_template, now()),
            Err(SignError::MissingPrerequisite(_))
        ));
        assert!(matches!(engine.last_state(), SigningState::Failed(_)));
    }

    #[test]
    fn test_missing_password_and_bad_password() {
        let fixture = fixture();
        let engine = engine(&fixture, EngineConfig::default());

        fixture.secrets.clear(&fixture.credential.secret_key());
        assert!(matches!(engine.sign_at(&request(&fixture), now()), Err(SignError::MissingPassword)));

        fixture
            .secrets
            .store(&fixture.credential.secret_key(), "test", "wrong")
            .unwrap();
        assert!(matches!(
            engine.sign_at(&request(&fixture), now()),
            Err(SignError::CredentialLoadFailed)
        ));
        assert!(!signed_base_path(&fixture.document).exists());
    }

    #[test]
    fn test_sign_and_scan() {
        let fixture = fixture();
        let engine = engine(&fixture, EngineConfig::default().with_default_reason("Approved"));
        let original = std::fs::read(&fixture.document).unwrap();

        let output = engine.sign_at(&request(&fixture).with_location("Office"), now()).unwrap();
        assert_eq!(output, fixture.dir.path().join("contract-signed.pdf"));
        assert_eq!(engine.last_state(), SigningState::Written(output.clone()));
        assert_eq!(std::fs::read(&fixture.document).unwrap(), original);

        let records = engine.scan_file(&output).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.intact);
        assert!(record.cryptographically_valid);
        assert_eq!(record.signer_common_name, "Engine Signer");
        assert_eq!(record.serial_number, "4242");
        assert_eq!(record.reason.as_deref(), Some("Approved"));
        assert_eq!(record.location.as_deref(), Some("Office"));
        assert_eq!(record.page_index, 0);
        assert_eq!(record.field_name, format!("Signature-{}", now().timestamp_millis()));

        // 612pt page shown 612px wide: scale 1, flipped vertically
        let rect = record.document_rect.unwrap();
        assert!((rect.x0 - 100.0).abs() < 1e-6);
        assert!((rect.y0 - 632.0).abs() < 1e-6);
        assert!((rect.x1 - 300.0).abs() < 1e-6);
        assert!((rect.y1 - 692.0).abs() < 1e-6);

        let second = engine.sign_at(&request(&fixture), now()).unwrap();
        assert_eq!(second, fixture.dir.path().join("contract-signed-1.pdf"));
    }

    #[test]
    fn test_budget_failure_writes_nothing() {
        let fixture = fixture();
        let engine = engine(&fixture, EngineConfig::default().with_estimated_signature_size(32));
        let err = engine.sign_at(&request(&fixture), now()).unwrap_err();
        assert!(matches!(err, SignError::SigningFailed(ref detail) if detail.contains("no byte budget")));
        assert!(!signed_base_path(&fixture.document).exists());
    }

    #[test]
    fn test_document_in_flight() {
        let fixture = fixture();
        let engine = engine(&fixture, EngineConfig::default());
        let guard = engine.lock_document(&fixture.document).unwrap();
        assert!(matches!(
            engine.sign_at(&request(&fixture), now()),
            Err(SignError::SigningFailed(_))
        ));
        drop(guard);
        assert!(engine.sign_at(&request(&fixture), now()).is_ok());
    }

    #[test]
    fn test_preview_cache() {
        let fixture = fixture();
        let mut engine = engine(&fixture, EngineConfig::default());
        let certificate = engine.certificate_for(&fixture.credential).unwrap();

        let first = engine.preview(&certificate, None, 200, 60, &now()).unwrap();
        let again = engine.preview(&certificate, None, 200, 60, &now()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(first.painted_pixels() > 0);

        engine.upsert_template(StampTemplate::new("short", "Short", "$$SUBJECTCN$$"));
        engine.set_active_template("short").unwrap();
        let short = engine.preview(&certificate, None, 200, 60, &now()).unwrap();
        assert!(!Arc::ptr_eq(&first, &short));

        assert!(engine.preview(&certificate, Some("missing"), 10, 10, &now()).is_err());
    }
}
