//! Enumerate the signatures embedded in a document and report on each.
//!
//! Scanning never fails as a whole. A signature whose dictionary, CMS blob
//! or widget cannot be fully read still produces a record, with the
//! unreadable parts left at their defaults.

use super::byterange::ByteRangeCalculator;
use super::trust::TrustStore;
use super::types::SignatureSubFilter;
use super::verifier::{SignatureVerifier, VerificationResult};
use crate::credentials::Certificate;
use crate::document::PdfDocument;
use crate::error::FieldError;
use crate::geometry::DocRect;
use crate::object::{Dict, Object, ObjectRef};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Common name used when a certificate cannot be read.
pub const UNKNOWN: &str = "Unknown";

const MAX_FIELD_DEPTH: usize = 32;

/// What a scan found out about one signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRecord {
    /// Covered bytes are unchanged since signing
    pub intact: bool,
    /// Intact, and the signature and certificate chain verify
    pub cryptographically_valid: bool,
    /// Chain ends at a trust anchor and the signer certificate is current
    pub trusted: bool,
    /// Signer serial number is on the revocation list
    pub revoked: bool,
    /// Signer common name, or `"Unknown"`
    pub signer_common_name: String,
    /// Issuer common name, or `"Unknown"`
    pub issuer_common_name: String,
    /// Signer serial number (decimal), or `"Unknown"`
    pub serial_number: String,
    /// Signing time from the signed attributes or a timestamp token
    pub signing_time: Option<DateTime<Utc>>,
    /// Zero-based page index, or -1 when the widget cannot be located
    pub page_index: i64,
    /// Widget rectangle, when the widget can be located
    pub document_rect: Option<DocRect>,
    /// Fully qualified field name
    pub field_name: String,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// `/ByteRange`, when readable
    pub byte_range: Option<[i64; 4]>,
    /// The signed revision is the latest one
    pub covers_whole_document: bool,
}

impl SignatureRecord {
    fn unknown(field_name: String) -> Self {
        Self {
            intact: false,
            cryptographically_valid: false,
            trusted: false,
            revoked: false,
            signer_common_name: UNKNOWN.to_string(),
            issuer_common_name: UNKNOWN.to_string(),
            serial_number: UNKNOWN.to_string(),
            signing_time: None,
            page_index: -1,
            document_rect: None,
            field_name,
            reason: None,
            location: None,
            contact_info: None,
            byte_range: None,
            covers_whole_document: false,
        }
    }

    /// End of the signed revision, used for ordering.
    fn revision_end(&self) -> i64 {
        self.byte_range.map(|br| br[2] + br[3]).unwrap_or(i64::MAX)
    }
}

/// A signature field found while walking the form.
struct FoundField {
    name: String,
    field: Dict,
    field_ref: Option<ObjectRef>,
    value: Dict,
}

/// Scans documents for signatures.
#[derive(Debug, Clone)]
pub struct SignatureScanner<'a> {
    trust: &'a TrustStore,
    now: Option<DateTime<Utc>>,
}

impl<'a> SignatureScanner<'a> {
    /// Create a scanner checking trust against `trust`.
    pub fn new(trust: &'a TrustStore) -> Self {
        Self { trust, now: None }
    }

    /// Evaluate certificate validity at `now` instead of the current time.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Scan `data` and return one record per signature, in revision order.
    pub fn scan(&self, data: &[u8]) -> Vec<SignatureRecord> {
        let doc = match PdfDocument::from_bytes(data.to_vec()) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("Cannot scan document for signatures: {}", e);
                return Vec::new();
            },
        };

        let fields = signature_fields(&doc);
        log::debug!("Found {} signature field(s)", fields.len());

        let mut records: Vec<SignatureRecord> =
            fields.iter().map(|found| self.record(&doc, found)).collect();
        // Stable: ties keep form order
        records.sort_by_key(SignatureRecord::revision_end);
        records
    }

    fn record(&self, doc: &PdfDocument, found: &FoundField) -> SignatureRecord {
        let data = doc.bytes();
        let mut record = SignatureRecord::unknown(found.name.clone());
        record.reason = text_entry(&found.value, "Reason");
        record.location = text_entry(&found.value, "Location");
        record.contact_info = text_entry(&found.value, "ContactInfo");
        if let Some(sub_filter) = found.value.get("SubFilter").and_then(Object::as_name) {
            if SignatureSubFilter::from_pdf_name(sub_filter).is_none() {
                log::debug!("Signature {}: unrecognized sub-filter {}", found.name, sub_filter);
            }
        }

        match locate_widget(doc, found) {
            Ok((page_index, rect)) => {
                record.page_index = page_index as i64;
                record.document_rect = Some(rect);
            },
            Err(e) => log::warn!("Signature {}: widget not located: {}", found.name, e),
        }

        let byte_range = match byte_range(&found.value) {
            Ok(byte_range) => byte_range,
            Err(e) => {
                log::warn!("Signature {}: {}", found.name, e);
                return record;
            },
        };
        record.byte_range = Some(byte_range);
        record.covers_whole_document =
            ByteRangeCalculator::covers_whole_document(&byte_range, data.len());

        let contents = match contents(&found.value) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Signature {}: {}", found.name, e);
                return record;
            },
        };

        let mut verifier = SignatureVerifier::new(self.trust);
        if let Some(now) = self.now {
            verifier = verifier.at(now);
        }
        let result = verifier.verify(data, &byte_range, &contents);
        for message in &result.messages {
            log::debug!("Signature {}: {}", found.name, message);
        }

        record.intact = result.intact;
        record.cryptographically_valid = result.cryptographically_valid();
        record.trusted = result.trusted;
        record.revoked = result.revoked;
        record.signing_time = signing_time(&result);

        match signer_certificate(&result) {
            Ok(cert) => {
                record.signer_common_name = cert.subject_common_name();
                record.issuer_common_name = cert.issuer_common_name();
                record.serial_number = cert.serial_decimal().to_string();
            },
            Err(e) => log::warn!("Signature {}: signer certificate: {}", found.name, e),
        }
        record
    }
}

/// Signing time: signed attribute first, then timestamp token.
fn signing_time(result: &VerificationResult) -> Option<DateTime<Utc>> {
    let signer = &result.signed_data.as_ref()?.signer;
    signer.signing_time.or(signer.timestamp_time)
}

/// The certificate the verifier matched, else the first readable embedded one.
fn signer_certificate(result: &VerificationResult) -> Result<Certificate, FieldError> {
    if let Some(cert) = &result.signer {
        return Ok(cert.clone());
    }
    let signed_data = result.signed_data.as_ref().ok_or(FieldError::Missing("CMS signature"))?;
    let der = signed_data.certificates.first().ok_or(FieldError::Missing("certificate"))?;
    Certificate::from_der(der).map_err(|e| FieldError::Malformed {
        field: "certificate",
        reason: e.to_string(),
    })
}

fn byte_range(value: &Dict) -> Result<[i64; 4], FieldError> {
    let items = value
        .get("ByteRange")
        .ok_or(FieldError::Missing("ByteRange"))?
        .as_array()
        .ok_or_else(|| FieldError::Malformed {
            field: "ByteRange",
            reason: "not an array".to_string(),
        })?;
    if items.len() != 4 {
        return Err(FieldError::Malformed {
            field: "ByteRange",
            reason: format!("{} elements instead of 4", items.len()),
        });
    }
    let mut range = [0i64; 4];
    for (slot, item) in range.iter_mut().zip(items) {
        *slot = item.as_integer().ok_or_else(|| FieldError::Malformed {
            field: "ByteRange",
            reason: format!("{} is not an integer", item.type_name()),
        })?;
    }
    Ok(range)
}

fn contents(value: &Dict) -> Result<Vec<u8>, FieldError> {
    value
        .get("Contents")
        .ok_or(FieldError::Missing("Contents"))?
        .as_string()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| FieldError::Malformed {
            field: "Contents",
            reason: "not a string".to_string(),
        })
}

fn text_entry(value: &Dict, key: &str) -> Option<String> {
    value.get(key).and_then(Object::as_text_string)
}

/// Page index and rectangle of the field's widget.
fn locate_widget(doc: &PdfDocument, found: &FoundField) -> Result<(usize, DocRect), FieldError> {
    // A field with a single merged widget, or the first widget kid
    let (widget, widget_ref) = if found.field.contains_key("Rect") {
        (found.field.clone(), found.field_ref)
    } else {
        let kids = doc
            .resolve_key(&found.field, "Kids")
            .and_then(|kids| kids.as_array().cloned())
            .ok_or(FieldError::Missing("widget"))?;
        let kid = kids.first().ok_or(FieldError::Missing("widget"))?;
        let dict = doc
            .resolve(kid)
            .ok()
            .and_then(|obj| obj.as_dict().cloned())
            .ok_or(FieldError::Missing("widget"))?;
        (dict, kid.as_reference())
    };

    let rect = widget
        .get("Rect")
        .and_then(Object::as_rect)
        .map(DocRect::from_pdf_rect)
        .ok_or(FieldError::Missing("Rect"))?;

    let pages = doc.pages().map_err(|e| FieldError::Malformed {
        field: "page tree",
        reason: e.to_string(),
    })?;

    if let Some(page_ref) = widget.get("P").and_then(Object::as_reference) {
        if let Some(index) = pages.iter().position(|p| p.object_ref == page_ref) {
            return Ok((index, rect));
        }
    }

    // No usable /P: find the page listing the widget in /Annots
    let widget_ref = widget_ref.ok_or(FieldError::Missing("P"))?;
    for (index, page) in pages.iter().enumerate() {
        let Ok(page_obj) = doc.get_object(page.object_ref) else { continue };
        let Some(page_dict) = page_obj.as_dict() else { continue };
        if let Some(Object::Array(annots)) = doc.resolve_key(page_dict, "Annots") {
            if annots.iter().any(|a| a.as_reference() == Some(widget_ref)) {
                return Ok((index, rect));
            }
        }
    }
    Err(FieldError::Missing("P"))
}

/// Signature fields with a value, in form traversal order.
fn signature_fields(doc: &PdfDocument) -> Vec<FoundField> {
    let mut found = Vec::new();
    let form = match doc.acroform() {
        Ok(Some(form)) => form,
        Ok(None) => return found,
        Err(e) => {
            log::warn!("Cannot read interactive form: {}", e);
            return found;
        },
    };
    if let Some(Object::Array(fields)) = doc.resolve_key(&form, "Fields") {
        let mut visited = HashSet::new();
        for field in &fields {
            walk_field(doc, field, "", None, 0, &mut visited, &mut found);
        }
    }
    found
}

fn walk_field(
    doc: &PdfDocument,
    field: &Object,
    parent_name: &str,
    inherited_type: Option<&str>,
    depth: usize,
    visited: &mut HashSet<ObjectRef>,
    found: &mut Vec<FoundField>,
) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }
    let field_ref = field.as_reference();
    if let Some(r) = field_ref {
        if !visited.insert(r) {
            return;
        }
    }
    let Some(dict) = doc.resolve(field).ok().and_then(|obj| obj.as_dict().cloned()) else {
        return;
    };

    let name = match dict.get("T").and_then(Object::as_text_string) {
        Some(partial) if parent_name.is_empty() => partial,
        Some(partial) => format!("{}.{}", parent_name, partial),
        None => parent_name.to_string(),
    };
    let field_type = dict
        .get("FT")
        .and_then(Object::as_name)
        .or(inherited_type)
        .map(str::to_string);

    if field_type.as_deref() == Some("Sig") {
        if let Some(value) = doc.resolve_key(&dict, "V").and_then(|v| v.as_dict().cloned()) {
            found.push(FoundField {
                name,
                field: dict,
                field_ref,
                value,
            });
            return;
        }
    }

    if let Some(Object::Array(kids)) = doc.resolve_key(&dict, "Kids") {
        for kid in &kids {
            walk_field(doc, kid, &name, field_type.as_deref(), depth + 1, visited, found);
        }
    }
}
