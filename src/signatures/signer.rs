//! PDF signing implementation.
//!
//! A signature is added as one incremental revision holding:
//!
//! - the signature dictionary, with `/ByteRange` and `/Contents` placeholders
//! - a merged signature field and widget annotation with the stamp appearance
//! - the page, re-emitted with the widget appended to `/Annots`
//! - the interactive form, re-emitted with the field appended to `/Fields`
//!
//! Once the revision is assembled the ByteRange is patched in place, the
//! covered bytes are hashed and the CMS signature is written into the
//! zero-filled `/Contents` hex string.

use super::byterange::{bytes_to_hex, ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
use super::pkcs7::build_signed_data;
use super::types::{DigestAlgorithm, SignatureMetadata, SignatureSubFilter};
use crate::credentials::Credential;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::geometry::DocRect;
use crate::object::{Dict, Object, ObjectRef};
use crate::stamp::StampArtifact;
use crate::writer::{IncrementalUpdate, ObjectSerializer};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashSet;

/// Annotation flags: Print
const WIDGET_FLAGS: i64 = 4;
/// SignaturesExist | AppendOnly
const SIG_FLAGS: i64 = 3;

/// Where and how the signature is shown.
#[derive(Debug, Clone)]
pub struct SignaturePlacement {
    /// Zero-based page index
    pub page_index: usize,
    /// Widget rectangle in PDF user space
    pub rect: DocRect,
    /// Requested field name; made unique within the document
    pub field_name: String,
    /// Rendered stamp, sized to `rect`
    pub appearance: StampArtifact,
}

/// Result of [`PdfSigner::sign_document`].
#[derive(Debug, Clone)]
pub struct SignedRevision {
    /// Complete signed file
    pub data: Vec<u8>,
    /// Field name actually used
    pub field_name: String,
    /// Final ByteRange
    pub byte_range: [i64; 4],
}

/// PDF signer that creates digital signatures.
pub struct PdfSigner<'a> {
    credential: &'a Credential,
    digest_algorithm: DigestAlgorithm,
    metadata: SignatureMetadata,
    byte_range_calc: ByteRangeCalculator,
    serializer: ObjectSerializer,
}

impl std::fmt::Debug for PdfSigner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSigner")
            .field("credential", self.credential)
            .field("digest_algorithm", &self.digest_algorithm)
            .field("metadata", &self.metadata)
            .field("placeholder_size", &self.byte_range_calc.placeholder_size())
            .finish()
    }
}

impl<'a> PdfSigner<'a> {
    /// Create a signer reserving `estimated_size` bytes for the CMS blob.
    pub fn new(credential: &'a Credential, estimated_size: usize) -> Self {
        Self {
            credential,
            digest_algorithm: DigestAlgorithm::default(),
            metadata: SignatureMetadata::default(),
            byte_range_calc: ByteRangeCalculator::new(estimated_size),
            serializer: ObjectSerializer::compact(),
        }
    }

    /// Use `digest_algorithm` for the document digest and the signature.
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    /// Set the descriptive signature dictionary entries.
    pub fn with_metadata(mut self, metadata: SignatureMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the placeholder size for the signature.
    pub fn placeholder_size(&self) -> usize {
        self.byte_range_calc.placeholder_size()
    }

    /// Serialize the signature dictionary with both placeholders.
    ///
    /// Returns the bytes and the offsets of the ByteRange array and the
    /// `/Contents` hex string within them.
    pub fn build_signature_dictionary(
        &self,
        signing_time: &DateTime<FixedOffset>,
    ) -> (Vec<u8>, usize, usize) {
        let mut dict = Vec::new();
        dict.extend_from_slice(b"<<\n/Type /Sig\n/Filter /Adobe.PPKLite\n");
        dict.extend_from_slice(
            format!("/SubFilter /{}\n", SignatureSubFilter::Pkcs7Detached.as_pdf_name()).as_bytes(),
        );

        dict.extend_from_slice(b"/ByteRange ");
        let byte_range_offset = dict.len();
        dict.extend_from_slice(BYTE_RANGE_PLACEHOLDER.as_bytes());
        dict.extend_from_slice(b"\n/Contents ");
        let contents_offset = dict.len();
        dict.extend_from_slice(self.byte_range_calc.generate_placeholder().as_bytes());
        dict.push(b'\n');

        dict.extend_from_slice(format!("/M ({})\n", format_pdf_date(signing_time)).as_bytes());

        let name = self
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| self.credential.certificate().subject_common_name());
        let entries = [
            ("Name", Some(&name)),
            ("Reason", self.metadata.reason.as_ref()),
            ("Location", self.metadata.location.as_ref()),
            ("ContactInfo", self.metadata.contact_info.as_ref()),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                dict.extend_from_slice(format!("/{} ", key).as_bytes());
                dict.extend_from_slice(&self.serializer.serialize(&Object::text_string(value)));
                dict.push(b'\n');
            }
        }
        dict.extend_from_slice(b">>");

        (dict, byte_range_offset, contents_offset)
    }

    /// Append a signed revision to `doc`.
    pub fn sign_document(
        &self,
        doc: &PdfDocument,
        placement: &SignaturePlacement,
        signing_time: &DateTime<FixedOffset>,
    ) -> Result<SignedRevision> {
        if doc.is_encrypted() {
            return Err(Error::Unsupported("signing encrypted documents".to_string()));
        }
        let pages = doc.pages()?;
        let page = pages.get(placement.page_index).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "page {} does not exist (document has {})",
                placement.page_index,
                pages.len()
            ))
        })?;

        let field_name = unique_field_name(&existing_field_names(doc), &placement.field_name);
        let mut update = IncrementalUpdate::new(doc);
        let sig_ref = update.allocate_id();
        let field_ref = update.allocate_id();
        let appearance_ref = update.allocate_id();

        // Signature value
        let (sig_body, byte_range_rel, contents_rel) = self.build_signature_dictionary(signing_time);
        let sig_offset = update.add_raw_object(sig_ref, &sig_body);

        // Appearance
        update.add_object(appearance_ref, &placement.appearance.to_xobject()?);

        // Field and widget
        let rect = placement.rect;
        let field = ObjectSerializer::dict(vec![
            ("FT", Object::name("Sig")),
            ("Type", Object::name("Annot")),
            ("Subtype", Object::name("Widget")),
            ("T", Object::text_string(&field_name)),
            ("F", Object::Integer(WIDGET_FLAGS)),
            ("Rect", ObjectSerializer::rect(rect.x0, rect.y0, rect.x1, rect.y1)),
            ("P", Object::Reference(page.object_ref)),
            ("V", Object::Reference(sig_ref)),
            (
                "AP",
                ObjectSerializer::dict(vec![("N", Object::Reference(appearance_ref))]),
            ),
        ]);
        update.add_object(field_ref, &field);

        attach_widget(doc, &mut update, page.object_ref, field_ref)?;
        attach_field(doc, &mut update, field_ref)?;

        let mut data = update.finish();

        let byte_range_offset = sig_offset + byte_range_rel;
        let contents_offset = sig_offset + contents_rel;
        let byte_range = self
            .byte_range_calc
            .calculate_byte_range(data.len(), contents_offset);
        ByteRangeCalculator::patch_byte_range(&mut data, byte_range_offset, &byte_range)?;

        let (first, second) = ByteRangeCalculator::signed_slices(&data, &byte_range)?;
        let content_digest = self.digest_algorithm.digest_parts(&[first, second]);
        let signing_time_utc: DateTime<Utc> = signing_time.with_timezone(&Utc);
        let cms = build_signed_data(
            self.credential,
            self.digest_algorithm,
            &content_digest,
            &signing_time_utc,
        )?;
        if cms.len() > self.byte_range_calc.capacity() {
            return Err(Error::Crypto(format!(
                "no byte budget: signature needs {} bytes, {} reserved",
                cms.len(),
                self.byte_range_calc.capacity()
            )));
        }
        self.byte_range_calc
            .insert_signature(&mut data, contents_offset, &bytes_to_hex(&cms))?;

        log::info!(
            "Signed field {} on page {} as {} ({} byte signature)",
            field_name,
            placement.page_index,
            self.credential.certificate().subject_common_name(),
            cms.len()
        );

        Ok(SignedRevision {
            data,
            field_name,
            byte_range,
        })
    }
}

/// Re-emit the page (or its `/Annots` array) with `widget` appended.
fn attach_widget(
    doc: &PdfDocument,
    update: &mut IncrementalUpdate,
    page_ref: ObjectRef,
    widget: ObjectRef,
) -> Result<()> {
    let page = doc.get_object(page_ref)?;
    let mut page_dict = page
        .as_dict()
        .cloned()
        .ok_or_else(|| Error::InvalidPdf(format!("page {} is not a dictionary", page_ref)))?;

    match page_dict.get("Annots") {
        Some(Object::Reference(annots_ref)) => {
            let annots_ref = *annots_ref;
            let mut annots = match doc.get_object(annots_ref)? {
                Object::Array(items) => items,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Array".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            annots.push(Object::Reference(widget));
            update.add_object(annots_ref, &Object::Array(annots));
            return Ok(());
        },
        Some(Object::Array(items)) => {
            let mut annots = items.clone();
            annots.push(Object::Reference(widget));
            page_dict.insert("Annots".to_string(), Object::Array(annots));
        },
        _ => {
            page_dict.insert("Annots".to_string(), Object::Array(vec![Object::Reference(widget)]));
        },
    }
    update.add_object(page_ref, &Object::Dictionary(page_dict));
    Ok(())
}

/// Re-emit the interactive form with `field` appended to `/Fields`.
fn attach_field(doc: &PdfDocument, update: &mut IncrementalUpdate, field: ObjectRef) -> Result<()> {
    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;

    let with_field = |form: &mut Dict| {
        let mut fields = match doc.resolve_key(form, "Fields") {
            Some(Object::Array(items)) => items,
            _ => Vec::new(),
        };
        fields.push(Object::Reference(field));
        form.insert("Fields".to_string(), Object::Array(fields));
        form.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
    };

    match catalog.get("AcroForm") {
        Some(Object::Reference(form_ref)) => {
            let form_ref = *form_ref;
            let mut form = doc
                .get_object(form_ref)?
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::InvalidPdf("AcroForm is not a dictionary".to_string()))?;
            with_field(&mut form);
            update.add_object(form_ref, &Object::Dictionary(form));
        },
        Some(Object::Dictionary(form)) => {
            let mut form = form.clone();
            with_field(&mut form);
            catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
            update.add_object(catalog_ref, &Object::Dictionary(catalog));
        },
        _ => {
            let form_ref = update.allocate_id();
            let mut form = Dict::new();
            with_field(&mut form);
            update.add_object(form_ref, &Object::Dictionary(form));
            catalog.insert("AcroForm".to_string(), Object::Reference(form_ref));
            update.add_object(catalog_ref, &Object::Dictionary(catalog));
        },
    }
    Ok(())
}

/// Fully qualified names of all form fields.
pub fn existing_field_names(doc: &PdfDocument) -> HashSet<String> {
    let mut names = HashSet::new();
    let Ok(Some(form)) = doc.acroform() else {
        return names;
    };
    if let Some(Object::Array(fields)) = doc.resolve_key(&form, "Fields") {
        let mut visited = HashSet::new();
        for field in &fields {
            collect_field_names(doc, field, "", &mut visited, &mut names);
        }
    }
    names
}

fn collect_field_names(
    doc: &PdfDocument,
    field: &Object,
    parent: &str,
    visited: &mut HashSet<ObjectRef>,
    names: &mut HashSet<String>,
) {
    if let Object::Reference(r) = field {
        if !visited.insert(*r) {
            return;
        }
    }
    let Ok(resolved) = doc.resolve(field) else { return };
    let Some(dict) = resolved.as_dict() else { return };

    let name = match dict.get("T").and_then(Object::as_text_string) {
        Some(partial) if parent.is_empty() => partial,
        Some(partial) => format!("{}.{}", parent, partial),
        None => parent.to_string(),
    };
    if !name.is_empty() {
        names.insert(name.clone());
    }
    if let Some(Object::Array(kids)) = doc.resolve_key(dict, "Kids") {
        for kid in &kids {
            collect_field_names(doc, kid, &name, visited, names);
        }
    }
}

/// `requested`, or `requested-1`, `requested-2`, … if taken.
pub fn unique_field_name(existing: &HashSet<String>, requested: &str) -> String {
    if !existing.contains(requested) {
        return requested.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", requested, n))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| requested.to_string())
}

/// Format a PDF date string: `D:YYYYMMDDHHmmSS+HH'mm'`, or `Z` for UTC.
pub fn format_pdf_date(at: &DateTime<FixedOffset>) -> String {
    let offset = at.offset().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.abs() / 60;
        format!("{}{:02}'{:02}'", sign, minutes / 60, minutes % 60)
    };
    format!("D:{}{}", at.format("%Y%m%d%H%M%S"), zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::{SignatureVerifier, TrustStore};
    use crate::stamp::StampRenderer;
    use crate::test_support;
    use crate::writer::PdfWriter;
    use chrono::TimeZone;

    fn signing_time() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 9, 30, 0)
            .unwrap()
    }

    fn placement(name: &str) -> SignaturePlacement {
        let rect = DocRect::new(100.0, 600.0, 300.0, 660.0);
        SignaturePlacement {
            page_index: 0,
            rect,
            field_name: name.to_string(),
            appearance: StampRenderer::new().render("<b>Signed</b>", rect.width(), rect.height()),
        }
    }

    #[test]
    fn test_format_pdf_date() {
        assert_eq!(format_pdf_date(&signing_time()), "D:20240601093000+02'00'");
        let utc = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_pdf_date(&utc.into()), "D:20240102030405Z");
    }

    #[test]
    fn test_unique_field_name() {
        let mut existing = HashSet::new();
        assert_eq!(unique_field_name(&existing, "Signature-1"), "Signature-1");
        existing.insert("Signature-1".to_string());
        existing.insert("Signature-1-1".to_string());
        assert_eq!(unique_field_name(&existing, "Signature-1"), "Signature-1-2");
    }

    #[test]
    fn test_signature_dictionary_placeholders() {
        let credential = test_support::self_signed_credential("Dict Signer");
        let signer = PdfSigner::new(&credential, 64)
            .with_metadata(SignatureMetadata::default().with_reason("Approved"));
        let (dict, br, contents) = signer.build_signature_dictionary(&signing_time());
        let text = String::from_utf8(dict.clone()).unwrap();
        assert!(text.starts_with("<<\n/Type /Sig\n/Filter /Adobe.PPKLite\n"));
        assert!(text.contains("/SubFilter /adbe.pkcs7.detached"));
        assert!(text.contains("/Reason (Approved)"));
        assert!(text.contains("/Name (Dict Signer)"));
        assert!(!text.contains("/Location"));
        assert!(!text.contains("/ContactInfo"));
        assert_eq!(&dict[br..br + BYTE_RANGE_PLACEHOLDER.len()], BYTE_RANGE_PLACEHOLDER.as_bytes());
        assert_eq!(dict[contents], b'<');
        assert_eq!(dict[contents + signer.placeholder_size() - 1], b'>');
    }

    #[test]
    fn test_sign_blank_document() {
        let credential = test_support::self_signed_credential("Blank Signer");
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original.clone()).unwrap();

        let signed = PdfSigner::new(&credential, 8192)
            .sign_document(&doc, &placement("Signature-1"), &signing_time())
            .unwrap();

        assert!(signed.data.starts_with(&original));
        assert_eq!(signed.field_name, "Signature-1");
        assert_eq!(signed.byte_range[0], 0);
        assert_eq!(signed.byte_range[2] + signed.byte_range[3], signed.data.len() as i64);

        let reopened = PdfDocument::from_bytes(signed.data.clone()).unwrap();
        assert_eq!(existing_field_names(&reopened), HashSet::from(["Signature-1".to_string()]));
        let form = reopened.acroform().unwrap().unwrap();
        assert_eq!(form.get("SigFlags").and_then(Object::as_integer), Some(3));

        let start = signed.byte_range[1] as usize + 1;
        let end = signed.byte_range[2] as usize - 1;
        let contents = crate::parser::decode_hex(&signed.data[start..end]).unwrap();
        let trust = TrustStore::new();
        let result = SignatureVerifier::new(&trust).verify(&signed.data, &signed.byte_range, &contents);
        assert!(result.intact, "{:?}", result.messages);
        assert!(result.cryptographically_valid());
    }

    #[test]
    fn test_second_signature_gets_unique_name() {
        let credential = test_support::self_signed_credential("Twice");
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original).unwrap();
        let signer = PdfSigner::new(&credential, 8192);
        let first = signer.sign_document(&doc, &placement("Sig"), &signing_time()).unwrap();

        let doc = PdfDocument::from_bytes(first.data.clone()).unwrap();
        let second = signer.sign_document(&doc, &placement("Sig"), &signing_time()).unwrap();
        assert_eq!(second.field_name, "Sig-1");
        assert!(second.data.starts_with(&first.data));

        let reopened = PdfDocument::from_bytes(second.data).unwrap();
        assert_eq!(existing_field_names(&reopened).len(), 2);
    }

    #[test]
    fn test_budget_too_small() {
        let credential = test_support::self_signed_credential("Tiny");
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original).unwrap();
        let err = PdfSigner::new(&credential, 16)
            .sign_document(&doc, &placement("Sig"), &signing_time())
            .unwrap_err();
        assert!(err.to_string().contains("no byte budget"));
    }

    #[test]
    fn test_missing_page() {
        let credential = test_support::self_signed_credential("Nowhere");
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original).unwrap();
        let mut bad = placement("Sig");
        bad.page_index = 3;
        assert!(PdfSigner::new(&credential, 8192)
            .sign_document(&doc, &bad, &signing_time())
            .is_err());
    }
}
