//! Incremental updates.
//!
//! An incremental update leaves every original byte in place and appends new
//! or replacement objects, a cross-reference section covering only those
//! objects and a trailer whose `/Prev` points at the previous section.
//! Earlier signatures stay valid because the bytes they cover never move.
//!
//! The new section has the same form as the newest existing one: an `xref`
//! table after a table, a cross-reference stream after a stream.

use super::object_serializer::ObjectSerializer;
use super::pdf_writer::xref_stream;
use crate::document::PdfDocument;
use crate::object::{Dict, Object, ObjectRef};
use std::collections::BTreeMap;

/// Builder for one appended revision.
#[derive(Debug)]
pub struct IncrementalUpdate {
    output: Vec<u8>,
    prev_startxref: usize,
    stream_xref: bool,
    base_trailer: Dict,
    next_id: u32,
    offsets: BTreeMap<u32, usize>,
    serializer: ObjectSerializer,
}

impl IncrementalUpdate {
    /// Start a revision on top of `doc`.
    pub fn new(doc: &PdfDocument) -> Self {
        let mut output = doc.bytes().to_vec();
        if !matches!(output.last(), Some(b'\n') | Some(b'\r')) {
            output.push(b'\n');
        }

        let mut base_trailer = Dict::new();
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = doc.trailer().get(key) {
                base_trailer.insert(key.to_string(), value.clone());
            }
        }

        Self {
            output,
            prev_startxref: doc.startxref(),
            stream_xref: doc.has_xref_stream(),
            base_trailer,
            next_id: doc.next_object_id(),
            offsets: BTreeMap::new(),
            serializer: ObjectSerializer::new(),
        }
    }

    /// Reserve a fresh object number.
    pub fn allocate_id(&mut self) -> ObjectRef {
        let id = self.next_id;
        self.next_id += 1;
        ObjectRef::new(id, 0)
    }

    /// Append (or replace) an object.
    pub fn add_object(&mut self, obj_ref: ObjectRef, obj: &Object) {
        self.offsets.insert(obj_ref.id, self.output.len());
        let bytes = self.serializer.serialize_indirect(obj_ref.id, obj_ref.gen, obj);
        self.output.extend_from_slice(&bytes);
    }

    /// Append an object whose body is already serialized.
    ///
    /// Returns the absolute offset of the first body byte, so callers can
    /// locate placeholders inside it later.
    pub fn add_raw_object(&mut self, obj_ref: ObjectRef, body: &[u8]) -> usize {
        self.offsets.insert(obj_ref.id, self.output.len());
        self.output
            .extend_from_slice(format!("{} {} obj\n", obj_ref.id, obj_ref.gen).as_bytes());
        let body_offset = self.output.len();
        self.output.extend_from_slice(body);
        self.output.extend_from_slice(b"\nendobj\n");
        body_offset
    }

    /// Write the xref section and trailer, returning the complete file.
    pub fn finish(mut self) -> Vec<u8> {
        let xref_start = if self.stream_xref {
            self.write_xref_stream()
        } else {
            self.write_xref_table()
        };
        self.output
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_start).as_bytes());

        log::debug!(
            "Appended {} objects, new {} at {} (prev {})",
            self.offsets.len(),
            if self.stream_xref { "xref stream" } else { "xref table" },
            xref_start,
            self.prev_startxref
        );
        self.output
    }

    /// Base trailer entries plus `/Size` and `/Prev`.
    fn trailer(&self) -> Dict {
        let size = self.offsets.keys().last().map(|id| id + 1).unwrap_or(0).max(self.next_id);
        let mut trailer = self.base_trailer.clone();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.prev_startxref as i64));
        trailer
    }

    fn write_xref_table(&mut self) -> usize {
        let xref_start = self.output.len();
        let mut section = String::from("xref\n");

        let ids: Vec<(u32, usize)> = self.offsets.iter().map(|(id, off)| (*id, *off)).collect();
        for group in subsections(&ids) {
            section.push_str(&format!("{} {}\n", group[0].0, group.len()));
            for (_, offset) in group {
                section.push_str(&format!("{:010} 00000 n \n", offset));
            }
        }
        self.output.extend_from_slice(section.as_bytes());

        self.output.extend_from_slice(b"trailer\n");
        let trailer_bytes = self.serializer.serialize(&Object::Dictionary(self.trailer()));
        self.output.extend_from_slice(&trailer_bytes);
        self.output.push(b'\n');
        xref_start
    }

    /// The stream lists itself along with the appended objects.
    fn write_xref_stream(&mut self) -> usize {
        let xref_ref = self.allocate_id();
        let xref_start = self.output.len();
        self.offsets.insert(xref_ref.id, xref_start);

        let ids: Vec<(u32, usize)> = self.offsets.iter().map(|(id, off)| (*id, *off)).collect();
        let mut index = Vec::new();
        let mut rows = Vec::with_capacity(ids.len() * 7);
        for group in subsections(&ids) {
            index.push(Object::Integer(group[0].0 as i64));
            index.push(Object::Integer(group.len() as i64));
            for (_, offset) in group {
                rows.push(1u8);
                rows.extend_from_slice(&(*offset as u32).to_be_bytes());
                rows.extend_from_slice(&0u16.to_be_bytes());
            }
        }

        let mut dict = self.trailer();
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)]),
        );
        dict.insert("Index".to_string(), Object::Array(index));

        let stream = xref_stream(dict, rows, true);
        let bytes = self.serializer.serialize_indirect(xref_ref.id, xref_ref.gen, &stream);
        self.output.extend_from_slice(&bytes);
        xref_start
    }
}

/// Split sorted `(id, offset)` pairs into runs of consecutive ids.
fn subsections(ids: &[(u32, usize)]) -> Vec<&[(u32, usize)]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=ids.len() {
        if i == ids.len() || ids[i].0 != ids[i - 1].0 + 1 {
            if start < i {
                groups.push(&ids[start..i]);
            }
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{PdfWriter, PdfWriterConfig};

    #[test]
    fn test_subsections() {
        let ids = [(3, 0), (4, 0), (9, 0), (10, 0), (12, 0)];
        let groups = subsections(&ids);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[2][0].0, 12);
        assert!(subsections(&[]).is_empty());
    }

    #[test]
    fn test_append_preserves_original_prefix() {
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original.clone()).unwrap();
        let mut update = IncrementalUpdate::new(&doc);
        let new_ref = update.allocate_id();
        assert_eq!(new_ref.id, doc.next_object_id());
        update.add_object(new_ref, &Object::text_string("appended"));
        let bytes = update.finish();

        assert_eq!(&bytes[..original.len()], &original[..]);
        let updated = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(
            updated.get_object(new_ref).unwrap(),
            Object::String(b"appended".to_vec())
        );
        assert_eq!(updated.pages().unwrap().len(), 1);
        assert_eq!(updated.trailer().get("ID"), doc.trailer().get("ID"));
    }

    #[test]
    fn test_replacement_object_wins() {
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original).unwrap();
        let catalog_ref = doc.catalog_ref().unwrap();
        let mut catalog = doc.catalog().unwrap();
        catalog.insert("Lang".to_string(), Object::text_string("en"));

        let mut update = IncrementalUpdate::new(&doc);
        update.add_object(catalog_ref, &Object::Dictionary(catalog));
        let updated = PdfDocument::from_bytes(update.finish()).unwrap();
        assert!(updated.catalog().unwrap().contains_key("Lang"));
    }

    #[test]
    fn test_append_after_xref_stream() {
        let config = PdfWriterConfig::default().with_xref_stream(true).with_compress(true);
        let original = PdfWriter::with_config(config).add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original.clone()).unwrap();
        assert!(doc.has_xref_stream());

        let mut update = IncrementalUpdate::new(&doc);
        let new_ref = update.allocate_id();
        let offset = update.add_raw_object(new_ref, b"<< /Raw true >>");
        let bytes = update.finish();
        assert_eq!(&bytes[offset..offset + 2], b"<<");

        let appended = &bytes[original.len()..];
        assert!(!appended.windows(8).any(|w| w == b"\ntrailer"));
        assert!(!appended.starts_with(b"xref") && !appended.windows(5).any(|w| w == b"\nxref"));

        let updated = PdfDocument::from_bytes(bytes).unwrap();
        assert!(updated.has_xref_stream());
        assert!(updated.get_object(new_ref).unwrap().as_dict().is_some());
        assert_eq!(updated.pages().unwrap().len(), 1);
        assert_eq!(updated.trailer().get("Root"), doc.trailer().get("Root"));
        assert_eq!(updated.trailer().get("ID"), doc.trailer().get("ID"));
        assert!(updated.next_object_id() > new_ref.id + 1);

        // a second revision chains onto the first stream
        let mut again = IncrementalUpdate::new(&updated);
        let later = again.allocate_id();
        again.add_object(later, &Object::Integer(7));
        let twice = PdfDocument::from_bytes(again.finish()).unwrap();
        assert_eq!(twice.get_object(later).unwrap(), Object::Integer(7));
        assert!(twice.get_object(new_ref).unwrap().as_dict().is_some());
    }

    #[test]
    fn test_table_source_keeps_table() {
        let original = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();
        let doc = PdfDocument::from_bytes(original.clone()).unwrap();
        assert!(!doc.has_xref_stream());
        let mut update = IncrementalUpdate::new(&doc);
        let new_ref = update.allocate_id();
        update.add_object(new_ref, &Object::Null);
        let bytes = update.finish();
        assert!(bytes[original.len()..].starts_with(b"xref\n"));
    }
}
