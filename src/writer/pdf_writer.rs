//! Minimal PDF document writer.
//!
//! Produces small, well-formed documents: one catalog, a flat page tree, an
//! optional line of Helvetica text per page and either a classic xref table
//! or a cross-reference stream. Used to create fixtures and blank documents
//! to sign.

use super::object_serializer::ObjectSerializer;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use std::io::Write;

/// Configuration for PDF generation.
#[derive(Debug, Clone)]
pub struct PdfWriterConfig {
    /// PDF version (e.g., "1.7")
    pub version: String,
    /// Document title
    pub title: Option<String>,
    /// Creator application
    pub creator: Option<String>,
    /// Whether to compress streams
    pub compress: bool,
    /// Write a cross-reference stream instead of a classic table
    pub xref_stream: bool,
}

impl Default for PdfWriterConfig {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            title: None,
            creator: Some(crate::NAME.to_string()),
            compress: false,
            xref_stream: false,
        }
    }
}

impl PdfWriterConfig {
    /// Set document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Write a cross-reference stream (PDF 1.5+) instead of an xref table.
    pub fn with_xref_stream(mut self, xref_stream: bool) -> Self {
        self.xref_stream = xref_stream;
        self
    }
}

/// Compress data using zlib, as expected by the FlateDecode filter.
pub fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

struct PageData {
    width: f64,
    height: f64,
    rotation: i64,
    text: Option<String>,
}

/// PDF document writer.
pub struct PdfWriter {
    config: PdfWriterConfig,
    pages: Vec<PageData>,
}

impl PdfWriter {
    /// Create a new PDF writer with default config.
    pub fn new() -> Self {
        Self::with_config(PdfWriterConfig::default())
    }

    /// Create a PDF writer with custom config.
    pub fn with_config(config: PdfWriterConfig) -> Self {
        Self {
            config,
            pages: Vec::new(),
        }
    }

    /// Add an empty page with the given dimensions in points.
    pub fn add_page(mut self, width: f64, height: f64) -> Self {
        self.pages.push(PageData {
            width,
            height,
            rotation: 0,
            text: None,
        });
        self
    }

    /// Add a page with `/Rotate` set.
    pub fn add_rotated_page(mut self, width: f64, height: f64, rotation: i64) -> Self {
        self.pages.push(PageData {
            width,
            height,
            rotation,
            text: None,
        });
        self
    }

    /// Add a page showing one line of text near its top-left corner.
    pub fn add_text_page(mut self, width: f64, height: f64, text: impl Into<String>) -> Self {
        self.pages.push(PageData {
            width,
            height,
            rotation: 0,
            text: Some(text.into()),
        });
        self
    }

    fn content_stream(&self, page: &PageData) -> Object {
        let mut raw = Vec::new();
        if let Some(text) = &page.text {
            let literal = ObjectSerializer::compact().serialize(&Object::String(text.as_bytes().to_vec()));
            raw.extend_from_slice(format!("BT /F1 12 Tf 72 {} Td ", page.height - 72.0).as_bytes());
            raw.extend_from_slice(&literal);
            raw.extend_from_slice(b" Tj ET");
        }

        let mut dict = Dict::new();
        let data = match self.config.compress.then(|| compress_data(&raw)) {
            Some(Ok(compressed)) => {
                dict.insert("Filter".to_string(), Object::name("FlateDecode"));
                compressed
            },
            // Fall back to uncompressed on error
            _ => raw,
        };
        Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        }
    }

    /// Build the complete PDF document.
    pub fn finish(self) -> Result<Vec<u8>> {
        let serializer = ObjectSerializer::compact();
        let mut objects: Vec<(u32, Object)> = Vec::new();

        let catalog_id = 1;
        let pages_id = 2;
        let font_id = 3;
        let info_id = 4;
        let mut next_id = 5;

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let page_id = next_id;
            let content_id = next_id + 1;
            next_id += 2;

            let mut entries = vec![
                ("Type", Object::name("Page")),
                ("Parent", ObjectSerializer::reference(pages_id, 0)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, page.width, page.height)),
                ("Contents", ObjectSerializer::reference(content_id, 0)),
                (
                    "Resources",
                    ObjectSerializer::dict(vec![(
                        "Font",
                        ObjectSerializer::dict(vec![("F1", ObjectSerializer::reference(font_id, 0))]),
                    )]),
                ),
            ];
            if page.rotation != 0 {
                entries.push(("Rotate", Object::Integer(page.rotation)));
            }
            kids.push(ObjectSerializer::reference(page_id, 0));
            objects.push((page_id, ObjectSerializer::dict(entries)));
            objects.push((content_id, self.content_stream(page)));
        }

        objects.push((
            catalog_id,
            ObjectSerializer::dict(vec![
                ("Type", Object::name("Catalog")),
                ("Pages", ObjectSerializer::reference(pages_id, 0)),
            ]),
        ));
        objects.push((
            pages_id,
            ObjectSerializer::dict(vec![
                ("Type", Object::name("Pages")),
                ("Count", Object::Integer(self.pages.len() as i64)),
                ("Kids", Object::Array(kids)),
            ]),
        ));
        objects.push((
            font_id,
            ObjectSerializer::dict(vec![
                ("Type", Object::name("Font")),
                ("Subtype", Object::name("Type1")),
                ("BaseFont", Object::name("Helvetica")),
                ("Encoding", Object::name("WinAnsiEncoding")),
            ]),
        ));
        let mut info = Vec::new();
        if let Some(title) = &self.config.title {
            info.push(("Title", Object::text_string(title)));
        }
        if let Some(creator) = &self.config.creator {
            info.push(("Creator", Object::text_string(creator)));
        }
        objects.push((info_id, ObjectSerializer::dict(info)));
        objects.sort_by_key(|(id, _)| *id);

        let mut output = Vec::new();
        writeln!(output, "%PDF-{}", self.config.version)?;
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut offsets = vec![0usize; next_id as usize];
        for (id, obj) in &objects {
            offsets[*id as usize] = output.len();
            output.extend_from_slice(&serializer.serialize_indirect(*id, 0, obj));
        }

        let mut trailer = vec![
            ("Root", ObjectSerializer::reference(catalog_id, 0)),
            ("Info", ObjectSerializer::reference(info_id, 0)),
            (
                "ID",
                Object::Array(vec![
                    Object::String(document_id(&output)),
                    Object::String(document_id(&output)),
                ]),
            ),
        ];

        let xref_start = output.len();
        if self.config.xref_stream {
            let xref_id = next_id;
            offsets.push(xref_start);
            let size = xref_id + 1;

            // /W [1 4 2]; PNG Up predictor rows when compressed
            let mut rows = Vec::with_capacity(offsets.len() * 7);
            for (id, offset) in offsets.iter().enumerate() {
                let (kind, field2, field3) = if id == 0 {
                    (0u8, 0u32, 65535u16)
                } else {
                    (1u8, *offset as u32, 0u16)
                };
                rows.push(kind);
                rows.extend_from_slice(&field2.to_be_bytes());
                rows.extend_from_slice(&field3.to_be_bytes());
            }

            trailer.extend([
                ("Type", Object::name("XRef")),
                ("Size", Object::Integer(size as i64)),
                (
                    "W",
                    Object::Array(vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)]),
                ),
                ("Index", Object::Array(vec![Object::Integer(0), Object::Integer(size as i64)])),
            ]);
            let dict = match ObjectSerializer::dict(trailer) {
                Object::Dictionary(d) => d,
                _ => Dict::new(),
            };
            let stream = xref_stream(dict, rows, self.config.compress);
            output.extend_from_slice(&serializer.serialize_indirect(xref_id, 0, &stream));
        } else {
            writeln!(output, "xref")?;
            writeln!(output, "0 {}", next_id)?;
            writeln!(output, "0000000000 65535 f ")?;
            for offset in offsets.iter().skip(1) {
                writeln!(output, "{:010} 00000 n ", offset)?;
            }
            trailer.push(("Size", Object::Integer(next_id as i64)));
            writeln!(output, "trailer")?;
            output.extend_from_slice(&serializer.serialize(&ObjectSerializer::dict(trailer)));
            writeln!(output)?;
        }

        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        writeln!(output, "%%EOF")?;

        log::debug!("Wrote PDF with {} pages ({} bytes)", self.pages.len(), output.len());
        Ok(output)
    }

    /// Save the PDF to a file.
    pub fn save(self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.finish()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// First 16 bytes of the SHA-256 of the document body.
fn document_id(body: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(body)[..16].to_vec()
}

/// Apply the PNG Up filter (tag 2) to fixed-width rows.
/// Cross-reference stream over `/W [1 4 2]` rows. When `compress` is set the
/// rows are Flate-compressed with the PNG Up predictor.
pub(crate) fn xref_stream(mut dict: Dict, rows: Vec<u8>, compress: bool) -> Object {
    let data = match compress.then(|| compress_data(&png_up_rows(&rows, 7))) {
        Some(Ok(compressed)) => {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            dict.insert(
                "DecodeParms".to_string(),
                ObjectSerializer::dict(vec![
                    ("Predictor", Object::Integer(12)),
                    ("Columns", Object::Integer(7)),
                ]),
            );
            compressed
        },
        _ => rows,
    };
    Object::Stream {
        dict,
        data: bytes::Bytes::from(data),
    }
}

fn png_up_rows(data: &[u8], columns: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / columns);
    let mut previous = vec![0u8; columns];
    for row in data.chunks(columns) {
        out.push(2);
        for (i, byte) in row.iter().enumerate() {
            out.push(byte.wrapping_sub(previous[i]));
        }
        previous[..row.len()].copy_from_slice(row);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfDocument;

    #[test]
    fn test_create_empty_pdf() {
        let bytes = PdfWriter::new().add_page(612.0, 792.0).finish().unwrap();

        let content = String::from_utf8_lossy(&bytes);
        assert!(content.starts_with("%PDF-1.7"));
        assert!(content.contains("/Type /Catalog"));
        assert!(content.contains("/Type /Pages"));
        assert!(content.contains("/Type /Page "));
        assert!(content.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn test_multiple_pages_and_metadata() {
        let config = PdfWriterConfig::default().with_title("Contract");
        let bytes = PdfWriter::with_config(config)
            .add_page(612.0, 792.0)
            .add_page(595.0, 842.0)
            .finish()
            .unwrap();
        let content = String::from_utf8_lossy(&bytes);

        assert!(content.contains("/Count 2"));
        assert!(content.contains("[0 0 612 792]"));
        assert!(content.contains("[0 0 595 842]"));
        assert!(content.contains("/Title (Contract)"));
    }

    #[test]
    fn test_text_page_is_compressed() {
        let config = PdfWriterConfig::default().with_compress(true);
        let bytes = PdfWriter::with_config(config)
            .add_text_page(612.0, 792.0, "Hello (World)")
            .finish()
            .unwrap();
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        let page = &doc.pages().unwrap()[0];
        let page_obj = doc.get_object(page.object_ref).unwrap();
        let contents = doc.resolve(&page_obj.as_dict().unwrap()["Contents"]).unwrap();
        let data = contents.decode_stream_data().unwrap();
        assert_eq!(data, b"BT /F1 12 Tf 72 720 Td (Hello \\(World\\)) Tj ET");
    }

    #[test]
    fn test_xref_stream_output_reads_back() {
        for compress in [false, true] {
            let config = PdfWriterConfig::default().with_xref_stream(true).with_compress(compress);
            let bytes = PdfWriter::with_config(config)
                .add_page(612.0, 792.0)
                .add_rotated_page(612.0, 792.0, 270)
                .finish()
                .unwrap();
            assert!(!String::from_utf8_lossy(&bytes).contains("\ntrailer"));

            let doc = PdfDocument::from_bytes(bytes).unwrap();
            let pages = doc.pages().unwrap();
            assert_eq!(pages.len(), 2);
            assert_eq!(pages[1].rotation, 270);
            assert!(doc.trailer().contains_key("Root"));
        }
    }
}
