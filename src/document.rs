//! Read-only view of a PDF file.
//!
//! [`PdfDocument`] keeps the original bytes, the merged cross-reference
//! table of every revision and a cache of loaded objects. Signing needs the
//! catalog, the page list and the AcroForm; scanning additionally walks the
//! signature fields.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object};
use crate::xref::{find_startxref, parse_xref, CrossRefTable, XRefEntry};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Maximum page tree depth followed.
const MAX_PAGE_TREE_DEPTH: u32 = 64;

/// A leaf of the page tree with inherited attributes resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    /// Indirect reference of the page dictionary
    pub object_ref: ObjectRef,
    /// `[llx lly urx ury]` in default user space
    pub media_box: [f64; 4],
    /// Page rotation in degrees (multiple of 90)
    pub rotation: i64,
}

impl PageInfo {
    /// Width of the unrotated page in points.
    pub fn width(&self) -> f64 {
        (self.media_box[2] - self.media_box[0]).abs()
    }

    /// Height of the unrotated page in points.
    pub fn height(&self) -> f64 {
        (self.media_box[3] - self.media_box[1]).abs()
    }
}

/// A parsed PDF file.
pub struct PdfDocument {
    data: Vec<u8>,
    version: String,
    xref: CrossRefTable,
    startxref: usize,
    cache: RefCell<HashMap<u32, Object>>,
    object_streams: RefCell<HashMap<u32, HashMap<u32, Object>>>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("size", &self.data.len())
            .field("objects", &self.xref.len())
            .finish()
    }
}

impl PdfDocument {
    /// Parse a document from its bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header_pos = data
            .windows(5)
            .take(1024)
            .position(|w| w == b"%PDF-")
            .ok_or_else(|| {
                Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
            })?;
        let version: String = data[header_pos + 5..]
            .iter()
            .take_while(|c| c.is_ascii_digit() || **c == b'.')
            .map(|&c| c as char)
            .collect();

        let startxref = find_startxref(&data)?;
        let xref = parse_xref(&data, startxref)?;
        log::debug!(
            "Loaded PDF {} ({} bytes, {} xref entries, startxref {})",
            version,
            data.len(),
            xref.len(),
            startxref
        );

        Ok(Self {
            data,
            version,
            xref,
            startxref,
            cache: RefCell::new(HashMap::new()),
            object_streams: RefCell::new(HashMap::new()),
        })
    }

    /// Raw file bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Header version string such as "1.7".
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Offset of the newest cross-reference section.
    pub fn startxref(&self) -> usize {
        self.startxref
    }

    /// Whether the newest cross-reference section is a stream rather than an
    /// `xref` table.
    pub fn has_xref_stream(&self) -> bool {
        let section = self.data.get(self.startxref..).unwrap_or_default();
        let start = section
            .iter()
            .position(|c| !c.is_ascii_whitespace())
            .unwrap_or(section.len());
        !section[start..].starts_with(b"xref")
    }

    /// Merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Whether the document uses the standard security handler.
    pub fn is_encrypted(&self) -> bool {
        self.trailer().contains_key("Encrypt")
    }

    /// First object number not used by any revision.
    pub fn next_object_id(&self) -> u32 {
        let size = self
            .trailer()
            .get("Size")
            .and_then(Object::as_integer)
            .unwrap_or(0)
            .max(0) as u32;
        size.max(self.xref.max_object_id() + 1)
    }

    /// Load an indirect object by reference.
    pub fn get_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(obj) = self.cache.borrow().get(&obj_ref.id) {
            return Ok(obj.clone());
        }

        let object = match self.xref.get(obj_ref.id) {
            Some(XRefEntry::InFile { offset, .. }) => self.load_at(*offset, obj_ref)?,
            Some(XRefEntry::InStream { stream_id, .. }) => self.load_from_stream(*stream_id, obj_ref.id)?,
            Some(XRefEntry::Free) | None => {
                return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen));
            },
        };

        self.cache.borrow_mut().insert(obj_ref.id, object.clone());
        Ok(object)
    }

    fn load_at(&self, offset: usize, obj_ref: ObjectRef) -> Result<Object> {
        if offset >= self.data.len() {
            return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen));
        }
        let (_, (found, object)) = parse_indirect_object(&self.data[offset..]).map_err(|_| Error::ParseError {
            offset,
            reason: format!("expected object {}", obj_ref),
        })?;
        if found.id != obj_ref.id {
            return Err(Error::ParseError {
                offset,
                reason: format!("expected object {} but found {}", obj_ref, found),
            });
        }
        Ok(object)
    }

    fn load_from_stream(&self, stream_id: u32, id: u32) -> Result<Object> {
        if let Some(objects) = self.object_streams.borrow().get(&stream_id) {
            return objects.get(&id).cloned().ok_or(Error::ObjectNotFound(id, 0));
        }

        let stream = match self.xref.get(stream_id) {
            Some(XRefEntry::InFile { offset, .. }) => self.load_at(*offset, ObjectRef::new(stream_id, 0))?,
            _ => return Err(Error::ObjectNotFound(stream_id, 0)),
        };
        let objects = parse_object_stream(&stream)?;
        let found = objects.get(&id).cloned().ok_or(Error::ObjectNotFound(id, 0));
        self.object_streams.borrow_mut().insert(stream_id, objects);
        found
    }

    /// Follow a reference (once or repeatedly) until a direct object is reached.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        let mut hops = 0;
        while let Object::Reference(r) = current {
            hops += 1;
            if hops > 32 {
                return Err(Error::RecursionLimitExceeded(32));
            }
            current = self.get_object(r)?;
        }
        Ok(current)
    }

    /// Resolve a dictionary entry, returning `None` when absent or unresolvable.
    pub fn resolve_key(&self, dict: &Dict, key: &str) -> Option<Object> {
        dict.get(key).and_then(|value| self.resolve(value).ok())
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&self) -> Result<Dict> {
        let catalog = self.get_object(self.catalog_ref()?)?;
        catalog
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("catalog is not a dictionary".to_string()))
    }

    /// Pages in document order.
    pub fn pages(&self) -> Result<Vec<PageInfo>> {
        let catalog = self.catalog()?;
        let root = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog has no /Pages reference".to_string()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(root, [0.0, 0.0, 612.0, 792.0], 0, 0, &mut visited, &mut pages)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        inherited_box: [f64; 4],
        inherited_rotation: i64,
        depth: u32,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<PageInfo>,
    ) -> Result<()> {
        if depth > MAX_PAGE_TREE_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_PAGE_TREE_DEPTH));
        }
        if !visited.insert(node_ref) {
            log::warn!("Page tree cycle at {}", node_ref);
            return Ok(());
        }

        let node = self.get_object(node_ref)?;
        let dict = node
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf(format!("page tree node {} is not a dictionary", node_ref)))?;

        let media_box = self
            .resolve_key(dict, "MediaBox")
            .and_then(|b| b.as_rect())
            .unwrap_or(inherited_box);
        let rotation = self
            .resolve_key(dict, "Rotate")
            .and_then(|r| r.as_integer())
            .unwrap_or(inherited_rotation);

        match self.resolve_key(dict, "Kids") {
            Some(Object::Array(kids)) if dict.get("Type").and_then(Object::as_name) != Some("Page") => {
                for kid in kids.iter().filter_map(Object::as_reference) {
                    self.collect_pages(kid, media_box, rotation, depth + 1, visited, out)?;
                }
            },
            _ => out.push(PageInfo {
                object_ref: node_ref,
                media_box,
                rotation: rotation.rem_euclid(360),
            }),
        }
        Ok(())
    }

    /// Index of the page with the given reference, if any.
    pub fn page_index_of(&self, page_ref: ObjectRef) -> Result<Option<usize>> {
        Ok(self.pages()?.iter().position(|p| p.object_ref == page_ref))
    }

    /// The interactive form dictionary, if the catalog has one.
    pub fn acroform(&self) -> Result<Option<Dict>> {
        let catalog = self.catalog()?;
        Ok(self
            .resolve_key(&catalog, "AcroForm")
            .and_then(|form| form.as_dict().cloned()))
    }
}

/// Parse an object stream (`/Type /ObjStm`) into its objects.
pub fn parse_object_stream(stream: &Object) -> Result<HashMap<u32, Object>> {
    let dict = stream
        .as_dict()
        .ok_or_else(|| Error::InvalidPdf("object stream is not a stream".to_string()))?;
    let count = dict.get("N").and_then(Object::as_integer).unwrap_or(0).max(0) as usize;
    let first = dict.get("First").and_then(Object::as_integer).unwrap_or(0).max(0) as usize;
    let data = stream.decode_stream_data()?;
    if first > data.len() {
        return Err(Error::InvalidPdf("object stream /First is past the data".to_string()));
    }

    let mut header = &data[..first];
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let (rest, id) = parse_object(header).map_err(|_| Error::InvalidPdf("bad object stream header".to_string()))?;
        let (rest, offset) = parse_object(rest).map_err(|_| Error::InvalidPdf("bad object stream header".to_string()))?;
        header = rest;
        match (id.as_integer(), offset.as_integer()) {
            (Some(id), Some(offset)) => offsets.push((id as u32, offset as usize)),
            _ => return Err(Error::InvalidPdf("bad object stream header".to_string())),
        }
    }

    let mut objects = HashMap::with_capacity(count);
    for (id, offset) in offsets {
        let start = first + offset;
        if start > data.len() {
            log::warn!("Object {} offset {} is outside its object stream", id, offset);
            continue;
        }
        match parse_object(&data[start..]) {
            Ok((_, obj)) => {
                objects.insert(id, obj);
            },
            Err(_) => log::warn!("Could not parse object {} in object stream", id),
        }
    }
    Ok(objects)
}
