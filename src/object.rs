//! In-memory PDF object model.
//!
//! The parser produces these values and the writer serializes them back, so
//! signature dictionaries, widgets and form updates are all built from them.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and stream objects.
pub type Dict = HashMap<String, Object>;

/// A parsed or synthesized PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Whole number
    Integer(i64),
    /// Number with a fractional part
    Real(f64),
    /// Literal or hex string, kept as raw bytes
    String(Vec<u8>),
    /// Name without its leading slash
    Name(String),
    /// `[ ... ]`
    Array(Vec<Object>),
    /// `<< ... >>`
    Dictionary(Dict),
    /// Dictionary followed by a byte payload
    Stream {
        /// Entries such as `/Length` and `/Filter`
        dict: Dict,
        /// Raw (still encoded) stream data
        data: bytes::Bytes,
    },
    /// `n g R`
    Reference(ObjectRef),
}

/// Object number and generation of an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number (positive)
    pub id: u32,
    /// Generation, zero for objects this crate writes
    pub gen: u16,
}

impl ObjectRef {
    /// Build a reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Shorthand for a name object.
    pub fn name(name: &str) -> Self {
        Object::Name(name.to_string())
    }

    /// Encode a Unicode string as a PDF text string.
    ///
    /// Printable ASCII is stored as-is; anything else is stored as UTF-16BE
    /// with a byte order mark.
    pub fn text_string(text: &str) -> Self {
        if text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
            return Object::String(text.as_bytes().to_vec());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes)
    }

    /// Variant name, used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        use Object::*;
        match self {
            Null => "Null",
            Boolean(_) => "Boolean",
            Integer(_) => "Integer",
            Real(_) => "Real",
            String(_) => "String",
            Name(_) => "Name",
            Array(_) => "Array",
            Dictionary(_) => "Dictionary",
            Stream { .. } => "Stream",
            Reference(_) => "Reference",
        }
    }

    /// Integer payload.
    pub fn as_integer(&self) -> Option<i64> {
        if let Object::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Try to read a number, accepting both integers and reals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Name payload.
    pub fn as_name(&self) -> Option<&str> {
        if let Object::Name(name) = self {
            Some(name.as_str())
        } else {
            None
        }
    }

    /// Dictionary payload; a stream yields its dictionary.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(dict) | Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Array items.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        if let Object::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Indirect reference payload.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        if let Object::Reference(target) = self {
            Some(*target)
        } else {
            None
        }
    }

    /// Raw string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        if let Object::String(bytes) = self {
            Some(bytes.as_slice())
        } else {
            None
        }
    }

    /// Decode a PDF text string (UTF-16BE with BOM, otherwise Latin-1).
    pub fn as_text_string(&self) -> Option<String> {
        let bytes = self.as_string()?;
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            return Some(String::from_utf16_lossy(&units));
        }
        if bytes.len() >= 3 && bytes[..3] == [0xEF, 0xBB, 0xBF] {
            return Some(String::from_utf8_lossy(&bytes[3..]).into_owned());
        }
        Some(bytes.iter().map(|&b| b as char).collect())
    }

    /// Read a four-number array such as `/Rect` or `/MediaBox`.
    pub fn as_rect(&self) -> Option<[f64; 4]> {
        let arr = self.as_array()?;
        if arr.len() != 4 {
            return None;
        }
        let mut out = [0.0; 4];
        for (slot, value) in out.iter_mut().zip(arr) {
            *slot = value.as_number()?;
        }
        Some(out)
    }

    /// `true` for `null`.
    pub fn is_null(&self) -> bool {
        *self == Object::Null
    }

    /// Stream payload with every `/Filter` undone.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        let Object::Stream { dict, data } = self else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            });
        };
        let filters = dict.get("Filter").map(filter_chain).unwrap_or_default();
        if filters.is_empty() {
            return Ok(data.to_vec());
        }
        let params = dict.get("DecodeParms").and_then(predictor_params);
        crate::decoders::decode_stream(data, &filters, params.as_ref())
    }
}

/// `/Filter` may be one name or an array of names.
fn filter_chain(entry: &Object) -> Vec<String> {
    if let Some(single) = entry.as_name() {
        return vec![single.to_string()];
    }
    entry
        .as_array()
        .map(|names| names.iter().filter_map(Object::as_name).map(str::to_string).collect())
        .unwrap_or_default()
}

/// First usable dictionary in `/DecodeParms`.
fn predictor_params(entry: &Object) -> Option<crate::decoders::DecodeParams> {
    let dict = match entry {
        Object::Array(items) => items.iter().find_map(Object::as_dict)?,
        other => other.as_dict()?,
    };
    let read = |key: &str, fallback: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(fallback);

    Some(crate::decoders::DecodeParams {
        predictor: read("Predictor", 1),
        columns: read("Columns", 1).max(1) as usize,
        colors: read("Colors", 1).max(1) as usize,
        bits_per_component: read("BitsPerComponent", 8).max(1) as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_number_accessors() {
        assert_eq!(Object::Integer(42).as_integer(), Some(42));
        assert_eq!(Object::Integer(42).as_number(), Some(42.0));
        assert_eq!(Object::Real(2.5).as_number(), Some(2.5));
        assert!(Object::Real(2.5).as_integer().is_none());
        assert!(Object::Null.is_null());
    }

    #[test]
    fn test_stream_exposes_dictionary() {
        let widget_ap = Object::Stream {
            dict: Dict::from([("BBox".to_string(), Object::Integer(0))]),
            data: bytes::Bytes::from_static(b"q Q"),
        };
        assert!(widget_ap.as_dict().unwrap().contains_key("BBox"));
        assert_eq!(widget_ap.type_name(), "Stream");
    }

    #[test]
    fn test_reference_display() {
        assert_eq!(ObjectRef::new(7, 0).to_string(), "7 0 R");
    }

    #[test]
    fn test_text_string_ascii_stays_literal() {
        let obj = Object::text_string("Approved");
        assert_eq!(obj.as_string(), Some(&b"Approved"[..]));
        assert_eq!(obj.as_text_string().as_deref(), Some("Approved"));
    }

    #[test]
    fn test_text_string_unicode_uses_utf16() {
        let obj = Object::text_string("Señal ✓");
        let bytes = obj.as_string().unwrap();
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        assert_eq!(obj.as_text_string().as_deref(), Some("Señal ✓"));
    }

    #[test]
    fn test_latin1_text_string() {
        let obj = Object::String(vec![b'M', 0xE1, b'l', b'a', b'g', b'a']);
        assert_eq!(obj.as_text_string().as_deref(), Some("Málaga"));
    }

    #[test]
    fn test_as_rect() {
        let obj = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(595.5),
            Object::Integer(842),
        ]);
        assert_eq!(obj.as_rect(), Some([0.0, 0.0, 595.5, 842.0]));
        assert!(Object::Array(vec![Object::Integer(1)]).as_rect().is_none());
    }

    #[test]
    fn test_unfiltered_stream_passthrough() {
        let obj = Object::Stream {
            dict: Dict::new(),
            data: bytes::Bytes::from_static(b"0 0 m"),
        };
        assert_eq!(obj.decode_stream_data().unwrap(), b"0 0 m");
    }

    #[test]
    fn test_flate_stream_decodes() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"BT /F1 12 Tf ET").unwrap();
        let packed = encoder.finish().unwrap();

        let obj = Object::Stream {
            dict: Dict::from([("Filter".to_string(), Object::name("FlateDecode"))]),
            data: bytes::Bytes::from(packed),
        };
        assert_eq!(obj.decode_stream_data().unwrap(), b"BT /F1 12 Tf ET");
    }

    #[test]
    fn test_decoding_non_stream_is_type_error() {
        let err = Object::Boolean(true).decode_stream_data().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidObjectType { ref expected, ref found } if expected == "Stream" && found == "Boolean"
        ));
    }

    #[test]
    fn test_filter_chain_forms() {
        let chain = Object::Array(vec![Object::name("ASCIIHexDecode"), Object::name("FlateDecode")]);
        assert_eq!(filter_chain(&chain), vec!["ASCIIHexDecode", "FlateDecode"]);
        assert_eq!(filter_chain(&Object::name("FlateDecode")), vec!["FlateDecode"]);
        assert!(filter_chain(&Object::Real(1.0)).is_empty());
    }
}
