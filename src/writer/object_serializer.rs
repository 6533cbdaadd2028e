//! Object-to-bytes encoding.
//!
//! Dictionary keys are emitted in sorted order, so one [`Object`] always
//! yields the same bytes and a signed revision can be reproduced exactly.

use crate::object::{Dict, Object, ObjectRef};

/// Writes [`Object`] values in PDF syntax.
///
/// The default layout puts each dictionary entry on its own line; the
/// compact layout keeps a dictionary on one line, which is what signature
/// dictionaries use so placeholder offsets are easy to compute.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer {
    single_line: bool,
}

impl ObjectSerializer {
    /// Multi-line layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line layout.
    pub fn compact() -> Self {
        Self { single_line: true }
    }

    /// Encode one object.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut out = Vec::new();
        self.emit(&mut out, obj);
        out
    }

    /// Encode one object as text, lossily.
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// `id gen obj` ... `endobj` block.
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut out = format!("{id} {gen} obj\n").into_bytes();
        self.emit(&mut out, obj);
        out.extend_from_slice(b"\nendobj\n");
        out
    }

    fn emit(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(flag) => out.extend_from_slice(flag.to_string().as_bytes()),
            Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
            Object::Real(value) => out.extend_from_slice(format_real(*value).as_bytes()),
            Object::String(bytes) => emit_string(out, bytes),
            Object::Name(name) => emit_name(out, name),
            Object::Array(items) => {
                out.push(b'[');
                for (n, item) in items.iter().enumerate() {
                    if n > 0 {
                        out.push(b' ');
                    }
                    self.emit(out, item);
                }
                out.push(b']');
            },
            Object::Dictionary(dict) => self.emit_dict(out, dict),
            Object::Stream { dict, data } => {
                let mut header = dict.clone();
                header.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.emit_dict(out, &header);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nendstream");
            },
            Object::Reference(target) => out.extend_from_slice(target.to_string().as_bytes()),
        }
    }

    fn emit_dict(&self, out: &mut Vec<u8>, dict: &Dict) {
        let separator: &[u8] = if self.single_line { b" " } else { b"\n  " };
        let mut entries: Vec<(&String, &Object)> = dict.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        out.extend_from_slice(b"<<");
        for (key, value) in entries {
            out.extend_from_slice(separator);
            emit_name(out, key);
            out.push(b' ');
            self.emit(out, value);
        }
        match (self.single_line, dict.is_empty()) {
            (true, _) => out.push(b' '),
            (false, false) => out.push(b'\n'),
            (false, true) => {},
        }
        out.extend_from_slice(b">>");
    }
}

/// Up to five decimals, trailing zeros dropped, non-finite values as `0`.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return (value as i64).to_string();
    }
    let fixed = format!("{value:.5}");
    match fixed.trim_end_matches('0').trim_end_matches('.') {
        "" | "-0" => "0".to_string(),
        digits => digits.to_string(),
    }
}

fn emit_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let textual = bytes
        .iter()
        .all(|b| matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7E));
    if !textual {
        out.push(b'<');
        out.extend(bytes.iter().flat_map(|b| format!("{b:02X}").into_bytes()));
        out.push(b'>');
        return;
    }

    out.push(b'(');
    for &b in bytes {
        let escaped: Option<&[u8]> = match b {
            b'(' => Some(b"\\("),
            b')' => Some(b"\\)"),
            b'\\' => Some(b"\\\\"),
            b'\n' => Some(b"\\n"),
            b'\r' => Some(b"\\r"),
            b'\t' => Some(b"\\t"),
            _ => None,
        };
        match escaped {
            Some(seq) => out.extend_from_slice(seq),
            None => out.push(b),
        }
    }
    out.push(b')');
}

/// Delimiters, whitespace, `#` and non-ASCII bytes become `#xx`.
fn emit_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for b in name.bytes() {
        let regular = b.is_ascii_graphic() && !b"#%()/<>[]{}".contains(&b);
        if regular {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

/// Object construction shorthands.
impl ObjectSerializer {
    /// Dictionary from `(key, value)` pairs.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    /// `id gen R`.
    pub fn reference(id: u32, gen: u16) -> Object {
        Object::Reference(ObjectRef::new(id, gen))
    }

    /// `[llx lly urx ury]`.
    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Object {
        Object::Array([x0, y0, x1, y1].into_iter().map(Object::Real).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_object;

    fn text(obj: &Object) -> String {
        ObjectSerializer::compact().serialize_to_string(obj)
    }

    #[test]
    fn test_scalars() {
        assert_eq!(text(&Object::Null), "null");
        assert_eq!(text(&Object::Boolean(false)), "false");
        assert_eq!(text(&Object::Integer(-8192)), "-8192");
        assert_eq!(text(&ObjectSerializer::reference(12, 0)), "12 0 R");
    }

    #[test]
    fn test_reals_are_trimmed() {
        assert_eq!(format_real(72.0), "72");
        assert_eq!(format_real(0.25), "0.25");
        assert_eq!(format_real(12.345678), "12.34568");
        assert_eq!(format_real(-0.000001), "0");
        assert_eq!(format_real(f64::INFINITY), "0");
    }

    #[test]
    fn test_strings_literal_or_hex() {
        assert_eq!(text(&Object::String(b"Signed (draft)".to_vec())), "(Signed \\(draft\\))");
        assert_eq!(text(&Object::String(b"a\\b\n".to_vec())), "(a\\\\b\\n)");
        assert_eq!(text(&Object::String(vec![0xFE, 0xFF, 0x00, 0x41])), "<FEFF0041>");
    }

    #[test]
    fn test_names_escape_delimiters() {
        assert_eq!(text(&Object::name("adbe.pkcs7.detached")), "/adbe.pkcs7.detached");
        assert_eq!(text(&Object::name("Stamp Font")), "/Stamp#20Font");
        assert_eq!(text(&Object::name("x(1)")), "/x#281#29");
    }

    #[test]
    fn test_dictionary_layouts() {
        let widget = ObjectSerializer::dict(vec![
            ("Subtype", Object::name("Widget")),
            ("F", Object::Integer(4)),
        ]);
        assert_eq!(text(&widget), "<< /F 4 /Subtype /Widget >>");
        assert_eq!(
            ObjectSerializer::new().serialize_to_string(&widget),
            "<<\n  /F 4\n  /Subtype /Widget\n>>"
        );
        assert_eq!(ObjectSerializer::new().serialize_to_string(&Object::Dictionary(Dict::new())), "<<>>");
    }

    #[test]
    fn test_indirect_block() {
        let bytes = ObjectSerializer::new().serialize_indirect(9, 0, &Object::Integer(1));
        assert_eq!(bytes, b"9 0 obj\n1\nendobj\n");
    }

    #[test]
    fn test_stream_length_is_recomputed() {
        let stream = Object::Stream {
            dict: Dict::from([("Length".to_string(), Object::Integer(999))]),
            data: bytes::Bytes::from_static(b"0 0 200 60 re"),
        };
        let encoded = text(&stream);
        assert!(encoded.starts_with("<< /Length 13 >>"));
        assert!(encoded.ends_with("\nstream\n0 0 200 60 re\nendstream"));
    }

    #[test]
    fn test_output_parses_back() {
        let field = ObjectSerializer::dict(vec![
            ("Rect", ObjectSerializer::rect(10.0, 20.5, 110.0, 70.25)),
            ("T", Object::text_string("Signature-1")),
            ("P", ObjectSerializer::reference(3, 0)),
        ]);
        let bytes = ObjectSerializer::new().serialize(&field);
        let (_, parsed) = parse_object(&bytes).unwrap();
        let parsed = parsed.as_dict().unwrap();
        assert_eq!(parsed["Rect"].as_rect(), Some([10.0, 20.5, 110.0, 70.25]));
        assert_eq!(parsed["T"], Object::String(b"Signature-1".to_vec()));
        assert_eq!(parsed["P"], ObjectSerializer::reference(3, 0));
    }
}
