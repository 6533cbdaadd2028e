//! Stamp appearance streams.
//!
//! The stamp is drawn into a Form XObject whose `/BBox` equals the field
//! rectangle size, so viewers show it unscaled as the widget's normal
//! appearance.

use super::layout::{layout, StampLayout};
use super::markup::{StyledText, TextStyle};
use crate::error::Result;
use crate::object::{Dict, Object};
use crate::writer::{
    compress_data, encode_win_ansi, format_real, FontFamily, ObjectSerializer, StandardFont,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A rendered stamp ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct StampArtifact {
    /// Width in points
    pub width: f64,
    /// Height in points
    pub height: f64,
    /// Uncompressed content stream
    pub content: Vec<u8>,
    /// Resource name → font
    pub fonts: BTreeMap<String, StandardFont>,
}

impl StampArtifact {
    /// Build the Form XObject stream object.
    pub fn to_xobject(&self) -> Result<Object> {
        let mut fonts = Dict::new();
        for (name, font) in &self.fonts {
            fonts.insert(
                name.clone(),
                ObjectSerializer::dict(vec![
                    ("Type", Object::name("Font")),
                    ("Subtype", Object::name("Type1")),
                    ("BaseFont", Object::name(font.base_font_name())),
                    ("Encoding", Object::name("WinAnsiEncoding")),
                ]),
            );
        }

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        dict.insert("FormType".to_string(), Object::Integer(1));
        dict.insert("BBox".to_string(), ObjectSerializer::rect(0.0, 0.0, self.width, self.height));
        dict.insert(
            "Resources".to_string(),
            ObjectSerializer::dict(vec![
                ("Font", Object::Dictionary(fonts)),
                (
                    "ProcSet",
                    Object::Array(vec![Object::name("PDF"), Object::name("Text")]),
                ),
            ]),
        );
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));

        let data = compress_data(&self.content)?;
        Ok(Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        })
    }
}

/// Renders stamp markup into a PDF appearance or a raster preview.
#[derive(Debug, Clone, Copy, Default)]
pub struct StampRenderer {
    base_style: TextStyle,
}

impl StampRenderer {
    /// Create a renderer using Helvetica outside styled spans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `family` for text whose markup names no family.
    pub fn with_font_family(mut self, family: FontFamily) -> Self {
        self.base_style.family = family;
        self
    }

    /// Parse `markup` with this renderer's base style.
    pub fn styled_text(&self, markup: &str) -> StyledText {
        StyledText::parse_with_base(markup, self.base_style)
    }

    /// Render `markup` into a `width` × `height` point box.
    pub fn render(&self, markup: &str, width: f64, height: f64) -> StampArtifact {
        let text = self.styled_text(markup);
        let laid_out = layout(&text, width as f32, height as f32);
        log::debug!(
            "Rendered stamp {}x{} with {} runs (scale {:.3})",
            format_real(width),
            format_real(height),
            laid_out.runs.len(),
            laid_out.scale
        );
        content_for(&laid_out, width, height)
    }
}

fn content_for(laid_out: &StampLayout, width: f64, height: f64) -> StampArtifact {
    let mut fonts: BTreeMap<String, StandardFont> = BTreeMap::new();
    let mut content = String::from("q\n");

    for run in &laid_out.runs {
        let resource = match fonts.iter().find(|(_, f)| **f == run.font) {
            Some((name, _)) => name.clone(),
            None => {
                let name = format!("F{}", fonts.len() + 1);
                fonts.insert(name.clone(), run.font);
                name
            },
        };

        let [r, g, b] = run.color;
        let color = format!(
            "{} {} {}",
            format_real(r as f64 / 255.0),
            format_real(g as f64 / 255.0),
            format_real(b as f64 / 255.0)
        );
        // Layout is top-down; PDF user space is bottom-up
        let x = run.x as f64;
        let y = height - run.baseline as f64;
        let size = run.size as f64;

        let _ = writeln!(
            content,
            "BT /{} {} Tf {} rg {} {} Td ({}) Tj ET",
            resource,
            format_real(size),
            color,
            format_real(x),
            format_real(y),
            escape_literal(&encode_win_ansi(&run.text))
        );
        if run.underline {
            let _ = writeln!(
                content,
                "{} rg {} {} {} {} re f",
                color,
                format_real(x),
                format_real(y - size * 0.12),
                format_real(run.width as f64),
                format_real((size * 0.06).max(0.3))
            );
        }
    }
    content.push_str("Q\n");

    StampArtifact {
        width,
        height,
        content: content.into_bytes(),
        fonts,
    }
}

/// Escape bytes for a literal string body. Non-ASCII bytes become octal.
fn escape_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            },
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain() {
        let artifact = StampRenderer::new().render("Jane Doe", 120.0, 40.0);
        let content = String::from_utf8(artifact.content.clone()).unwrap();
        assert!(content.starts_with("q\n"));
        assert!(content.ends_with("Q\n"));
        assert!(content.contains("(Jane Doe) Tj"));
        assert!(content.contains("/F1 10 Tf"));
        assert_eq!(artifact.fonts.get("F1"), Some(&StandardFont::Helvetica));
    }

    #[test]
    fn test_fonts_are_shared() {
        let artifact = StampRenderer::new().render("<b>A</b>B<b>C</b>", 120.0, 40.0);
        assert_eq!(artifact.fonts.len(), 2);
        assert_eq!(artifact.fonts.get("F1"), Some(&StandardFont::HelveticaBold));
        assert_eq!(artifact.fonts.get("F2"), Some(&StandardFont::Helvetica));
    }

    #[test]
    fn test_escapes_text() {
        let artifact = StampRenderer::new().render("a(b)\\ é", 200.0, 40.0);
        let content = String::from_utf8(artifact.content).unwrap();
        assert!(content.contains("(a\\(b\\)\\\\ \\351) Tj"));
    }

    #[test]
    fn test_underline_and_color() {
        let artifact =
            StampRenderer::new().render("<u><span color=\"#ff0000\">x</span></u>", 100.0, 30.0);
        let content = String::from_utf8(artifact.content).unwrap();
        assert!(content.contains("1 0 0 rg"));
        assert!(content.contains(" re f"));
    }

    #[test]
    fn test_font_family_fallback() {
        let renderer = StampRenderer::new().with_font_family(FontFamily::Serif);
        let artifact = renderer.render("plain <b>bold</b> <span face=\"mono\">code</span>", 300.0, 40.0);
        let fonts: Vec<_> = artifact.fonts.values().copied().collect();
        assert_eq!(
            fonts,
            vec![StandardFont::TimesRoman, StandardFont::TimesBold, StandardFont::Courier]
        );
    }

    #[test]
    fn test_malformed_markup_is_literal() {
        let artifact = StampRenderer::new().render("<b>open", 200.0, 40.0);
        let content = String::from_utf8(artifact.content).unwrap();
        assert!(content.contains("(<b>open) Tj"));
    }

    #[test]
    fn test_xobject_dictionary() {
        let artifact = StampRenderer::new().render("Signed", 150.0, 50.0);
        let xobject = artifact.to_xobject().unwrap();
        let dict = xobject.as_dict().unwrap();
        assert_eq!(dict.get("Subtype").and_then(Object::as_name), Some("Form"));
        assert_eq!(dict.get("BBox").and_then(Object::as_rect), Some([0.0, 0.0, 150.0, 50.0]));
        assert_eq!(xobject.decode_stream_data().unwrap(), artifact.content);
        let resources = dict.get("Resources").and_then(Object::as_dict).unwrap();
        let fonts = resources.get("Font").and_then(Object::as_dict).unwrap();
        assert!(fonts.contains_key("F1"));
    }
}
