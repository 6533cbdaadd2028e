//! Standard 14 font metrics.
//!
//! Stamps are drawn with the non-embedded standard fonts, so every viewer can
//! render them without font data in the file. Widths come from the Adobe
//! AFM files for printable ASCII; other characters use an average width.

/// Font family as requested by stamp markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    /// Helvetica
    #[default]
    Sans,
    /// Times
    Serif,
    /// Courier
    Mono,
}

impl FontFamily {
    /// Parse a family name as written in markup (`sans`, `serif`, `monospace`, ...).
    pub fn from_markup(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "sans" | "sans-serif" | "helvetica" | "arial" => Some(Self::Sans),
            "serif" | "times" | "times new roman" | "times-roman" => Some(Self::Serif),
            "mono" | "monospace" | "courier" | "courier new" => Some(Self::Mono),
            _ => None,
        }
    }
}

/// Font weight classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontWeight {
    /// Normal weight
    #[default]
    Normal,
    /// Bold weight
    Bold,
}

/// One of the twelve Latin standard fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    /// Helvetica
    Helvetica,
    /// Helvetica-Bold
    HelveticaBold,
    /// Helvetica-Oblique
    HelveticaOblique,
    /// Helvetica-BoldOblique
    HelveticaBoldOblique,
    /// Times-Roman
    TimesRoman,
    /// Times-Bold
    TimesBold,
    /// Times-Italic
    TimesItalic,
    /// Times-BoldItalic
    TimesBoldItalic,
    /// Courier
    Courier,
    /// Courier-Bold
    CourierBold,
    /// Courier-Oblique
    CourierOblique,
    /// Courier-BoldOblique
    CourierBoldOblique,
}

/// Select the best matching font for the given criteria.
pub fn select_font(family: FontFamily, weight: FontWeight, italic: bool) -> StandardFont {
    use StandardFont::*;
    match (family, weight, italic) {
        (FontFamily::Sans, FontWeight::Normal, false) => Helvetica,
        (FontFamily::Sans, FontWeight::Bold, false) => HelveticaBold,
        (FontFamily::Sans, FontWeight::Normal, true) => HelveticaOblique,
        (FontFamily::Sans, FontWeight::Bold, true) => HelveticaBoldOblique,
        (FontFamily::Serif, FontWeight::Normal, false) => TimesRoman,
        (FontFamily::Serif, FontWeight::Bold, false) => TimesBold,
        (FontFamily::Serif, FontWeight::Normal, true) => TimesItalic,
        (FontFamily::Serif, FontWeight::Bold, true) => TimesBoldItalic,
        (FontFamily::Mono, FontWeight::Normal, false) => Courier,
        (FontFamily::Mono, FontWeight::Bold, false) => CourierBold,
        (FontFamily::Mono, FontWeight::Normal, true) => CourierOblique,
        (FontFamily::Mono, FontWeight::Bold, true) => CourierBoldOblique,
    }
}

impl StandardFont {
    /// PostScript name used as `/BaseFont`.
    pub fn base_font_name(self) -> &'static str {
        use StandardFont::*;
        match self {
            Helvetica => "Helvetica",
            HelveticaBold => "Helvetica-Bold",
            HelveticaOblique => "Helvetica-Oblique",
            HelveticaBoldOblique => "Helvetica-BoldOblique",
            TimesRoman => "Times-Roman",
            TimesBold => "Times-Bold",
            TimesItalic => "Times-Italic",
            TimesBoldItalic => "Times-BoldItalic",
            Courier => "Courier",
            CourierBold => "Courier-Bold",
            CourierOblique => "Courier-Oblique",
            CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Family this font belongs to.
    pub fn family(self) -> FontFamily {
        use StandardFont::*;
        match self {
            Helvetica | HelveticaBold | HelveticaOblique | HelveticaBoldOblique => FontFamily::Sans,
            TimesRoman | TimesBold | TimesItalic | TimesBoldItalic => FontFamily::Serif,
            _ => FontFamily::Mono,
        }
    }

    /// Whether this is a bold face.
    pub fn is_bold(self) -> bool {
        use StandardFont::*;
        matches!(
            self,
            HelveticaBold
                | HelveticaBoldOblique
                | TimesBold
                | TimesBoldItalic
                | CourierBold
                | CourierBoldOblique
        )
    }

    /// Whether this is an italic or oblique face.
    pub fn is_italic(self) -> bool {
        use StandardFont::*;
        matches!(
            self,
            HelveticaOblique
                | HelveticaBoldOblique
                | TimesItalic
                | TimesBoldItalic
                | CourierOblique
                | CourierBoldOblique
        )
    }

    /// Ascender above the baseline in 1/1000 em.
    pub fn ascender(self) -> f32 {
        self.vertical_metrics().0
    }

    /// Descender below the baseline in 1/1000 em (negative).
    pub fn descender(self) -> f32 {
        self.vertical_metrics().1
    }

    fn vertical_metrics(self) -> (f32, f32) {
        match (self.family(), self.is_bold()) {
            (FontFamily::Sans, _) => (718.0, -207.0),
            (FontFamily::Serif, false) => (683.0, -217.0),
            (FontFamily::Serif, true) => (676.0, -205.0),
            (FontFamily::Mono, false) => (629.0, -157.0),
            (FontFamily::Mono, true) => (626.0, -142.0),
        }
    }

    /// Width of one character in 1/1000 em.
    pub fn char_width(self, ch: char) -> f32 {
        if self.family() == FontFamily::Mono {
            return 600.0;
        }
        let table = match (self.family(), self.is_bold()) {
            (FontFamily::Sans, false) => &HELVETICA_WIDTHS,
            (FontFamily::Sans, true) => &HELVETICA_BOLD_WIDTHS,
            _ => &TIMES_ROMAN_WIDTHS,
        };
        match ch as u32 {
            code @ 32..=126 => table[(code - 32) as usize] as f32,
            _ => 556.0,
        }
    }

    /// Width of a string in points at `font_size`.
    pub fn text_width(self, text: &str, font_size: f32) -> f32 {
        let units: f32 = text.chars().map(|c| self.char_width(c)).sum();
        units * font_size / 1000.0
    }
}

/// Encode text for a simple font with `/WinAnsiEncoding`.
///
/// Characters with no WinAnsi code become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            code @ 0x20..=0x7E => code as u8,
            code @ 0xA0..=0xFF => code as u8,
            _ => win_ansi_special(ch).unwrap_or(b'?'),
        })
        .collect()
}

fn win_ansi_special(ch: char) -> Option<u8> {
    Some(match ch {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    })
}

// Widths for ASCII 32..=126.

const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, // A-Z
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, // a-z
    334, 260, 334, 584, // '{'..'~'
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, //
    333, 333, 584, 584, 584, 611, 975, //
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, //
    333, 278, 333, 584, 556, 333, //
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, //
    389, 280, 389, 584, //
];

const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, //
    278, 278, 564, 564, 564, 444, 921, //
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, 556, 722, 667, 556,
    611, 722, 722, 944, 722, 722, 611, //
    333, 278, 333, 469, 500, 333, //
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, 500, 500, 333, 389,
    278, 500, 500, 722, 500, 500, 444, //
    480, 200, 480, 541, //
];
