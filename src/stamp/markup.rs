//! Stamp markup.
//!
//! A small Pango-like grammar:
//!
//! ```text
//! <b>bold</b> <i>italic</i> <u>underlined</u>
//! <span font_family="serif" size="large" color="#336699">styled</span>
//! ```
//!
//! `<font>` is accepted as an alias of `<span>` (with `face` for the
//! family). Newlines separate lines. Markup that does not parse is shown as
//! its literal text without styling.

use crate::writer::{FontFamily, FontWeight};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, opt},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

/// Size used when nothing else is specified.
pub const DEFAULT_FONT_SIZE: f32 = 10.0;

/// Text style of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Font family
    pub family: FontFamily,
    /// Weight
    pub weight: FontWeight,
    /// Italic or oblique
    pub italic: bool,
    /// Draw an underline
    pub underline: bool,
    /// Size in points
    pub size: f32,
    /// RGB fill color
    pub color: [u8; 3],
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: FontFamily::Sans,
            weight: FontWeight::Normal,
            italic: false,
            underline: false,
            size: DEFAULT_FONT_SIZE,
            color: [0, 0, 0],
        }
    }
}

/// Text sharing one style.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    /// Decoded text without line breaks
    pub text: String,
    /// Style
    pub style: TextStyle,
}

/// One line of runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    /// Runs in reading order
    pub runs: Vec<Run>,
}

/// Parsed markup, split into lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyledText {
    /// Lines top to bottom
    pub lines: Vec<Line>,
}

impl StyledText {
    /// Parse markup, falling back to literal unstyled text on error.
    pub fn parse(markup: &str) -> Self {
        Self::parse_with_base(markup, TextStyle::default())
    }

    /// Parse markup with `base` as the style outside any tag.
    pub fn parse_with_base(markup: &str, base: TextStyle) -> Self {
        match Self::try_parse_with_base(markup, base) {
            Ok(text) => text,
            Err(reason) => {
                log::warn!("Malformed stamp markup ({}); rendering it as plain text", reason);
                Self::plain_with_base(markup, base)
            },
        }
    }

    /// Parse markup strictly.
    pub fn try_parse(markup: &str) -> Result<Self, String> {
        Self::try_parse_with_base(markup, TextStyle::default())
    }

    /// Parse markup strictly, starting from `base`.
    pub fn try_parse_with_base(markup: &str, base: TextStyle) -> Result<Self, String> {
        let (rest, nodes) = many0(node)(markup).map_err(|e| format!("{:?}", e))?;
        if !rest.is_empty() {
            let near: String = rest.chars().take(16).collect();
            return Err(format!("unexpected input near {:?}", near));
        }

        let mut text = StyledText {
            lines: vec![Line::default()],
        };
        let mut stack: Vec<(String, TextStyle)> = Vec::new();
        let mut style = base;

        for node in nodes {
            match node {
                Node::Text(raw) => {
                    let decoded = decode_entities(raw);
                    text.push_text(&decoded, style);
                },
                Node::Open(name, attrs) => {
                    let name = name.to_ascii_lowercase();
                    let new_style = apply_tag(&name, &attrs, style)?;
                    stack.push((name, style));
                    style = new_style;
                },
                Node::Close(name) => {
                    let name = name.to_ascii_lowercase();
                    match stack.pop() {
                        Some((open, previous)) if open == name => style = previous,
                        Some((open, _)) => {
                            return Err(format!("</{}> closes <{}>", name, open));
                        },
                        None => return Err(format!("</{}> without opening tag", name)),
                    }
                },
            }
        }

        if let Some((open, _)) = stack.pop() {
            return Err(format!("<{}> is never closed", open));
        }
        Ok(text)
    }

    /// The literal text, unstyled.
    pub fn plain(text: &str) -> Self {
        Self::plain_with_base(text, TextStyle::default())
    }

    /// The literal text in `base` style.
    pub fn plain_with_base(text: &str, base: TextStyle) -> Self {
        let mut styled = StyledText {
            lines: vec![Line::default()],
        };
        styled.push_text(text, base);
        styled
    }

    fn push_text(&mut self, text: &str, style: TextStyle) {
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                self.lines.push(Line::default());
            }
            let segment = segment.trim_end_matches('\r');
            if segment.is_empty() {
                continue;
            }
            if let Some(line) = self.lines.last_mut() {
                match line.runs.last_mut() {
                    Some(last) if last.style == style => last.text.push_str(segment),
                    _ => line.runs.push(Run {
                        text: segment.to_string(),
                        style,
                    }),
                }
            }
        }
    }

    /// Concatenated text with `\n` between lines.
    pub fn to_plain_string(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.runs.iter().map(|r| r.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug)]
enum Node<'a> {
    Text(&'a str),
    Open(&'a str, Vec<(&'a str, &'a str)>),
    Close(&'a str),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn attr_value(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)
}

fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        multispace1,
        separated_pair(
            take_while1(is_name_char),
            delimited(multispace0, char('='), multispace0),
            attr_value,
        ),
    )(input)
}

fn open_tag(input: &str) -> IResult<&str, Node<'_>> {
    map(
        delimited(
            char('<'),
            pair(take_while1(is_name_char), many0(attribute)),
            terminated(multispace0, char('>')),
        ),
        |(name, attrs)| Node::Open(name, attrs),
    )(input)
}

fn close_tag(input: &str) -> IResult<&str, Node<'_>> {
    map(
        delimited(
            tag("</"),
            take_while1(is_name_char),
            preceded(opt(multispace1), char('>')),
        ),
        Node::Close,
    )(input)
}

fn text(input: &str) -> IResult<&str, Node<'_>> {
    map(take_till1(|c| c == '<'), Node::Text)(input)
}

fn node(input: &str) -> IResult<&str, Node<'_>> {
    alt((close_tag, open_tag, text))(input)
}

/// Decode XML character references.
///
/// An `&` that does not begin a recognized reference is kept as written.
pub fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let reference = after
            .find(';')
            .and_then(|end| Some((entity_char(&after[..end])?, end)));
        match reference {
            Some((decoded, end)) => {
                out.push(decoded);
                rest = &after[end + 1..];
            },
            None => {
                out.push('&');
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}

fn entity_char(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        },
    }
}

fn apply_tag(name: &str, attrs: &[(&str, &str)], mut style: TextStyle) -> Result<TextStyle, String> {
    match name {
        "b" => style.weight = FontWeight::Bold,
        "i" => style.italic = true,
        "u" => style.underline = true,
        "span" | "font" => {
            for (attr, raw_value) in attrs {
                let value = decode_entities(raw_value);
                apply_attribute(&attr.to_ascii_lowercase(), value.trim(), &mut style);
            }
        },
        other => return Err(format!("unknown tag <{}>", other)),
    }
    Ok(style)
}

fn apply_attribute(attr: &str, value: &str, style: &mut TextStyle) {
    let lower = value.to_ascii_lowercase();
    match attr {
        "font_family" | "face" | "font" => match FontFamily::from_markup(value) {
            Some(family) => style.family = family,
            None => log::debug!("Unknown font family {:?}, keeping {:?}", value, style.family),
        },
        "size" => style.size = parse_size(&lower),
        "color" | "foreground" | "fgcolor" => match parse_color(&lower) {
            Some(color) => style.color = color,
            None => log::debug!("Ignoring unreadable color {:?}", value),
        },
        "weight" => {
            style.weight = match lower.as_str() {
                "bold" | "heavy" | "ultrabold" | "semibold" => FontWeight::Bold,
                n => match n.parse::<u32>() {
                    Ok(w) if w >= 600 => FontWeight::Bold,
                    _ => FontWeight::Normal,
                },
            }
        },
        "style" => style.italic = matches!(lower.as_str(), "italic" | "oblique"),
        "underline" => style.underline = lower != "none",
        other => log::debug!("Ignoring unsupported attribute {}", other),
    }
}

/// Named sizes map to fixed points; bare numbers (optionally `pt`) are taken
/// as points. Anything else is the default size.
pub fn parse_size(value: &str) -> f32 {
    match value {
        "small" => 8.0,
        "normal" | "medium" => 10.0,
        "large" => 13.0,
        "huge" | "x-large" => 16.0,
        other => other
            .trim_end_matches("pt")
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|size| size.is_finite() && *size > 0.0 && *size <= 200.0)
            .unwrap_or(DEFAULT_FONT_SIZE),
    }
}

/// `#rgb`, `#rrggbb` or a basic color name.
pub fn parse_color(value: &str) -> Option<[u8; 3]> {
    let named = match value {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "gray" | "grey" => Some([128, 128, 128]),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 17;
            }
            Some(rgb)
        },
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        _ => None,
    }
}
