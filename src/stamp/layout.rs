//! Centered, shrink-to-fit text layout.

use super::markup::{StyledText, TextStyle, DEFAULT_FONT_SIZE};
use crate::writer::{select_font, StandardFont};

/// Line height as a multiple of the largest font size on the line.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// A run placed inside the box.
///
/// Coordinates are measured from the top-left corner of the box, `y` being
/// the baseline. All sizes already include the shrink factor.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedRun {
    /// Text
    pub text: String,
    /// Font used to draw it
    pub font: StandardFont,
    /// Font size in box units
    pub size: f32,
    /// RGB fill color
    pub color: [u8; 3],
    /// Underlined
    pub underline: bool,
    /// Left edge
    pub x: f32,
    /// Baseline, from the top of the box
    pub baseline: f32,
    /// Advance width
    pub width: f32,
}

/// Laid-out stamp text.
#[derive(Debug, Clone, PartialEq)]
pub struct StampLayout {
    /// Box width
    pub width: f32,
    /// Box height
    pub height: f32,
    /// Uniform shrink factor applied (never above 1)
    pub scale: f32,
    /// Runs in drawing order
    pub runs: Vec<PositionedRun>,
}

struct MeasuredLine<'a> {
    runs: Vec<(&'a str, TextStyle, StandardFont, f32)>,
    width: f32,
    max_size: f32,
    ascent: f32,
    descent: f32,
}

impl<'a> MeasuredLine<'a> {
    fn height(&self) -> f32 {
        self.max_size * LINE_HEIGHT_FACTOR
    }
}

/// Lay out `text` inside a `width` × `height` box.
///
/// Lines are centered horizontally; the block is centered vertically. When
/// the natural size exceeds the box everything shrinks uniformly by
/// `min(width / natural_width, height / natural_height)`.
pub fn layout(text: &StyledText, width: f32, height: f32) -> StampLayout {
    let lines: Vec<MeasuredLine<'_>> = text
        .lines
        .iter()
        .map(|line| {
            let mut measured = MeasuredLine {
                runs: Vec::with_capacity(line.runs.len()),
                width: 0.0,
                max_size: 0.0,
                ascent: 0.0,
                descent: 0.0,
            };
            for run in &line.runs {
                let font = select_font(run.style.family, run.style.weight, run.style.italic);
                let run_width = font.text_width(&run.text, run.style.size);
                measured.width += run_width;
                measured.max_size = measured.max_size.max(run.style.size);
                measured.ascent = measured.ascent.max(font.ascender() * run.style.size / 1000.0);
                measured.descent = measured.descent.max(-font.descender() * run.style.size / 1000.0);
                measured.runs.push((run.text.as_str(), run.style, font, run_width));
            }
            if measured.runs.is_empty() {
                // Empty lines still take vertical space
                measured.max_size = DEFAULT_FONT_SIZE;
            }
            measured
        })
        .collect();

    let natural_width = lines.iter().map(|l| l.width).fold(0.0f32, f32::max);
    let natural_height: f32 = lines.iter().map(MeasuredLine::height).sum();

    let ratio = |available: f32, natural: f32| {
        if natural > 0.0 {
            available / natural
        } else {
            1.0
        }
    };
    let scale = ratio(width, natural_width)
        .min(ratio(height, natural_height))
        .clamp(0.0, 1.0);

    let mut runs = Vec::new();
    let mut top = (height - natural_height * scale) / 2.0;
    for line in &lines {
        let line_height = line.height() * scale;
        // Center the glyph extent within the line box
        let glyph_height = (line.ascent + line.descent) * scale;
        let baseline = top + (line_height - glyph_height) / 2.0 + line.ascent * scale;

        let mut x = (width - line.width * scale) / 2.0;
        for (text, style, font, run_width) in &line.runs {
            let scaled_width = run_width * scale;
            runs.push(PositionedRun {
                text: text.to_string(),
                font: *font,
                size: style.size * scale,
                color: style.color,
                underline: style.underline,
                x,
                baseline,
                width: scaled_width,
            });
            x += scaled_width;
        }
        top += line_height;
    }

    StampLayout {
        width,
        height,
        scale,
        runs,
    }
}
