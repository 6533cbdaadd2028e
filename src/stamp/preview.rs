//! Raster stamp previews.
//!
//! Glyphs are drawn as boxes sized from the font metrics, which is enough
//! to judge placement and proportions in a selection overlay.

use super::appearance::StampRenderer;
use super::layout::{layout, PositionedRun};
use crate::error::{Error, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Transform};

/// A rendered RGBA preview.
#[derive(Debug, Clone)]
pub struct StampPreview {
    pixmap: Pixmap,
}

impl StampPreview {
    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Number of pixels that are not fully transparent.
    pub fn painted_pixels(&self) -> usize {
        self.pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| Error::Unsupported(format!("PNG encoding failed: {}", e)))
    }
}

impl StampRenderer {
    /// Render `markup` into a transparent `width` × `height` pixel image.
    pub fn preview(&self, markup: &str, width: u32, height: u32) -> Result<StampPreview> {
        let mut pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| {
            Error::Unsupported(format!("Cannot allocate a {}x{} preview", width, height))
        })?;

        let text = self.styled_text(markup);
        let laid_out = layout(&text, width as f32, height as f32);
        for run in &laid_out.runs {
            draw_run(&mut pixmap, run);
        }
        Ok(StampPreview { pixmap })
    }
}

fn draw_run(pixmap: &mut Pixmap, run: &PositionedRun) {
    let mut paint = Paint::default();
    let [r, g, b] = run.color;
    paint.set_color(Color::from_rgba8(r, g, b, 255));
    paint.anti_alias = true;

    let ascent = run.font.ascender() / 1000.0 * run.size;
    let x_height = ascent * 0.7;
    let mut path = PathBuilder::new();
    let mut x = run.x;

    for ch in run.text.chars() {
        let advance = run.font.char_width(ch) * run.size / 1000.0;
        let top = if ch.is_whitespace() {
            None
        } else if ch.is_lowercase() {
            Some(run.baseline - x_height)
        } else {
            Some(run.baseline - ascent)
        };
        if let Some(top) = top {
            let inset = advance * 0.1;
            if let Some(rect) =
                tiny_skia::Rect::from_ltrb(x + inset, top, x + advance - inset, run.baseline)
            {
                path.push_rect(rect);
            }
        }
        x += advance;
    }

    if run.underline {
        let thickness = (run.size * 0.06).max(1.0);
        let y = run.baseline + run.size * 0.12;
        if let Some(rect) = tiny_skia::Rect::from_ltrb(run.x, y, run.x + run.width, y + thickness) {
            path.push_rect(rect);
        }
    }

    if let Some(path) = path.finish() {
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}
