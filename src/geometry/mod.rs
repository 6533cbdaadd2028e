//! View-space and document-space rectangles.
//!
//! View space is what the user sees: pixels with the origin at the top-left
//! corner of the rendered page. Document space is PDF default user space:
//! points with the origin at the bottom-left corner of the unrotated page.
//! [`CoordinateMapper`] is the only place the two are converted, so the
//! preview highlight and the signed widget always agree.

use serde::{Deserialize, Serialize};

/// A rectangle in view space (pixels, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl ViewRect {
    /// Create a new rectangle from position and dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// use stamp_signer::geometry::ViewRect;
    ///
    /// let rect = ViewRect::new(10.0, 20.0, 100.0, 50.0);
    /// assert_eq!(rect.right(), 110.0);
    /// assert_eq!(rect.bottom(), 70.0);
    /// ```
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build a rectangle from two drag corners in any order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether both dimensions exceed `min_px`.
    ///
    /// Anything smaller is treated as "no selection", never as a tiny stamp.
    pub fn is_valid_selection(&self, min_px: f64) -> bool {
        self.width > min_px && self.height > min_px
    }
}

/// A rectangle in PDF user space (`[x0 y0 x1 y1]`, bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocRect {
    /// Lower-left x
    pub x0: f64,
    /// Lower-left y
    pub y0: f64,
    /// Upper-right x
    pub x1: f64,
    /// Upper-right y
    pub y1: f64,
}

impl DocRect {
    /// Create a rectangle from its corners.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Normalize a PDF `/Rect` array so that `x0 <= x1` and `y0 <= y1`.
    pub fn from_pdf_rect(rect: [f64; 4]) -> Self {
        Self {
            x0: rect[0].min(rect[2]),
            y0: rect[1].min(rect[3]),
            x1: rect[0].max(rect[2]),
            y1: rect[1].max(rect[3]),
        }
    }

    /// Width in points.
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Height in points.
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// The rectangle as a `[x0 y0 x1 y1]` array.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// Converts between view space and document space for one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale: f64,
    page_height: f64,
    /// Lower-left corner of the page box
    origin: (f64, f64),
}

impl CoordinateMapper {
    /// Mapper for a page `page_width_pt` × `page_height_pt` (unrotated)
    /// displayed `view_width` pixels wide.
    pub fn new(view_width: f64, page_width_pt: f64, page_height_pt: f64) -> Self {
        let scale = if view_width == 0.0 {
            1.0
        } else {
            page_width_pt / view_width
        };
        Self {
            scale,
            page_height: page_height_pt,
            origin: (0.0, 0.0),
        }
    }

    /// Mapper for a page whose `/MediaBox` is `media_box`, which need not
    /// start at `(0, 0)`.
    pub fn for_media_box(view_width: f64, media_box: [f64; 4]) -> Self {
        let bounds = DocRect::from_pdf_rect(media_box);
        Self::new(view_width, bounds.width(), bounds.height()).with_origin(bounds.x0, bounds.y0)
    }

    /// Shift document space so the page box starts at `(llx, lly)`.
    pub fn with_origin(mut self, llx: f64, lly: f64) -> Self {
        self.origin = (llx, lly);
        self
    }

    /// Points per pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Convert a selection to a PDF rectangle.
    pub fn map_to_document(&self, rect: &ViewRect) -> DocRect {
        let (llx, lly) = self.origin;
        let top = lly + self.page_height;
        DocRect {
            x0: llx + rect.x * self.scale,
            y0: top - (rect.y + rect.height) * self.scale,
            x1: llx + (rect.x + rect.width) * self.scale,
            y1: top - rect.y * self.scale,
        }
    }

    /// Convert a PDF rectangle back to view space (highlighting).
    pub fn map_to_view(&self, rect: &DocRect) -> ViewRect {
        let rect = DocRect::from_pdf_rect(rect.to_array());
        let (llx, lly) = self.origin;
        ViewRect {
            x: (rect.x0 - llx) / self.scale,
            y: (lly + self.page_height - rect.y1) / self.scale,
            width: rect.width() / self.scale,
            height: rect.height() / self.scale,
        }
    }
}

/// Map a view rectangle to document space in one call.
pub fn to_document_rect(view_rect: &ViewRect, view_width: f64, page_width_pt: f64, page_height_pt: f64) -> DocRect {
    CoordinateMapper::new(view_width, page_width_pt, page_height_pt).map_to_document(view_rect)
}

/// Inverse of [`to_document_rect`].
pub fn to_view_rect(doc_rect: &DocRect, view_width: f64, page_width_pt: f64, page_height_pt: f64) -> ViewRect {
    CoordinateMapper::new(view_width, page_width_pt, page_height_pt).map_to_view(doc_rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_and_scale() {
        // 612pt page shown 1224px wide: 0.5pt per pixel
        let doc = to_document_rect(&ViewRect::new(100.0, 200.0, 300.0, 100.0), 1224.0, 612.0, 792.0);
        assert_eq!(doc, DocRect::new(50.0, 642.0, 200.0, 692.0));
        assert_eq!(doc.width(), 150.0);
        assert_eq!(doc.height(), 50.0);
    }

    #[test]
    fn test_zero_view_width_uses_unit_scale() {
        let doc = to_document_rect(&ViewRect::new(10.0, 10.0, 20.0, 20.0), 0.0, 612.0, 792.0);
        assert_eq!(doc, DocRect::new(10.0, 762.0, 30.0, 782.0));
    }

    #[test]
    fn test_inverse() {
        let view = ViewRect::new(33.0, 47.5, 120.25, 60.0);
        let doc = to_document_rect(&view, 800.0, 595.0, 842.0);
        let back = to_view_rect(&doc, 800.0, 595.0, 842.0);
        assert!((back.x - view.x).abs() < 1e-9);
        assert!((back.y - view.y).abs() < 1e-9);
        assert!((back.width - view.width).abs() < 1e-9);
        assert!((back.height - view.height).abs() < 1e-9);
    }

    #[test]
    fn test_offset_media_box() {
        let mapper = CoordinateMapper::for_media_box(612.0, [100.0, 100.0, 712.0, 892.0]);
        let doc = mapper.map_to_document(&ViewRect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(doc, DocRect::new(100.0, 842.0, 200.0, 892.0));
        assert_eq!(mapper.map_to_view(&doc), ViewRect::new(0.0, 0.0, 100.0, 50.0));

        // corners given in reverse order describe the same box
        let flipped = CoordinateMapper::for_media_box(612.0, [712.0, 892.0, 100.0, 100.0]);
        assert_eq!(flipped, mapper);
    }

    #[test]
    fn test_selection_threshold() {
        assert!(ViewRect::new(0.0, 0.0, 6.0, 6.0).is_valid_selection(5.0));
        assert!(!ViewRect::new(0.0, 0.0, 5.0, 100.0).is_valid_selection(5.0));
        assert!(!ViewRect::new(0.0, 0.0, 100.0, 4.9).is_valid_selection(5.0));
    }

    #[test]
    fn test_from_corners_and_pdf_rect() {
        assert_eq!(ViewRect::from_corners(50.0, 80.0, 10.0, 20.0), ViewRect::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(
            DocRect::from_pdf_rect([200.0, 100.0, 50.0, 10.0]),
            DocRect::new(50.0, 10.0, 200.0, 100.0)
        );
    }
}
