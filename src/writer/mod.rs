//! PDF writing.
//!
//! ## Architecture
//!
//! ```text
//! Object values
//!     ↓
//! [ObjectSerializer] (deterministic object syntax)
//!     ↓
//! [IncrementalUpdate] (append objects + xref + trailer to an existing file)
//! [PdfWriter]         (small complete documents)
//!     ↓
//! PDF bytes
//! ```
//!
//! [`font_manager`] carries the standard font metrics used when laying out
//! stamp text.

pub mod font_manager;
mod incremental;
mod object_serializer;
mod pdf_writer;

pub use font_manager::{encode_win_ansi, select_font, FontFamily, FontWeight, StandardFont};
pub use incremental::IncrementalUpdate;
pub use object_serializer::{format_real, ObjectSerializer};
pub use pdf_writer::{compress_data, PdfWriter, PdfWriterConfig};
