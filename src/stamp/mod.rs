//! Stamp rendering.
//!
//! Resolved template text goes through three steps:
//!
//! 1. [`markup`] parses the Pango-like markup into styled lines
//! 2. [`layout`] centers the lines in the target box, shrinking to fit
//! 3. [`StampRenderer`] turns the layout into a PDF Form XObject
//!    ([`StampArtifact`]) or an RGBA preview ([`StampPreview`])

mod appearance;
mod cache;
pub mod layout;
pub mod markup;
mod preview;

pub use appearance::{StampArtifact, StampRenderer};
pub use cache::{PreviewCache, PreviewKey};
pub use layout::{PositionedRun, StampLayout};
pub use markup::{StyledText, TextStyle};
pub use preview::StampPreview;
