//! Message cards — the rendered record of a flagged message.

pub mod avatar;
pub mod font;
pub mod model;
pub mod render;

pub use avatar::placeholder_avatar;
pub use font::{FileFontProvider, FontSet};
pub use model::{Card, RenderedImage};
pub use render::{CardRenderer, RenderConfig};
