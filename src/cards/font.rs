//! Font faces used by the card renderer.
//!
//! A face measures and rasterizes a single line of text. TrueType faces
//! come from disk via a [`FontProvider`]; when a face cannot be loaded the
//! renderer falls back to [`BitmapFace`], a built-in 8×8 fixed-width font.

use std::path::PathBuf;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, GlyphId, PxScale, Rect, ScaleFont, point};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use crate::error::FontError;

/// Which face of the family is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceId {
    Regular,
    Bold,
}

impl FaceId {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Bold => "bold",
        }
    }
}

/// Ink bounding box of a line of text, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextExtent {
    pub width: u32,
    pub height: u32,
}

/// Measures and draws single lines of text.
pub trait FontFace: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Ink extent of `text` at `size` pixels.
    fn measure(&self, text: &str, size: f32) -> TextExtent;

    /// Draw `text` with its top-left at `origin`.
    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, origin: (i32, i32), color: Rgb<u8>);
}

/// Loads font faces by id.
pub trait FontProvider {
    fn load(&self, face: FaceId) -> Result<Arc<dyn FontFace>, FontError>;
}

/// Loads TrueType/OpenType faces from configured file paths.
#[derive(Debug, Clone)]
pub struct FileFontProvider {
    regular: PathBuf,
    bold: PathBuf,
}

impl FileFontProvider {
    pub fn new(regular: impl Into<PathBuf>, bold: impl Into<PathBuf>) -> Self {
        Self {
            regular: regular.into(),
            bold: bold.into(),
        }
    }
}

impl FontProvider for FileFontProvider {
    fn load(&self, face: FaceId) -> Result<Arc<dyn FontFace>, FontError> {
        let path = match face {
            FaceId::Regular => &self.regular,
            FaceId::Bold => &self.bold,
        };
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let face = TrueTypeFace::from_bytes(path.display().to_string(), bytes)?;
        Ok(Arc::new(face))
    }
}

/// The regular and bold faces a card is drawn with.
#[derive(Clone)]
pub struct FontSet {
    pub regular: Arc<dyn FontFace>,
    pub bold: Arc<dyn FontFace>,
}

impl FontSet {
    /// Built-in bitmap faces only. No files needed.
    pub fn builtin() -> Self {
        Self {
            regular: Arc::new(BitmapFace::regular()),
            bold: Arc::new(BitmapFace::bold()),
        }
    }

    /// Load faces from `provider`, downgrading instead of failing:
    /// a missing bold face reuses the regular one, a missing regular face
    /// uses the built-in bitmap font.
    pub fn resolve(provider: &dyn FontProvider) -> Self {
        let regular: Arc<dyn FontFace> = match provider.load(FaceId::Regular) {
            Ok(face) => face,
            Err(e) => {
                warn!(error = %e, "Regular font unavailable, using built-in bitmap font");
                Arc::new(BitmapFace::regular())
            }
        };

        let bold: Arc<dyn FontFace> = match provider.load(FaceId::Bold) {
            Ok(face) => face,
            Err(e) if regular.name() != BitmapFace::REGULAR_NAME => {
                warn!(error = %e, "Bold font unavailable, using regular face");
                Arc::clone(&regular)
            }
            Err(e) => {
                debug!(error = %e, "Bold font unavailable");
                Arc::new(BitmapFace::bold())
            }
        };

        debug!(regular = regular.name(), bold = bold.name(), "Fonts resolved");
        Self { regular, bold }
    }
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("regular", &self.regular.name())
            .field("bold", &self.bold.name())
            .finish()
    }
}

// ── TrueType ────────────────────────────────────────────────────────

/// A scalable outline face backed by `ab_glyph`.
pub struct TrueTypeFace {
    name: String,
    font: FontVec,
}

impl TrueTypeFace {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, FontError> {
        let name = name.into();
        let font = FontVec::try_from_vec(bytes).map_err(|_| FontError::Invalid {
            path: name.clone(),
        })?;
        Ok(Self { name, font })
    }

    /// Lay out glyphs on a single line with the baseline at the ascent.
    fn layout(&self, text: &str, size: f32) -> Vec<ab_glyph::Glyph> {
        let scale = PxScale::from(size);
        let scaled = self.font.as_scaled(scale);
        let mut caret = 0.0f32;
        let mut previous: Option<GlyphId> = None;
        let mut glyphs = Vec::with_capacity(text.len());

        for c in text.chars() {
            if c.is_control() {
                continue;
            }
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(caret, scaled.ascent())));
            caret += scaled.h_advance(id);
            previous = Some(id);
        }
        glyphs
    }

    fn ink_bounds(&self, text: &str, size: f32) -> Option<Rect> {
        self.layout(text, size)
            .into_iter()
            .filter_map(|g| self.font.outline_glyph(g))
            .map(|outlined| outlined.px_bounds())
            .reduce(|a, b| Rect {
                min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
                max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
            })
    }
}

impl FontFace for TrueTypeFace {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure(&self, text: &str, size: f32) -> TextExtent {
        match self.ink_bounds(text, size) {
            Some(bounds) => TextExtent {
                width: (bounds.max.x - bounds.min.x).ceil().max(0.0) as u32,
                height: (bounds.max.y - bounds.min.y).ceil().max(0.0) as u32,
            },
            None => TextExtent::default(),
        }
    }

    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, origin: (i32, i32), color: Rgb<u8>) {
        for glyph in self.layout(text, size) {
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            let left = origin.0 + bounds.min.x as i32;
            let top = origin.1 + bounds.min.y as i32;
            outlined.draw(|x, y, coverage| {
                blend_pixel(canvas, left + x as i32, top + y as i32, color, coverage);
            });
        }
    }
}

// ── Built-in bitmap fallback ────────────────────────────────────────

/// Fixed-width 8×8 bitmap font scaled by whole pixels.
///
/// Glyphs outside basic Latin render as `?`.
#[derive(Debug, Clone, Copy)]
pub struct BitmapFace {
    /// Double-strike each glyph one pixel to the right.
    bold: bool,
}

impl BitmapFace {
    const REGULAR_NAME: &'static str = "builtin-8x8";
    const BOLD_NAME: &'static str = "builtin-8x8-bold";
    const CELL: u32 = 8;

    pub fn regular() -> Self {
        Self { bold: false }
    }

    pub fn bold() -> Self {
        Self { bold: true }
    }

    /// Integer scale factor for a requested pixel size.
    fn scale(size: f32) -> u32 {
        ((size / Self::CELL as f32).round() as u32).max(1)
    }

    fn glyph(c: char) -> [u8; 8] {
        BASIC_FONTS
            .get(c)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8])
    }
}

impl FontFace for BitmapFace {
    fn name(&self) -> &str {
        if self.bold {
            Self::BOLD_NAME
        } else {
            Self::REGULAR_NAME
        }
    }

    fn measure(&self, text: &str, size: f32) -> TextExtent {
        let count = text.chars().filter(|c| !c.is_control()).count() as u32;
        if count == 0 {
            return TextExtent::default();
        }
        let k = Self::scale(size);
        let has_ink = text.chars().any(|c| !c.is_whitespace());
        TextExtent {
            width: count * Self::CELL * k + u32::from(self.bold),
            height: if has_ink { Self::CELL * k } else { 0 },
        }
    }

    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, origin: (i32, i32), color: Rgb<u8>) {
        let k = Self::scale(size) as i32;
        let advance = Self::CELL as i32 * k;
        let strikes = if self.bold { 2 } else { 1 };

        for (index, c) in text.chars().filter(|c| !c.is_control()).enumerate() {
            let cell_x = origin.0 + index as i32 * advance;
            for (row, bits) in Self::glyph(c).iter().enumerate() {
                for col in 0..Self::CELL as i32 {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    for strike in 0..strikes {
                        let px = cell_x + col * k + strike;
                        let py = origin.1 + row as i32 * k;
                        for dy in 0..k {
                            for dx in 0..k {
                                blend_pixel(canvas, px + dx, py + dy, color, 1.0);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Blend `color` over the canvas pixel at (`x`, `y`). Out-of-bounds writes
/// are dropped.
pub(crate) fn blend_pixel(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in pixel.0.iter_mut().zip(color.0) {
        *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
    }
}

/// A TrueType face from the host, for tests that need real outlines.
#[cfg(test)]
pub(crate) fn system_face() -> Option<TrueTypeFace> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/Library/Fonts/Arial.ttf",
    ];
    CANDIDATES.iter().find_map(|path| {
        let bytes = std::fs::read(path).ok()?;
        TrueTypeFace::from_bytes(*path, bytes).ok()
    })
}
