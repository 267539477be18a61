//! Card renderer — lays out a flagged message as a fixed-width PNG.
//!
//! Layout, top to bottom inside the padding:
//! - circular avatar at the content origin
//! - author label (bold) right of the avatar, timestamp below it
//! - one body line per line break, no wrapping
//!
//! Height is computed: `2 * padding + max(avatar, header + body)`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};

use crate::error::RenderError;

use super::font::{FontFace, FontSet, blend_pixel};
use super::model::{Card, RenderedImage};

/// strftime pattern for the header timestamp, e.g. `Mar 05, 2024 09:41 PM`.
pub const TIMESTAMP_FORMAT: &str = "%b %d, %Y %I:%M %p";

/// Reference text used to size blank body lines.
const REFERENCE_LINE: &str = "Hg";

/// Visual parameters of the card template.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub padding: u32,
    pub avatar_size: u32,
    /// Horizontal gap between avatar and text.
    pub avatar_gap: u32,
    /// Added below every body line.
    pub line_spacing: u32,
    pub name_size: f32,
    pub body_size: f32,
    pub time_size: f32,
    /// Vertical gap between author label and timestamp.
    pub name_time_gap: u32,
    /// Vertical gap between timestamp and the first body line.
    pub header_body_gap: u32,
    pub background: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub time_color: Rgb<u8>,
    pub shadow_color: Rgb<u8>,
    pub timezone: Tz,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            padding: 20,
            avatar_size: 48,
            avatar_gap: 10,
            line_spacing: 6,
            name_size: 20.0,
            body_size: 18.0,
            time_size: 14.0,
            name_time_gap: 2,
            header_body_gap: 5,
            background: Rgb([0x36, 0x39, 0x3F]),
            text_color: Rgb([0xFF, 0xFF, 0xFF]),
            time_color: Rgb([0xB9, 0xBB, 0xBE]),
            shadow_color: Rgb([0x00, 0x00, 0x00]),
            timezone: chrono_tz::America::Los_Angeles,
        }
    }
}

/// Computed positions for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    pub width: u32,
    pub height: u32,
    /// Left edge of all text.
    pub text_x: u32,
    pub name_y: u32,
    pub time_y: u32,
    pub header_height: u32,
    pub body_height: u32,
    /// Top of each body line.
    pub line_tops: Vec<u32>,
}

/// Renders [`Card`]s with a fixed template and font set.
pub struct CardRenderer {
    config: RenderConfig,
    fonts: FontSet,
}

impl CardRenderer {
    pub fn new(config: RenderConfig, fonts: FontSet) -> Self {
        Self { config, fonts }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Timestamp as shown on the card, in the configured zone.
    pub fn format_timestamp(&self, timestamp: DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.config.timezone)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Compute the card geometry without drawing anything.
    pub fn layout(&self, card: &Card) -> CardLayout {
        let cfg = &self.config;
        let label = card.label();
        let timestamp = self.format_timestamp(card.timestamp);

        let name_height = self.fonts.bold.measure(&label, cfg.name_size).height;
        let time_height = self.fonts.regular.measure(&timestamp, cfg.time_size).height;
        let header_height = name_height + cfg.name_time_gap + time_height + cfg.header_body_gap;

        let reference_height = self
            .fonts
            .regular
            .measure(REFERENCE_LINE, cfg.body_size)
            .height;

        let body_top = cfg.padding + header_height;
        let mut line_tops = Vec::with_capacity(card.body.len());
        let mut body_height = 0u32;
        for line in &card.body {
            line_tops.push(body_top + body_height);
            let measured = self.fonts.regular.measure(line, cfg.body_size).height;
            let line_height = if measured == 0 {
                reference_height
            } else {
                measured
            };
            body_height += line_height + cfg.line_spacing;
        }

        let content_height = cfg.avatar_size.max(header_height + body_height);

        CardLayout {
            width: cfg.width,
            height: 2 * cfg.padding + content_height,
            text_x: cfg.padding + cfg.avatar_size + cfg.avatar_gap,
            name_y: cfg.padding,
            time_y: cfg.padding + name_height + cfg.name_time_gap,
            header_height,
            body_height,
            line_tops,
        }
    }

    /// Render `card` to PNG.
    ///
    /// Fails with [`RenderError::Decode`] when the avatar is not a valid
    /// image and [`RenderError::Encode`] when the PNG cannot be written.
    pub fn render(&self, card: &Card) -> Result<RenderedImage, RenderError> {
        let cfg = &self.config;
        let avatar = image::load_from_memory(&card.avatar)
            .map_err(|e| RenderError::Decode(e.to_string()))?;
        let mut avatar = imageops::resize(
            &avatar.to_rgba8(),
            cfg.avatar_size,
            cfg.avatar_size,
            FilterType::Triangle,
        );
        mask_circle(&mut avatar);

        let layout = self.layout(card);
        let mut canvas = RgbImage::from_pixel(layout.width, layout.height, cfg.background);
        composite(&mut canvas, &avatar, cfg.padding, cfg.padding);

        let x = layout.text_x as i32;
        self.draw_shadowed(
            &mut canvas,
            self.fonts.bold.as_ref(),
            &card.label(),
            cfg.name_size,
            (x, layout.name_y as i32),
            cfg.text_color,
        );
        self.draw_shadowed(
            &mut canvas,
            self.fonts.regular.as_ref(),
            &self.format_timestamp(card.timestamp),
            cfg.time_size,
            (x, layout.time_y as i32),
            cfg.time_color,
        );
        for (line, top) in card.body.iter().zip(&layout.line_tops) {
            self.draw_shadowed(
                &mut canvas,
                self.fonts.regular.as_ref(),
                line,
                cfg.body_size,
                (x, *top as i32),
                cfg.text_color,
            );
        }

        let bytes = encode_png(&canvas)?;
        Ok(RenderedImage {
            bytes,
            width: layout.width,
            height: layout.height,
        })
    }

    /// Draw text with a one-pixel drop shadow down and to the right.
    fn draw_shadowed(
        &self,
        canvas: &mut RgbImage,
        face: &dyn FontFace,
        text: &str,
        size: f32,
        origin: (i32, i32),
        color: Rgb<u8>,
    ) {
        face.draw(
            canvas,
            text,
            size,
            (origin.0 + 1, origin.1 + 1),
            self.config.shadow_color,
        );
        face.draw(canvas, text, size, origin, color);
    }
}

/// Zero the alpha of every pixel outside the inscribed circle.
fn mask_circle(image: &mut RgbaImage) {
    let (w, h) = image.dimensions();
    let radius = w.min(h) as f32 / 2.0;
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if dx * dx + dy * dy > radius * radius {
            pixel.0[3] = 0;
        }
    }
}

/// Alpha-composite `overlay` onto `canvas` at (`left`, `top`).
fn composite(canvas: &mut RgbImage, overlay: &RgbaImage, left: u32, top: u32) {
    for (x, y, pixel) in overlay.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        blend_pixel(
            canvas,
            (left + x) as i32,
            (top + y) as i32,
            Rgb([r, g, b]),
            a as f32 / 255.0,
        );
    }
}

fn encode_png(canvas: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use image::{ImageFormat, Rgba};

    use super::*;

    fn avatar_png(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(64, 64, Rgba(color));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn renderer() -> CardRenderer {
        CardRenderer::new(RenderConfig::default(), FontSet::builtin())
    }

    fn card(content: &str) -> Card {
        let ts = Utc.with_ymd_and_hms(2024, 3, 6, 5, 41, 0).unwrap();
        Card::new("alice", "0420", avatar_png([200, 30, 30, 255]), ts, content)
    }

    #[test]
    fn timestamp_uses_configured_zone() {
        // 05:41 UTC on Mar 6 is 9:41 PM Pacific on Mar 5.
        let r = renderer();
        assert_eq!(r.format_timestamp(card("x").timestamp), "Mar 05, 2024 09:41 PM");
    }

    #[test]
    fn height_follows_layout_formula() {
        let r = renderer();
        let layout = r.layout(&card("hello\nworld"));
        let cfg = r.config();
        assert_eq!(layout.width, 800);
        assert_eq!(
            layout.height,
            2 * cfg.padding + cfg.avatar_size.max(layout.header_height + layout.body_height)
        );
        assert_eq!(layout.line_tops.len(), 2);
        assert!(layout.line_tops[1] > layout.line_tops[0]);
    }

    #[test]
    fn more_lines_make_a_taller_card() {
        let r = renderer();
        let one = r.render(&card("one")).unwrap();
        let five = r.render(&card("one\ntwo\nthree\nfour\nfive")).unwrap();
        assert!(one.height < five.height);
        assert_eq!(one.width, five.width);
    }

    #[test]
    fn blank_lines_still_advance() {
        let r = renderer();
        let with_blank = r.layout(&card("top\n\nbottom"));
        let without = r.layout(&card("top\nbottom"));
        assert!(with_blank.body_height > without.body_height);
    }

    #[test]
    fn empty_body_is_at_least_avatar_tall() {
        let r = renderer();
        let layout = r.layout(&card(""));
        assert!(layout.height >= 2 * r.config().padding + r.config().avatar_size);
        assert_eq!(layout.body_height, 0);
    }

    #[test]
    fn render_is_deterministic() {
        let r = renderer();
        let c = card("same input\nsame output");
        let a = r.render(&c).unwrap();
        let b = r.render(&c).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn output_is_png_with_reported_dimensions() {
        let r = renderer();
        let out = r.render(&card("hello")).unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.width(), out.width);
        assert_eq!(decoded.height(), out.height);
        assert_eq!(out.mime_type(), "image/png");
    }

    #[test]
    fn avatar_is_circular() {
        let r = renderer();
        let out = r.render(&card("hello")).unwrap();
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        let cfg = r.config();
        let p = cfg.padding;
        let s = cfg.avatar_size;
        // Corner of the avatar box is outside the circle: background shows.
        assert_eq!(*img.get_pixel(p, p), cfg.background);
        // Centre is avatar red.
        let centre = img.get_pixel(p + s / 2, p + s / 2);
        assert!(centre.0[0] > 150 && centre.0[1] < 80);
    }

    #[test]
    fn text_pixels_are_drawn() {
        let r = renderer();
        let out = r.render(&card("hello")).unwrap();
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        assert!(img.pixels().any(|p| p.0 == [255, 255, 255]));
        assert!(img.pixels().any(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn undecodable_avatar_is_a_decode_error() {
        let r = renderer();
        let mut c = card("hello");
        c.avatar = b"definitely not an image".to_vec();
        assert!(matches!(r.render(&c), Err(RenderError::Decode(_))));
    }

    #[test]
    fn long_lines_do_not_wrap() {
        let r = renderer();
        let long = "x".repeat(400);
        let layout = r.layout(&card(&long));
        assert_eq!(layout.line_tops.len(), 1);
        let out = r.render(&card(&long)).unwrap();
        assert_eq!(out.width, 800);
    }

    #[test]
    fn truetype_cards_grow_with_lines_and_repeat_exactly() {
        let Some(face) = crate::cards::font::system_face() else {
            return;
        };
        let face: Arc<dyn FontFace> = Arc::new(face);
        let r = CardRenderer::new(
            RenderConfig::default(),
            FontSet {
                regular: Arc::clone(&face),
                bold: face,
            },
        );

        let one = r.render(&card("kill")).unwrap();
        let five = r.render(&card("kill\ntwo\nthree\nfour\nfive")).unwrap();
        assert_eq!(one.width, 800);
        assert!(one.height < five.height);
        assert_eq!(r.render(&card("kill")).unwrap().bytes, one.bytes);
    }
}
