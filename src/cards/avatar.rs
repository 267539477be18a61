//! Placeholder avatars for authors without a profile photo.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::error::RenderError;

/// Side length of generated placeholders.
const PLACEHOLDER_SIZE: u32 = 128;

/// Background palette, picked by hashing the seed.
const PALETTE: [[u8; 3]; 5] = [
    [0x58, 0x65, 0xF2],
    [0x75, 0x7E, 0x8A],
    [0x3B, 0xA5, 0x5C],
    [0xFA, 0xA6, 0x1A],
    [0xED, 0x42, 0x45],
];

/// A solid-colour PNG chosen deterministically from `seed` (usually the
/// author id), so the same author always gets the same placeholder.
pub fn placeholder_avatar(seed: &str) -> Result<Vec<u8>, RenderError> {
    let color = PALETTE[(fnv1a(seed.as_bytes()) % PALETTE.len() as u64) as usize];
    let img = RgbImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, Rgb(color));

    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01B3)
    })
}
