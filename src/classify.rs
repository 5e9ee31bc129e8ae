//! Per-pixel region classification.
//!
//! Everything here is a pure function of the buffer and settings: running a
//! classifier twice on the same input yields the same [`Mask`]. Neighbourhood
//! sampling only visits in-bounds pixels, so image borders are never treated
//! as if they were padded with black.

use image::imageops;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::Deserialize;

use crate::buffer::{ensure_non_empty, Mask, PixelBuffer, Region};
use crate::color::{self, distance};
use crate::error::Result;

/// Pixels closer than this to any border count as edge pixels.
pub const EDGE_MARGIN: u32 = 5;

/// Corner squares are `min(width, height) * CORNER_FRACTION` on a side.
pub const CORNER_FRACTION: f32 = 0.1;

/// Half the side of the neighbourhood window used by [`is_background_color`].
const NEIGHBOURHOOD_RADIUS: i64 = 3;

/// Neighbours closer than this (Euclidean RGB) count as similar.
const SIMILARITY_DISTANCE: f32 = 30.0;

/// Share of similar neighbours needed to call a pixel background.
const SIMILARITY_RATIO: f32 = 0.6;

/// Brightness below which a pixel is considered dark for scratch detection.
const DARK_LEVEL: f32 = 60.0;

/// How a background mask is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ClassifyMode {
    /// Corner/neighbourhood heuristic.
    #[default]
    Auto,
    /// Distance to a key color.
    Color,
}

impl From<String> for ClassifyMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "color" | "colour" | "key" => Self::Color,
            _ => Self::Auto,
        }
    }
}

/// Settings for [`classify`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifySettings {
    /// Detection strategy.
    pub mode: ClassifyMode,
    /// Key color for [`ClassifyMode::Color`], `#RRGGBB`.
    pub key: String,
    /// Maximum Euclidean RGB distance to the key (inclusive).
    pub tolerance: f32,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            mode: ClassifyMode::Auto,
            key: "#FFFFFF".to_string(),
            tolerance: 30.0,
        }
    }
}

/// Which damage predicate a restoration pass scans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    /// Blown-out, crushed or strongly off-balance pixels.
    Damage,
    /// Dark pixels with a small color cast.
    Scratch,
    /// Pixels with a strong color cast.
    Stain,
}

/// Whether `(x, y)` lies within [`EDGE_MARGIN`] pixels of any border.
#[inline]
#[must_use]
pub fn is_edge_pixel(x: u32, y: u32, width: u32, height: u32) -> bool {
    x < EDGE_MARGIN
        || y < EDGE_MARGIN
        || x >= width.saturating_sub(EDGE_MARGIN)
        || y >= height.saturating_sub(EDGE_MARGIN)
}

/// Whether `(x, y)` lies inside one of the four corner squares.
#[inline]
#[must_use]
pub fn is_corner_pixel(x: u32, y: u32, width: u32, height: u32) -> bool {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let size = (width.min(height) as f32 * CORNER_FRACTION) as u32;
    let near_x = x < size || x >= width.saturating_sub(size);
    let near_y = y < size || y >= height.saturating_sub(size);
    size > 0 && near_x && near_y
}

/// Whether most of the 7x7 neighbourhood around `(x, y)` shares its color.
///
/// Only in-bounds neighbours are counted; the centre itself is excluded.
#[must_use]
pub fn is_background_color(buffer: &PixelBuffer, x: u32, y: u32) -> bool {
    let (width, height) = buffer.dimensions();
    let centre = buffer.get_pixel(x, y);
    let centre = [centre[0], centre[1], centre[2]];

    let mut similar = 0u32;
    let mut total = 0u32;
    for dy in -NEIGHBOURHOOD_RADIUS..=NEIGHBOURHOOD_RADIUS {
        for dx in -NEIGHBOURHOOD_RADIUS..=NEIGHBOURHOOD_RADIUS {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let p = buffer.get_pixel(nx as u32, ny as u32);
            total += 1;
            if distance(centre, [p[0], p[1], p[2]]) < SIMILARITY_DISTANCE {
                similar += 1;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = if total == 0 {
        0.0
    } else {
        similar as f32 / total as f32
    };
    ratio > SIMILARITY_RATIO
}

/// Heuristic background mask.
///
/// A pixel is background when it is not an edge pixel and is either inside a
/// corner square or surrounded by similar colors.
#[must_use]
pub fn detect_background_auto(buffer: &PixelBuffer) -> Mask {
    let (width, height) = buffer.dimensions();
    Mask::from_fn(width, height, |x, y| {
        if is_edge_pixel(x, y, width, height) {
            return false;
        }
        is_corner_pixel(x, y, width, height) || is_background_color(buffer, x, y)
    })
}

/// Pixels within `tolerance` (inclusive) of `key`.
#[must_use]
pub fn detect_color_key(buffer: &PixelBuffer, key: image::Rgb<u8>, tolerance: f32) -> Mask {
    let (width, height) = buffer.dimensions();
    let key = key.0;
    Mask::from_fn(width, height, |x, y| {
        let p = buffer.get_pixel(x, y);
        distance([p[0], p[1], p[2]], key) <= tolerance
    })
}

/// Produce a background mask for `buffer`.
///
/// An unparseable key color falls back to white.
///
/// # Errors
///
/// Returns [`crate::Error::EmptyImage`] for a zero-area buffer.
pub fn classify(buffer: &PixelBuffer, settings: &ClassifySettings) -> Result<Mask> {
    ensure_non_empty(buffer)?;
    let mask = match settings.mode {
        ClassifyMode::Auto => detect_background_auto(buffer),
        ClassifyMode::Color => {
            let key = color::parse_hex_or(&settings.key, color::WHITE);
            detect_color_key(buffer, key, settings.tolerance)
        }
    };
    tracing::debug!(
        mode = ?settings.mode,
        members = mask.count(),
        total = mask.len(),
        "classified background"
    );
    Ok(mask)
}

#[inline]
fn brightness(r: u8, g: u8, b: u8) -> f32 {
    (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0
}

/// Generic damage: crushed or blown-out, or with a channel imbalance above 50.
#[inline]
#[must_use]
pub fn is_damaged(r: u8, g: u8, b: u8) -> bool {
    let level = brightness(r, g, b);
    level < 10.0 || level > 245.0 || r.abs_diff(g) > 50 || g.abs_diff(b) > 50
}

/// Scratch: a dark pixel whose channels differ by more than 5.
#[inline]
#[must_use]
pub fn is_scratch(r: u8, g: u8, b: u8) -> bool {
    brightness(r, g, b) < DARK_LEVEL && (r.abs_diff(g) > 5 || g.abs_diff(b) > 5)
}

/// Stain: a channel imbalance above 30.
#[inline]
#[must_use]
pub fn is_stain(r: u8, g: u8, b: u8) -> bool {
    r.abs_diff(g) > 30 || g.abs_diff(b) > 30
}

/// Scan the whole buffer with one damage predicate.
#[must_use]
pub fn damage_mask(buffer: &PixelBuffer, kind: DamageKind) -> Mask {
    let predicate: fn(u8, u8, u8) -> bool = match kind {
        DamageKind::Damage => is_damaged,
        DamageKind::Scratch => is_scratch,
        DamageKind::Stain => is_stain,
    };
    let (width, height) = buffer.dimensions();
    Mask::from_fn(width, height, |x, y| {
        let p = buffer.get_pixel(x, y);
        predicate(p[0], p[1], p[2])
    })
}

fn region_gray(buffer: &PixelBuffer, region: &Region) -> Option<image::GrayImage> {
    let (width, height) = buffer.dimensions();
    let r = region.clipped_to(width, height)?;
    let cropped = imageops::crop_imm(buffer, r.x, r.y, r.width, r.height).to_image();
    Some(imageops::grayscale(&cropped))
}

/// Mean Sobel gradient magnitude inside `region`, normalized to `[0, 1]`.
///
/// Returns `0.0` when the region lies outside the buffer.
#[must_use]
pub fn edge_strength(buffer: &PixelBuffer, region: &Region) -> f32 {
    let Some(gray) = region_gray(buffer, region) else {
        return 0.0;
    };
    let gx = horizontal_sobel(&gray);
    let gy = vertical_sobel(&gray);

    let mut sum = 0.0_f64;
    for (a, b) in gx.pixels().zip(gy.pixels()) {
        let (sx, sy) = (f64::from(a[0]), f64::from(b[0]));
        sum += (sx * sx + sy * sy).sqrt().min(255.0) / 255.0;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mean = (sum / (gray.width() as f64 * gray.height() as f64)) as f32;
    mean
}

/// Standard deviation of gray values inside `region`, normalized to `[0, 1]`.
#[must_use]
pub fn texture_score(buffer: &PixelBuffer, region: &Region) -> f32 {
    let Some(gray) = region_gray(buffer, region) else {
        return 0.0;
    };
    #[allow(clippy::cast_precision_loss)]
    let n = gray.as_raw().len() as f64;
    let mean = gray.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = gray
        .as_raw()
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;

    #[allow(clippy::cast_possible_truncation)]
    let score = (variance.sqrt() / 127.5).min(1.0) as f32;
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    fn uniform(width: u32, height: u32, value: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_pixel(width, height, Rgba(value))
    }

    fn noise(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn edge_and_corner_geometry() {
        assert!(is_edge_pixel(4, 50, 100, 100));
        assert!(is_edge_pixel(50, 95, 100, 100));
        assert!(!is_edge_pixel(5, 94, 100, 100));

        assert!(is_corner_pixel(9, 9, 100, 100));
        assert!(is_corner_pixel(95, 2, 100, 100));
        assert!(!is_corner_pixel(10, 9, 100, 100));
        assert!(!is_corner_pixel(50, 2, 100, 100));
        assert!(!is_corner_pixel(0, 0, 5, 5));
    }

    #[test]
    fn background_color_ignores_out_of_bounds() {
        let buf = uniform(10, 10, [40, 40, 40, 255]);
        assert!(is_background_color(&buf, 0, 0));
        assert!(is_background_color(&buf, 5, 5));
        assert!(!is_background_color(&noise(10, 10), 5, 5));
    }

    #[test]
    fn auto_mask_excludes_edges() {
        let buf = uniform(30, 20, [200, 210, 220, 255]);
        let mask = detect_background_auto(&buf);
        assert!(!mask.contains(0, 0));
        assert!(!mask.contains(29, 10));
        assert!(mask.contains(10, 10));
        assert_eq!(mask.count(), 20 * 10);
    }

    #[test]
    fn corner_squares_count_as_background() {
        let buf = noise(100, 100);
        let mask = detect_background_auto(&buf);
        assert!(mask.contains(7, 7));
        assert!(!mask.contains(50, 50));
    }

    #[test]
    fn color_key_boundary_is_inclusive() {
        let mut buf = uniform(3, 1, [245, 255, 255, 255]);
        buf.put_pixel(1, 0, Rgba([244, 255, 255, 255]));
        let mask = detect_color_key(&buf, Rgb([255, 255, 255]), 10.0);
        assert!(mask.contains(0, 0));
        assert!(!mask.contains(1, 0));
    }

    #[test]
    fn classify_is_idempotent() {
        let buf = PixelBuffer::from_fn(24, 24, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let v = ((x * 7 + y * 3) % 256) as u8;
            Rgba([v, v / 2, 255 - v, 255])
        });
        for settings in [
            ClassifySettings::default(),
            ClassifySettings {
                mode: ClassifyMode::Color,
                key: "#7F3F80".to_string(),
                tolerance: 40.0,
            },
        ] {
            let first = classify(&buf, &settings).unwrap();
            let second = classify(&buf, &settings).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn classify_rejects_empty_buffer() {
        assert!(classify(&PixelBuffer::new(0, 0), &ClassifySettings::default()).is_err());
    }

    #[test]
    fn invalid_key_falls_back_to_white() {
        let buf = uniform(2, 2, [255, 255, 255, 255]);
        let settings = ClassifySettings {
            mode: ClassifyMode::Color,
            key: "not-a-color".to_string(),
            tolerance: 0.0,
        };
        assert_eq!(classify(&buf, &settings).unwrap().count(), 4);
    }

    #[test]
    fn damage_predicates() {
        assert!(is_damaged(5, 5, 5));
        assert!(is_damaged(250, 250, 250));
        assert!(is_damaged(200, 100, 100));
        assert!(!is_damaged(120, 110, 100));

        assert!(is_scratch(30, 20, 20));
        assert!(!is_scratch(30, 30, 30));
        assert!(!is_scratch(200, 180, 180));

        assert!(is_stain(150, 100, 100));
        assert!(!is_stain(120, 110, 100));

        let mut buf = uniform(4, 4, [120, 110, 100, 255]);
        buf.put_pixel(2, 2, Rgba([150, 100, 100, 255]));
        assert_eq!(damage_mask(&buf, DamageKind::Stain).count(), 1);
        assert_eq!(damage_mask(&buf, DamageKind::Damage).count(), 0);
    }

    #[test]
    fn region_scores() {
        let flat = uniform(20, 20, [90, 90, 90, 255]);
        let region = Region::new(2, 2, 10, 10);
        assert!(edge_strength(&flat, &region).abs() < 1e-6);
        assert!(texture_score(&flat, &region).abs() < 1e-6);

        let busy = PixelBuffer::from_fn(20, 20, |x, _| {
            if (x / 2) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        assert!(edge_strength(&busy, &region) > 0.3);
        assert!(texture_score(&busy, &region) > 0.9);

        assert_eq!(edge_strength(&busy, &Region::new(50, 50, 4, 4)), 0.0);
    }
}
