//! Pixel buffers, per-pixel masks and rectangular regions.
//!
//! Every transform in this crate works on a [`PixelBuffer`]: a row-major,
//! top-left-origin RGBA image with one byte per channel. Masks produced by
//! classification index pixels the same way, so `mask[i]` describes pixel
//! `(i % width, i / width)`.

use image::RgbaImage;
use serde::Deserialize;

use crate::error::{Error, Result};

/// An RGBA8 image buffer of exactly `width * height * 4` bytes.
pub type PixelBuffer = RgbaImage;

/// Membership threshold for soft mask values.
const MASK_THRESHOLD: f32 = 0.5;

/// Build a [`PixelBuffer`] from raw interleaved RGBA bytes.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for a zero-area image and
/// [`Error::BufferLength`] when `data` is not `width * height * 4` bytes long.
pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<PixelBuffer> {
    ensure_dimensions(width, height)?;
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        return Err(Error::BufferLength {
            width,
            height,
            expected,
            actual: data.len(),
        });
    }
    RgbaImage::from_raw(width, height, data).ok_or(Error::BufferLength {
        width,
        height,
        expected,
        actual: 0,
    })
}

/// Reject zero-area dimensions.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] when either dimension is zero.
pub fn ensure_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    Ok(())
}

/// Reject a zero-area buffer.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] when the buffer has no pixels.
pub fn ensure_non_empty(buffer: &PixelBuffer) -> Result<()> {
    ensure_dimensions(buffer.width(), buffer.height())
}

/// Round and clamp a float channel value into a byte.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_channel(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// A per-pixel membership map with soft values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Mask {
    /// An empty (all zero) mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    /// Build a hard mask from a predicate over pixel coordinates.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(if f(x, y) { 1.0 } else { 0.0 });
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    /// Build a soft mask from a coverage function; values are clamped to `[0, 1]`.
    pub fn from_coverage(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y).clamp(0.0, 1.0));
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of entries (`width * height`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the mask has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Soft value at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.values[self.index(x, y)]
    }

    /// Whether pixel `(x, y)` is a member (value ≥ 0.5).
    #[inline]
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.value(x, y) >= MASK_THRESHOLD
    }

    /// Set the soft value at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = self.index(x, y);
        self.values[idx] = value.clamp(0.0, 1.0);
    }

    /// Raw values in row-major order.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of member pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.iter().filter(|&&v| v >= MASK_THRESHOLD).count()
    }

    /// Swap members and non-members.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            values: self.values.iter().map(|v| 1.0 - v).collect(),
        }
    }

    /// Per-pixel maximum of two masks of equal size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] when the masks differ in size.
    pub fn union(&self, other: &Self) -> Result<Self> {
        if self.dimensions() != other.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a.max(*b))
                .collect(),
        })
    }

    /// Check that this mask describes `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] when the sizes differ.
    pub fn ensure_matches(&self, buffer: &PixelBuffer) -> Result<()> {
        if self.dimensions() != buffer.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: buffer.dimensions(),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }
}

/// A rectangle in pixel coordinates, optionally carrying a detection confidence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Detection confidence in `[0, 1]`, when produced by a heuristic.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Region {
    /// A region without confidence.
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: None,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Pixel count.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether `(x, y)` lies inside.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersect with a `width x height` image; `None` if nothing remains.
    #[must_use]
    pub fn clipped_to(&self, width: u32, height: u32) -> Option<Self> {
        let x2 = self.right().min(width);
        let y2 = self.bottom().min(height);
        if self.x >= x2 || self.y >= y2 {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: x2 - self.x,
            height: y2 - self.y,
            confidence: self.confidence,
        })
    }

    /// Grow by `padding` on every side, clipped to the image.
    #[must_use]
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Self {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let x2 = self.right().saturating_add(padding).min(width);
        let y2 = self.bottom().saturating_add(padding).min(height);
        Self {
            x,
            y,
            width: x2.saturating_sub(x),
            height: y2.saturating_sub(y),
            confidence: self.confidence,
        }
    }

    /// Attach a confidence score.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_wrong_length() {
        let err = from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferLength {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn from_raw_rejects_zero_area() {
        assert!(matches!(
            from_raw(0, 4, Vec::new()),
            Err(Error::EmptyImage { .. })
        ));
    }

    #[test]
    fn from_raw_accepts_exact_length() {
        let buf = from_raw(3, 2, vec![7; 24]).unwrap();
        assert_eq!(buf.dimensions(), (3, 2));
        assert_eq!(buf.get_pixel(2, 1).0, [7, 7, 7, 7]);
    }

    #[test]
    fn clamp_channel_rounds_and_saturates() {
        assert_eq!(clamp_channel(-3.0), 0);
        assert_eq!(clamp_channel(12.5), 13);
        assert_eq!(clamp_channel(254.4), 254);
        assert_eq!(clamp_channel(999.0), 255);
        assert_eq!(clamp_channel(f32::NAN), 0);
    }

    #[test]
    fn mask_index_is_row_major() {
        let mask = Mask::from_fn(4, 3, |x, y| x == 1 && y == 2);
        assert_eq!(mask.len(), 12);
        assert_eq!(mask.values()[2 * 4 + 1], 1.0);
        assert!(mask.contains(1, 2));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn mask_inverted_and_union() {
        let a = Mask::from_fn(2, 2, |x, _| x == 0);
        let b = Mask::from_fn(2, 2, |_, y| y == 0);
        let u = a.union(&b).unwrap();
        assert_eq!(u.count(), 3);
        assert_eq!(a.inverted().count(), 2);
        assert!(a.union(&Mask::new(3, 3)).is_err());
    }

    #[test]
    fn region_clipping_and_padding() {
        let r = Region::new(8, 8, 10, 10);
        let clipped = r.clipped_to(12, 20).unwrap();
        assert_eq!((clipped.width, clipped.height), (4, 10));
        assert!(Region::new(30, 0, 5, 5).clipped_to(20, 20).is_none());

        let padded = Region::new(2, 2, 4, 4).padded(5, 10, 10);
        assert_eq!((padded.x, padded.y, padded.width, padded.height), (0, 0, 10, 10));
        assert!(r.contains(8, 17));
        assert!(!r.contains(18, 8));
    }
}
