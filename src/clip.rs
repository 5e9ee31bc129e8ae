//! Geometric clipping (rounded rectangles and ellipses), cropping and icon
//! generation.
//!
//! Corners are quadratic curves: in corner-local coordinates `(u, v)`, measured
//! from the corner along its two edges, the curve is
//! `sqrt(u / r) + sqrt(v / r) = 1`, the same shape a quadratic Bezier with its
//! control point on the corner produces. Coverage is estimated with 4x4
//! supersampling so edges come out antialiased.

use image::Rgba;
use serde::Deserialize;

use crate::buffer::{clamp_channel, ensure_dimensions, ensure_non_empty, Mask, PixelBuffer, Region};
use crate::color::{self, composite_over, with_alpha};
use crate::error::{Error, Result};
use crate::resample::{resample, Algorithm};

/// Samples per axis when estimating pixel coverage.
const SUPERSAMPLE: u32 = 4;

/// Independent radius per corner, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CornerRadii {
    /// Top-left radius.
    pub top_left: f32,
    /// Top-right radius.
    pub top_right: f32,
    /// Bottom-right radius.
    pub bottom_right: f32,
    /// Bottom-left radius.
    pub bottom_left: f32,
}

impl CornerRadii {
    /// The same radius on every corner.
    #[must_use]
    pub fn uniform(radius: f32) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_right: radius,
            bottom_left: radius,
        }
    }

    fn as_array(self) -> [f32; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }
}

/// Clip outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipShape {
    /// Rectangle with rounded corners.
    RoundedRect(CornerRadii),
    /// Ellipse inscribed in the image (a circle for square images).
    Ellipse,
}

/// A shape resolved against a concrete rectangle.
#[derive(Debug, Clone, Copy)]
struct Outline {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    /// `None` for an ellipse, otherwise `[tl, tr, br, bl]`.
    radii: Option<[f32; 4]>,
}

impl Outline {
    fn new(shape: ClipShape, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let half_min = (right - left).min(bottom - top).max(0.0) / 2.0;
        let radii = match shape {
            ClipShape::Ellipse => None,
            ClipShape::RoundedRect(radii) => {
                let radii = radii.as_array();
                if half_min > 0.0 && radii.iter().all(|&r| r >= half_min) {
                    None
                } else {
                    Some(radii.map(|r| r.clamp(0.0, half_min)))
                }
            }
        };
        Self {
            left,
            top,
            right,
            bottom,
            radii,
        }
    }

    fn contains(&self, px: f32, py: f32) -> bool {
        if px < self.left || px > self.right || py < self.top || py > self.bottom {
            return false;
        }
        let Some([tl, tr, br, bl]) = self.radii else {
            let (a, b) = ((self.right - self.left) / 2.0, (self.bottom - self.top) / 2.0);
            if a <= 0.0 || b <= 0.0 {
                return false;
            }
            let dx = (px - (self.left + a)) / a;
            let dy = (py - (self.top + b)) / b;
            return dx * dx + dy * dy <= 1.0;
        };

        let from_left = px - self.left;
        let from_right = self.right - px;
        let from_top = py - self.top;
        let from_bottom = self.bottom - py;

        let corner = if from_left < tl && from_top < tl {
            Some((from_left, from_top, tl))
        } else if from_right < tr && from_top < tr {
            Some((from_right, from_top, tr))
        } else if from_right < br && from_bottom < br {
            Some((from_right, from_bottom, br))
        } else if from_left < bl && from_bottom < bl {
            Some((from_left, from_bottom, bl))
        } else {
            None
        };

        match corner {
            Some((u, v, r)) => (u / r).sqrt() + (v / r).sqrt() >= 1.0,
            None => true,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn coverage(&self, x: u32, y: u32) -> f32 {
        let mut hits = 0u32;
        for sy in 0..SUPERSAMPLE {
            for sx in 0..SUPERSAMPLE {
                let px = x as f32 + (sx as f32 + 0.5) / SUPERSAMPLE as f32;
                let py = y as f32 + (sy as f32 + 0.5) / SUPERSAMPLE as f32;
                if self.contains(px, py) {
                    hits += 1;
                }
            }
        }
        hits as f32 / (SUPERSAMPLE * SUPERSAMPLE) as f32
    }
}

#[allow(clippy::cast_precision_loss)]
fn full_outline(shape: ClipShape, width: u32, height: u32) -> Outline {
    Outline::new(shape, 0.0, 0.0, width as f32, height as f32)
}

/// Antialiased coverage of `shape` over a `width x height` grid.
#[must_use]
pub fn coverage_mask(shape: ClipShape, width: u32, height: u32) -> Mask {
    let outline = full_outline(shape, width, height);
    Mask::from_coverage(width, height, |x, y| outline.coverage(x, y))
}

/// Clip `buffer` to `shape`; pixels outside become transparent.
///
/// With a `background`, the image is first composited over that color, so the
/// fill appears only inside the shape.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for a zero-area buffer.
pub fn clip(
    buffer: &mut PixelBuffer,
    shape: ClipShape,
    background: Option<image::Rgb<u8>>,
) -> Result<()> {
    ensure_non_empty(buffer)?;
    let (width, height) = buffer.dimensions();
    let coverage = coverage_mask(shape, width, height);
    let fill = background.map(|bg| with_alpha(bg, 255));

    for (x, y, px) in buffer.enumerate_pixels_mut() {
        if let Some(fill) = fill {
            *px = composite_over(fill, *px, 1.0);
        }
        let cov = coverage.value(x, y);
        if cov < 1.0 {
            px[3] = clamp_channel(f32::from(px[3]) * cov);
        }
    }
    Ok(())
}

/// Settings for [`round_corners`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundCornersSettings {
    /// Radius applied to every corner.
    pub radius: f32,
    /// Per-corner radii; overrides `radius` when present.
    pub corners: Option<CornerRadii>,
    /// Fill behind the image, `#RRGGBB`; transparent when absent.
    pub background: Option<String>,
}

/// Round the corners of `buffer` in place.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for a zero-area buffer.
pub fn round_corners(buffer: &mut PixelBuffer, settings: &RoundCornersSettings) -> Result<()> {
    let radii = settings
        .corners
        .unwrap_or_else(|| CornerRadii::uniform(settings.radius));
    let background = settings
        .background
        .as_deref()
        .map(|hex| color::parse_hex_or(hex, color::WHITE));
    clip(buffer, ClipShape::RoundedRect(radii), background)
}

/// Copy out a rectangle.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the region is empty or reaches past
/// the buffer.
pub fn crop(buffer: &PixelBuffer, region: &Region) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    let (width, height) = buffer.dimensions();
    if region.width == 0 || region.height == 0 || region.right() > width || region.bottom() > height
    {
        return Err(Error::InvalidParameter(format!(
            "crop {}x{}+{}+{} is outside the {width}x{height} image",
            region.width, region.height, region.x, region.y
        )));
    }
    Ok(
        image::imageops::crop_imm(buffer, region.x, region.y, region.width, region.height)
            .to_image(),
    )
}

/// Largest centred crop with the aspect ratio `ratio_w : ratio_h`.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a zero ratio term.
pub fn crop_to_aspect(buffer: &PixelBuffer, ratio_w: u32, ratio_h: u32) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    if ratio_w == 0 || ratio_h == 0 {
        return Err(Error::InvalidParameter("aspect ratio terms must be positive".to_string()));
    }
    let (width, height) = buffer.dimensions();
    let (w, h) = (u64::from(width), u64::from(height));
    let (rw, rh) = (u64::from(ratio_w), u64::from(ratio_h));

    // Widest crop that fits: either full width or full height.
    let (cw, ch) = if w * rh <= h * rw {
        (w, (w * rh / rw).max(1))
    } else {
        ((h * rw / rh).max(1), h)
    };
    #[allow(clippy::cast_possible_truncation)]
    let region = Region::new(
        ((w - cw) / 2) as u32,
        ((h - ch) / 2) as u32,
        cw as u32,
        ch as u32,
    );
    crop(buffer, &region)
}

/// Icon outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum IconShape {
    /// Plain square.
    Square,
    /// Square with rounded corners.
    #[default]
    Rounded,
    /// Circle.
    Circle,
}

impl From<String> for IconShape {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "square" => Self::Square,
            "circle" => Self::Circle,
            _ => Self::Rounded,
        }
    }
}

/// Settings for [`generate_icon`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconSettings {
    /// Edge length of the square icon.
    pub size: u32,
    /// Empty space between the image and the icon edge, in pixels.
    pub padding: u32,
    /// Outline.
    pub shape: IconShape,
    /// Corner radius for [`IconShape::Rounded`], as a fraction of `size`.
    pub corner_radius: f32,
    /// Fill behind the image, `#RRGGBB`; transparent when absent.
    pub background: Option<String>,
    /// Border ring width in pixels, drawn inside the outline.
    pub border_width: u32,
    /// Border color, `#RRGGBB`.
    pub border_color: String,
}

impl Default for IconSettings {
    fn default() -> Self {
        Self {
            size: 256,
            padding: 0,
            shape: IconShape::Rounded,
            corner_radius: 0.2,
            background: None,
            border_width: 0,
            border_color: "#FFFFFF".to_string(),
        }
    }
}

impl IconSettings {
    #[allow(clippy::cast_precision_loss)]
    fn clip_shape(&self, size: u32) -> ClipShape {
        match self.shape {
            IconShape::Square => ClipShape::RoundedRect(CornerRadii::default()),
            IconShape::Rounded => {
                ClipShape::RoundedRect(CornerRadii::uniform(size as f32 * self.corner_radius))
            }
            IconShape::Circle => ClipShape::Ellipse,
        }
    }
}

/// Fit `buffer` into a square icon with padding, outline and border ring.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the padding leaves no room for the
/// image, or [`Error::EmptyImage`] for a zero size.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_icon(buffer: &PixelBuffer, settings: &IconSettings) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    let size = settings.size;
    ensure_dimensions(size, size)?;
    let inner = size.saturating_sub(settings.padding.saturating_mul(2));
    if inner == 0 {
        return Err(Error::InvalidParameter(format!(
            "padding {} leaves no room in a {size}px icon",
            settings.padding
        )));
    }

    let (width, height) = buffer.dimensions();
    let factor = (f64::from(inner) / f64::from(width)).min(f64::from(inner) / f64::from(height));
    let fit_w = ((f64::from(width) * factor).round() as u32).clamp(1, inner);
    let fit_h = ((f64::from(height) * factor).round() as u32).clamp(1, inner);
    let fitted = resample(buffer, fit_w, fit_h, Algorithm::Lanczos)?;

    let background = settings
        .background
        .as_deref()
        .map(|hex| with_alpha(color::parse_hex_or(hex, color::WHITE), 255))
        .unwrap_or(Rgba([0, 0, 0, 0]));
    let mut icon = PixelBuffer::from_pixel(size, size, background);
    let offset_x = (size - fit_w) / 2;
    let offset_y = (size - fit_h) / 2;
    for (x, y, px) in fitted.enumerate_pixels() {
        let dst = icon.get_pixel_mut(x + offset_x, y + offset_y);
        *dst = composite_over(*dst, *px, 1.0);
    }

    let shape = settings.clip_shape(size);
    if settings.border_width > 0 {
        let border = with_alpha(color::parse_hex_or(&settings.border_color, color::WHITE), 255);
        let outer = full_outline(shape, size, size);
        let inset = settings.border_width as f32;
        let inner_shape = match shape {
            ClipShape::RoundedRect(radii) => ClipShape::RoundedRect(CornerRadii {
                top_left: (radii.top_left - inset).max(0.0),
                top_right: (radii.top_right - inset).max(0.0),
                bottom_right: (radii.bottom_right - inset).max(0.0),
                bottom_left: (radii.bottom_left - inset).max(0.0),
            }),
            ClipShape::Ellipse => ClipShape::Ellipse,
        };
        let inner_outline = Outline::new(
            inner_shape,
            inset,
            inset,
            size as f32 - inset,
            size as f32 - inset,
        );
        for (x, y, px) in icon.enumerate_pixels_mut() {
            let ring = (outer.coverage(x, y) - inner_outline.coverage(x, y)).max(0.0);
            if ring > 0.0 {
                *px = composite_over(*px, border, ring);
            }
        }
    }

    clip(&mut icon, shape, None)?;
    tracing::debug!(size, shape = ?settings.shape, "icon generated");
    Ok(icon)
}

/// One icon per requested size.
///
/// # Errors
///
/// Fails on the first size [`generate_icon`] rejects.
pub fn generate_icon_set(
    buffer: &PixelBuffer,
    sizes: &[u32],
    settings: &IconSettings,
) -> Result<Vec<PixelBuffer>> {
    sizes
        .iter()
        .map(|&size| {
            let settings = IconSettings {
                size,
                ..settings.clone()
            };
            generate_icon(buffer, &settings)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_pixel(width, height, Rgba([200, 100, 50, 255]))
    }

    #[test]
    fn large_radius_matches_ellipse() {
        for (w, h) in [(20, 20), (31, 17)] {
            let ellipse = coverage_mask(ClipShape::Ellipse, w, h);
            #[allow(clippy::cast_precision_loss)]
            let half = w.min(h) as f32 / 2.0;
            for radius in [half, half + 5.0, 1000.0] {
                let rounded =
                    coverage_mask(ClipShape::RoundedRect(CornerRadii::uniform(radius)), w, h);
                assert_eq!(rounded, ellipse, "{w}x{h} r={radius}");
            }
        }
    }

    #[test]
    fn zero_radius_keeps_everything() {
        let mask = coverage_mask(ClipShape::RoundedRect(CornerRadii::default()), 6, 4);
        assert_eq!(mask.count(), 24);
        assert!(mask.values().iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn rounded_corner_cuts_only_the_corner() {
        let mask = coverage_mask(ClipShape::RoundedRect(CornerRadii::uniform(8.0)), 40, 40);
        assert!(mask.value(0, 0) < 0.01);
        assert!(mask.value(39, 39) < 0.01);
        assert!((mask.value(20, 0) - 1.0).abs() < 1e-6);
        assert!((mask.value(20, 20) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn per_corner_radii_are_independent() {
        let radii = CornerRadii {
            top_left: 10.0,
            ..CornerRadii::default()
        };
        let mask = coverage_mask(ClipShape::RoundedRect(radii), 30, 30);
        assert!(mask.value(0, 0) < 0.01);
        assert!((mask.value(29, 0) - 1.0).abs() < 1e-6);
        assert!((mask.value(0, 29) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clip_with_background_fills_inside_only() {
        let mut buf = PixelBuffer::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
        clip(&mut buf, ClipShape::Ellipse, Some(Rgb([255, 0, 0]))).unwrap();
        assert_eq!(buf.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(buf.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn round_corners_makes_corners_transparent() {
        let mut buf = solid(16, 16);
        let settings = RoundCornersSettings {
            radius: 6.0,
            ..RoundCornersSettings::default()
        };
        round_corners(&mut buf, &settings).unwrap();
        assert_eq!(buf.get_pixel(0, 0)[3], 0);
        assert_eq!(buf.get_pixel(8, 8).0, [200, 100, 50, 255]);
    }

    #[test]
    fn crop_bounds_are_enforced() {
        let buf = solid(10, 8);
        let out = crop(&buf, &Region::new(2, 3, 5, 5)).unwrap();
        assert_eq!(out.dimensions(), (5, 5));
        assert!(crop(&buf, &Region::new(6, 0, 5, 5)).is_err());
        assert!(crop(&buf, &Region::new(0, 0, 0, 5)).is_err());
    }

    #[test]
    fn aspect_crop_is_centred() {
        let buf = PixelBuffer::from_fn(200, 100, |x, _| {
            if x < 50 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let square = crop_to_aspect(&buf, 1, 1).unwrap();
        assert_eq!(square.dimensions(), (100, 100));
        assert_eq!(square.get_pixel(0, 0).0, [255, 255, 255, 255]);

        let wide = crop_to_aspect(&buf, 4, 1).unwrap();
        assert_eq!(wide.dimensions(), (200, 50));
        assert!(crop_to_aspect(&buf, 0, 1).is_err());
    }

    #[test]
    fn icon_has_requested_size_and_shape() {
        let buf = solid(40, 20);
        let settings = IconSettings {
            size: 32,
            shape: IconShape::Circle,
            background: Some("#00FF00".to_string()),
            ..IconSettings::default()
        };
        let icon = generate_icon(&buf, &settings).unwrap();
        assert_eq!(icon.dimensions(), (32, 32));
        assert_eq!(icon.get_pixel(0, 0)[3], 0);
        assert_eq!(icon.get_pixel(16, 16).0, [200, 100, 50, 255]);
        // Letterbox area above the image shows the background.
        assert_eq!(icon.get_pixel(16, 3).0, [0, 255, 0, 255]);
    }

    #[test]
    fn icon_border_ring_is_drawn() {
        let buf = solid(10, 10);
        let settings = IconSettings {
            size: 40,
            shape: IconShape::Square,
            border_width: 3,
            border_color: "#0000FF".to_string(),
            ..IconSettings::default()
        };
        let icon = generate_icon(&buf, &settings).unwrap();
        assert_eq!(icon.get_pixel(1, 20).0, [0, 0, 255, 255]);
        assert_eq!(icon.get_pixel(20, 20).0, [200, 100, 50, 255]);
    }

    #[test]
    fn icon_padding_must_leave_room() {
        let settings = IconSettings {
            size: 10,
            padding: 5,
            ..IconSettings::default()
        };
        assert!(generate_icon(&solid(4, 4), &settings).is_err());
        let set = generate_icon_set(&solid(4, 4), &[16, 32], &IconSettings::default()).unwrap();
        assert_eq!(set[1].dimensions(), (32, 32));
    }
}
