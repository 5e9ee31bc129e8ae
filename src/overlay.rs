//! Alpha-blended overlays: images or text placed at an anchor, optionally
//! rotated and decorated with a backing box, drop shadow and stroke.
//!
//! Every overlay is built as two layers sharing one frame: a *decor* layer
//! (backing, shadow, stroke, in that order) and the *fill* layer holding the
//! element itself. Both are rotated about the element's centre and then
//! composited source-over onto the base; the configured opacity scales the
//! fill only.

use std::path::PathBuf;

use image::{imageops, Rgba};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::Deserialize;

use crate::buffer::{clamp_channel, ensure_non_empty, PixelBuffer};
use crate::color::{self, composite_over, with_alpha};
use crate::error::Result;
use crate::text::{render_text, TextAlign};

/// Drop shadow color, `rgba(0, 0, 0, 0.5)`.
pub const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 128]);

/// Drop shadow offset to the right and down, in pixels.
pub const SHADOW_OFFSET: u32 = 2;

/// Space between the element bounds and the edge of its backing box.
pub const BACKING_PADDING: u32 = 10;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Nine-point compass anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Anchor {
    /// Top-left corner.
    TopLeft,
    /// Top edge, centred.
    Top,
    /// Top-right corner.
    TopRight,
    /// Left edge, centred.
    Left,
    /// Centre.
    Center,
    /// Right edge, centred.
    Right,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom edge, centred.
    Bottom,
    /// Bottom-right corner.
    #[default]
    BottomRight,
}

impl From<String> for Anchor {
    fn from(value: String) -> Self {
        let key: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "topleft" => Self::TopLeft,
            "top" | "topcenter" => Self::Top,
            "topright" => Self::TopRight,
            "left" | "centerleft" | "middleleft" => Self::Left,
            "center" | "centre" | "middle" => Self::Center,
            "right" | "centerright" | "middleright" => Self::Right,
            "bottomleft" => Self::BottomLeft,
            "bottom" | "bottomcenter" => Self::Bottom,
            _ => Self::BottomRight,
        }
    }
}

impl Anchor {
    /// Top-left position of a `width x height` element inside a
    /// `base_width x base_height` canvas, `margin` pixels from the edges.
    #[must_use]
    pub fn position(
        self,
        base_width: u32,
        base_height: u32,
        width: u32,
        height: u32,
        margin: u32,
    ) -> (i64, i64) {
        let (bw, bh) = (i64::from(base_width), i64::from(base_height));
        let (w, h, m) = (i64::from(width), i64::from(height), i64::from(margin));
        let left = m;
        let centre_x = (bw - w) / 2;
        let right = bw - w - m;
        let top = m;
        let centre_y = (bh - h) / 2;
        let bottom = bh - h - m;
        match self {
            Self::TopLeft => (left, top),
            Self::Top => (centre_x, top),
            Self::TopRight => (right, top),
            Self::Left => (left, centre_y),
            Self::Center => (centre_x, centre_y),
            Self::Right => (right, centre_y),
            Self::BottomLeft => (left, bottom),
            Self::Bottom => (centre_x, bottom),
            Self::BottomRight => (right, bottom),
        }
    }
}

/// Drop shadow parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShadowStyle {
    /// Gaussian blur sigma; `0` gives a hard shadow.
    pub blur: f32,
}

/// Outline drawn around the element.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrokeStyle {
    /// Stroke color, `#RRGGBB`.
    pub color: String,
    /// Stroke width in pixels.
    pub width: u32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            width: 2,
        }
    }
}

/// Placement and styling shared by image and text overlays.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    /// Compass anchor used unless both `x` and `y` are set.
    pub anchor: Anchor,
    /// Distance from the canvas edge for anchored placement.
    pub margin: u32,
    /// Explicit left edge.
    pub x: Option<i64>,
    /// Explicit top edge.
    pub y: Option<i64>,
    /// Repeat the element across the whole canvas.
    pub tiled: bool,
    /// Gap between tiles.
    pub spacing: u32,
    /// Fill opacity, `0..=1`.
    pub opacity: f32,
    /// Rotation about the element's centre, degrees clockwise.
    pub rotation: f32,
    /// Optional drop shadow.
    pub shadow: Option<ShadowStyle>,
    /// Optional stroke.
    pub stroke: Option<StrokeStyle>,
    /// Optional backing box color, `#RRGGBB`.
    pub backing: Option<String>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            anchor: Anchor::BottomRight,
            margin: 20,
            x: None,
            y: None,
            tiled: false,
            spacing: 40,
            opacity: 1.0,
            rotation: 0.0,
            shadow: None,
            stroke: None,
            backing: None,
        }
    }
}

/// The decor and fill layers of one element, sharing a frame.
struct Layers {
    decor: PixelBuffer,
    fill: PixelBuffer,
}

fn shadow_extent(shadow: &ShadowStyle) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let blur = (shadow.blur.max(0.0) * 3.0).ceil() as u32;
    SHADOW_OFFSET + blur
}

/// Maximum alpha within `radius` (disc) of each pixel.
fn dilate_alpha(layer: &PixelBuffer, radius: u32) -> Vec<u8> {
    let (width, height) = layer.dimensions();
    let r = i64::from(radius);
    let mut out = vec![0u8; width as usize * height as usize];
    for (x, y, px) in layer.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
                let (Ok(nx), Ok(ny)) = (u32::try_from(nx), u32::try_from(ny)) else {
                    continue;
                };
                if nx < width && ny < height {
                    let slot = &mut out[ny as usize * width as usize + nx as usize];
                    *slot = (*slot).max(px[3]);
                }
            }
        }
    }
    out
}

fn build_layers(element: &PixelBuffer, settings: &OverlaySettings) -> Layers {
    let (width, height) = element.dimensions();
    let stroke_width = settings.stroke.as_ref().map_or(0, |s| s.width);
    let pad = 1 + stroke_width
        .max(settings.shadow.as_ref().map_or(0, shadow_extent))
        .max(if settings.backing.is_some() { BACKING_PADDING } else { 0 });

    let (lw, lh) = (width + 2 * pad, height + 2 * pad);
    let mut fill = PixelBuffer::new(lw, lh);
    imageops::replace(&mut fill, element, i64::from(pad), i64::from(pad));
    let mut decor = PixelBuffer::new(lw, lh);

    if let Some(backing) = &settings.backing {
        let color = with_alpha(color::parse_hex_or(backing, color::WHITE), 255);
        let start = pad - BACKING_PADDING;
        for y in start..start + height + 2 * BACKING_PADDING {
            for x in start..start + width + 2 * BACKING_PADDING {
                decor.put_pixel(x, y, color);
            }
        }
    }

    if let Some(shadow) = &settings.shadow {
        let mut silhouette = PixelBuffer::new(lw, lh);
        for (x, y, px) in element.enumerate_pixels() {
            let alpha = clamp_channel(f32::from(px[3]) * f32::from(SHADOW_COLOR[3]) / 255.0);
            let mut tinted = SHADOW_COLOR;
            tinted[3] = alpha;
            silhouette.put_pixel(pad + x + SHADOW_OFFSET, pad + y + SHADOW_OFFSET, tinted);
        }
        if shadow.blur > 0.0 {
            silhouette = gaussian_blur_f32(&silhouette, shadow.blur);
        }
        composite_layer(&mut decor, &silhouette, 0, 0, 1.0);
    }

    if let Some(stroke) = settings.stroke.as_ref().filter(|s| s.width > 0) {
        let color = color::parse_hex_or(&stroke.color, color::WHITE);
        let spread = dilate_alpha(&fill, stroke.width);
        let outline = PixelBuffer::from_fn(lw, lh, |x, y| {
            with_alpha(color, spread[y as usize * lw as usize + x as usize])
        });
        composite_layer(&mut decor, &outline, 0, 0, 1.0);
    }

    Layers { decor, fill }
}

fn pad_to(layer: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    let mut out = PixelBuffer::new(width, height);
    let left = i64::from((width - layer.width()) / 2);
    let top = i64::from((height - layer.height()) / 2);
    imageops::replace(&mut out, layer, left, top);
    out
}

fn rotate_layer(layer: &PixelBuffer, degrees: f32) -> PixelBuffer {
    let normalised = degrees.rem_euclid(360.0);
    if normalised.abs() < 0.01 || (normalised - 360.0).abs() < 0.01 {
        return layer.clone();
    }
    if (normalised - 90.0).abs() < 0.01 {
        return imageops::rotate90(layer);
    }
    if (normalised - 180.0).abs() < 0.01 {
        return imageops::rotate180(layer);
    }
    if (normalised - 270.0).abs() < 0.01 {
        return imageops::rotate270(layer);
    }

    // Grow symmetrically so the rotated element fits without clipping.
    let (w, h) = (f64::from(layer.width()), f64::from(layer.height()));
    let diagonal = (w * w + h * h).sqrt();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let grow = |side: f64| side as u32 + 2 * ((diagonal - side) / 2.0).ceil().max(0.0) as u32;
    let padded = pad_to(layer, grow(w), grow(h));
    rotate_about_center(
        &padded,
        degrees.to_radians(),
        Interpolation::Bilinear,
        TRANSPARENT,
    )
}

/// Composite `layer` onto `base` with its top-left at `(left, top)`.
fn composite_layer(base: &mut PixelBuffer, layer: &PixelBuffer, left: i64, top: i64, opacity: f32) {
    if opacity <= 0.0 {
        return;
    }
    let (bw, bh) = base.dimensions();
    for (x, y, px) in layer.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        let (Ok(tx), Ok(ty)) = (
            u32::try_from(left + i64::from(x)),
            u32::try_from(top + i64::from(y)),
        ) else {
            continue;
        };
        if tx < bw && ty < bh {
            let dst = base.get_pixel_mut(tx, ty);
            *dst = composite_over(*dst, *px, opacity);
        }
    }
}

fn element_positions(
    base: &PixelBuffer,
    width: u32,
    height: u32,
    settings: &OverlaySettings,
) -> Vec<(i64, i64)> {
    let (bw, bh) = base.dimensions();
    if settings.tiled {
        let step_x = usize::try_from(width + settings.spacing).unwrap_or(usize::MAX).max(1);
        let step_y = usize::try_from(height + settings.spacing).unwrap_or(usize::MAX).max(1);
        let (w, h) = (i64::from(width), i64::from(height));
        let mut positions = Vec::new();
        for y in (-h..i64::from(bh) + h).step_by(step_y) {
            for x in (-w..i64::from(bw) + w).step_by(step_x) {
                positions.push((x, y));
            }
        }
        return positions;
    }
    match (settings.x, settings.y) {
        (Some(x), Some(y)) => vec![(x, y)],
        _ => vec![settings
            .anchor
            .position(bw, bh, width, height, settings.margin)],
    }
}

/// Composite `element` onto `base`.
///
/// # Errors
///
/// Returns [`crate::Error::EmptyImage`] if either buffer has zero area.
pub fn overlay_image(
    base: &mut PixelBuffer,
    element: &PixelBuffer,
    settings: &OverlaySettings,
) -> Result<()> {
    ensure_non_empty(base)?;
    ensure_non_empty(element)?;
    let (width, height) = element.dimensions();

    let layers = build_layers(element, settings);
    let decor = rotate_layer(&layers.decor, settings.rotation);
    let fill = rotate_layer(&layers.fill, settings.rotation);
    let (lw, lh) = (i64::from(fill.width()), i64::from(fill.height()));

    let positions = element_positions(base, width, height, settings);
    for &(x, y) in &positions {
        // Align the layer's centre with the element's centre.
        let left = x + (i64::from(width) - lw).div_euclid(2);
        let top = y + (i64::from(height) - lh).div_euclid(2);
        composite_layer(base, &decor, left, top, 1.0);
        composite_layer(base, &fill, left, top, settings.opacity);
    }
    tracing::debug!(
        placements = positions.len(),
        opacity = settings.opacity,
        rotation = settings.rotation,
        "overlay composited"
    );
    Ok(())
}

/// Render `text` and composite it onto `base`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidParameter`] for empty text.
pub fn overlay_text(
    base: &mut PixelBuffer,
    text: &str,
    font_size: u32,
    color: image::Rgb<u8>,
    settings: &OverlaySettings,
) -> Result<()> {
    let glyphs = render_text(text, font_size, with_alpha(color, 255), TextAlign::Center)?;
    overlay_image(base, &glyphs, settings)
}

/// Settings for the watermark tool: text or an image file, plus placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkSettings {
    /// Watermark text, used when `image` is absent.
    pub text: String,
    /// Font size in pixels.
    pub font_size: u32,
    /// Text color, `#RRGGBB`.
    pub color: String,
    /// Path of an image to use instead of text.
    pub image: Option<PathBuf>,
    /// Placement and styling.
    pub overlay: OverlaySettings,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 24,
            color: "#FFFFFF".to_string(),
            image: None,
            overlay: OverlaySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn base(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_pixel(width, height, WHITE)
    }

    fn square(size: u32) -> PixelBuffer {
        PixelBuffer::from_pixel(size, size, RED)
    }

    fn at(x: i64, y: i64) -> OverlaySettings {
        OverlaySettings {
            x: Some(x),
            y: Some(y),
            ..OverlaySettings::default()
        }
    }

    #[test]
    fn zero_opacity_leaves_base_untouched() {
        let original = PixelBuffer::from_fn(30, 20, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x * 8) as u8, (y * 12) as u8, 77, 255])
        });
        let mut buf = original.clone();
        let settings = OverlaySettings {
            opacity: 0.0,
            rotation: 33.0,
            ..OverlaySettings::default()
        };
        overlay_image(&mut buf, &square(8), &settings).unwrap();
        overlay_text(&mut buf, "Hi", 8, image::Rgb([0, 0, 0]), &settings).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn anchors_respect_margin() {
        assert_eq!(Anchor::TopLeft.position(100, 50, 10, 10, 5), (5, 5));
        assert_eq!(Anchor::BottomRight.position(100, 50, 10, 10, 5), (85, 35));
        assert_eq!(Anchor::Center.position(100, 50, 10, 10, 5), (45, 20));
        assert_eq!(Anchor::from("top-right".to_string()), Anchor::TopRight);
        assert_eq!(Anchor::from("middle_left".to_string()), Anchor::Left);
        assert_eq!(Anchor::from("nowhere".to_string()), Anchor::BottomRight);
    }

    #[test]
    fn opaque_overlay_lands_at_anchor() {
        let mut buf = base(100, 50);
        let settings = OverlaySettings {
            margin: 5,
            ..OverlaySettings::default()
        };
        overlay_image(&mut buf, &square(10), &settings).unwrap();
        assert_eq!(*buf.get_pixel(94, 44), RED);
        assert_eq!(*buf.get_pixel(85, 35), RED);
        assert_eq!(*buf.get_pixel(95, 44), WHITE);
        assert_eq!(*buf.get_pixel(84, 35), WHITE);
    }

    #[test]
    fn explicit_position_and_half_opacity() {
        let mut buf = base(20, 20);
        let settings = OverlaySettings {
            opacity: 0.5,
            ..at(3, 4)
        };
        overlay_image(&mut buf, &square(2), &settings).unwrap();
        assert_eq!(buf.get_pixel(3, 4).0, [255, 128, 128, 255]);
        assert_eq!(*buf.get_pixel(2, 4), WHITE);
    }

    #[test]
    fn backing_box_surrounds_element() {
        let mut buf = base(60, 60);
        let settings = OverlaySettings {
            backing: Some("#0000FF".to_string()),
            ..at(20, 20)
        };
        overlay_image(&mut buf, &square(4), &settings).unwrap();
        assert_eq!(buf.get_pixel(12, 12).0, [0, 0, 255, 255]);
        assert_eq!(buf.get_pixel(33, 33).0, [0, 0, 255, 255]);
        assert_eq!(*buf.get_pixel(9, 9), WHITE);
        assert_eq!(*buf.get_pixel(21, 21), RED);
    }

    #[test]
    fn hard_shadow_is_offset_and_translucent() {
        let mut buf = base(30, 30);
        let settings = OverlaySettings {
            shadow: Some(ShadowStyle { blur: 0.0 }),
            ..at(10, 10)
        };
        overlay_image(&mut buf, &square(4), &settings).unwrap();
        assert_eq!(buf.get_pixel(15, 15).0, [127, 127, 127, 255]);
        assert_eq!(*buf.get_pixel(13, 13), RED);
        assert_eq!(*buf.get_pixel(16, 16), WHITE);
    }

    #[test]
    fn blurred_shadow_spreads() {
        let mut buf = base(40, 40);
        let settings = OverlaySettings {
            shadow: Some(ShadowStyle { blur: 2.0 }),
            ..at(15, 15)
        };
        overlay_image(&mut buf, &square(4), &settings).unwrap();
        let px = buf.get_pixel(21, 21);
        assert!(px[0] < 255 && px[0] == px[1]);
    }

    #[test]
    fn stroke_outlines_element() {
        let mut buf = base(30, 30);
        let settings = OverlaySettings {
            stroke: Some(StrokeStyle {
                color: "#0000FF".to_string(),
                width: 2,
            }),
            ..at(10, 10)
        };
        overlay_image(&mut buf, &square(4), &settings).unwrap();
        assert_eq!(buf.get_pixel(9, 12).0, [0, 0, 255, 255]);
        assert_eq!(buf.get_pixel(8, 12).0, [0, 0, 255, 255]);
        assert_eq!(*buf.get_pixel(7, 12), WHITE);
        assert_eq!(*buf.get_pixel(11, 11), RED);
    }

    #[test]
    fn right_angle_rotation_turns_bar() {
        let mut buf = base(40, 40);
        let bar = PixelBuffer::from_pixel(10, 2, RED);
        let settings = OverlaySettings {
            anchor: Anchor::Center,
            rotation: 90.0,
            ..OverlaySettings::default()
        };
        overlay_image(&mut buf, &bar, &settings).unwrap();
        assert_eq!(*buf.get_pixel(20, 16), RED);
        assert_eq!(*buf.get_pixel(16, 20), WHITE);
    }

    #[test]
    fn free_rotation_keeps_centre() {
        let mut buf = base(60, 60);
        let settings = OverlaySettings {
            anchor: Anchor::Center,
            rotation: 45.0,
            ..OverlaySettings::default()
        };
        overlay_image(&mut buf, &square(20), &settings).unwrap();
        let centre = buf.get_pixel(30, 30);
        assert!(centre[0] > 250 && centre[1] < 5);
        // A 45 degree diamond reaches further along the axes than the square did.
        assert!(buf.get_pixel(30, 18)[1] < 5);
        assert_eq!(*buf.get_pixel(18, 18), WHITE);
    }

    #[test]
    fn tiled_overlay_repeats() {
        let mut buf = base(50, 50);
        let settings = OverlaySettings {
            tiled: true,
            spacing: 6,
            ..OverlaySettings::default()
        };
        overlay_image(&mut buf, &square(4), &settings).unwrap();
        let red = buf.pixels().filter(|p| **p == RED).count();
        assert!(red >= 16 * 9, "{red}");
    }
}
