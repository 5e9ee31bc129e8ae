//! Background rendering, replacement and removal.

use std::f32::consts::{PI, TAU};

use image::{Rgb, Rgba};
use serde::Deserialize;

use crate::buffer::{clamp_channel, ensure_dimensions, ensure_non_empty, Mask, PixelBuffer};
use crate::classify::{classify, ClassifyMode, ClassifySettings};
use crate::color::{self, with_alpha};
use crate::error::{Error, Result};
use crate::kernels::{self, GAUSSIAN};

/// Repeating motif drawn by [`BackgroundFill::Pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Pattern {
    /// A filled circle in each cell.
    #[default]
    Dots,
    /// Horizontal stripes.
    Lines,
    /// One-pixel grid lines on cell boundaries.
    Grid,
    /// Sine-shaped stripes.
    Waves,
    /// A five-pointed star in each cell.
    Stars,
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lines" => Self::Lines,
            "grid" => Self::Grid,
            "waves" => Self::Waves,
            "stars" => Self::Stars,
            _ => Self::Dots,
        }
    }
}

fn default_cell_size() -> u32 {
    20
}

/// A generated background. Colors are `#RRGGBB` strings; malformed values
/// fall back to white.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackgroundFill {
    /// One flat color.
    Solid {
        /// Fill color.
        color: String,
    },
    /// Linear gradient; `angle` in degrees, 0 runs left to right.
    Linear {
        /// Start color.
        from: String,
        /// End color.
        to: String,
        /// Direction in degrees, clockwise.
        #[serde(default)]
        angle: f32,
    },
    /// Radial gradient from the centre to the corners.
    Radial {
        /// Centre color.
        from: String,
        /// Corner color.
        to: String,
    },
    /// Conic (angular) gradient around the centre.
    Conic {
        /// Color at the start angle.
        from: String,
        /// Color just before a full turn.
        to: String,
        /// Start angle in degrees.
        #[serde(default)]
        angle: f32,
    },
    /// Tileable motif on a flat backdrop.
    Pattern {
        /// Motif.
        pattern: Pattern,
        /// Motif color.
        foreground: String,
        /// Backdrop color.
        background: String,
        /// Cell size in pixels.
        #[serde(default = "default_cell_size")]
        size: u32,
    },
}

impl Default for BackgroundFill {
    fn default() -> Self {
        Self::Solid {
            color: "#FFFFFF".to_string(),
        }
    }
}

impl BackgroundFill {
    /// Flat fill from a color value.
    #[must_use]
    pub fn solid(color: Rgb<u8>) -> Self {
        let Rgb([r, g, b]) = color;
        Self::Solid {
            color: format!("#{r:02X}{g:02X}{b:02X}"),
        }
    }
}

fn hex(value: &str) -> Rgb<u8> {
    color::parse_hex_or(value, color::WHITE)
}

fn lerp_color(a: Rgb<u8>, b: Rgb<u8>, t: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |c: usize| clamp_channel(f32::from(a[c]) + (f32::from(b[c]) - f32::from(a[c])) * t);
    Rgba([mix(0), mix(1), mix(2), 255])
}

#[allow(clippy::cast_precision_loss)]
fn pattern_hit(pattern: Pattern, x: u32, y: u32, size: u32) -> bool {
    let cell = size as f32;
    let lx = (x % size) as f32 + 0.5 - cell / 2.0;
    let ly = (y % size) as f32 + 0.5 - cell / 2.0;
    let thickness = (size / 4).max(1);
    match pattern {
        Pattern::Dots => lx * lx + ly * ly <= (cell / 4.0).powi(2),
        Pattern::Lines => y % size < thickness,
        Pattern::Grid => x % size == 0 || y % size == 0,
        Pattern::Waves => {
            let offset = (cell / 4.0) * (TAU * x as f32 / cell).sin();
            let shifted = (y as f32 + offset).rem_euclid(cell);
            shifted < thickness as f32
        }
        Pattern::Stars => {
            let r = (lx * lx + ly * ly).sqrt();
            let theta = ly.atan2(lx) + PI / 2.0;
            let spike = (0.5 + 0.5 * (5.0 * theta).cos()).powi(2);
            r <= cell * 0.4 * (0.4 + 0.6 * spike)
        }
    }
}

/// Render an opaque `width x height` background.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for zero dimensions.
#[allow(clippy::cast_precision_loss)]
pub fn render_fill(fill: &BackgroundFill, width: u32, height: u32) -> Result<PixelBuffer> {
    ensure_dimensions(width, height)?;
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);

    let buffer = match fill {
        BackgroundFill::Solid { color } => {
            PixelBuffer::from_pixel(width, height, with_alpha(hex(color), 255))
        }
        BackgroundFill::Linear { from, to, angle } => {
            let (from, to) = (hex(from), hex(to));
            let (sin, cos) = angle.to_radians().sin_cos();
            let half = ((width as f32 * cos).abs() + (height as f32 * sin).abs()) / 2.0;
            PixelBuffer::from_fn(width, height, |x, y| {
                let proj = (x as f32 + 0.5 - cx) * cos + (y as f32 + 0.5 - cy) * sin;
                let t = if half > 0.0 { (proj / half + 1.0) / 2.0 } else { 0.0 };
                lerp_color(from, to, t)
            })
        }
        BackgroundFill::Radial { from, to } => {
            let (from, to) = (hex(from), hex(to));
            let reach = (cx * cx + cy * cy).sqrt();
            PixelBuffer::from_fn(width, height, |x, y| {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                lerp_color(from, to, (dx * dx + dy * dy).sqrt() / reach)
            })
        }
        BackgroundFill::Conic { from, to, angle } => {
            let (from, to) = (hex(from), hex(to));
            PixelBuffer::from_fn(width, height, |x, y| {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                let degrees = dy.atan2(dx).to_degrees() - angle;
                lerp_color(from, to, degrees.rem_euclid(360.0) / 360.0)
            })
        }
        BackgroundFill::Pattern {
            pattern,
            foreground,
            background,
            size,
        } => {
            let (fg, bg) = (with_alpha(hex(foreground), 255), with_alpha(hex(background), 255));
            let size = (*size).max(2);
            PixelBuffer::from_fn(width, height, |x, y| {
                if pattern_hit(*pattern, x, y, size) {
                    fg
                } else {
                    bg
                }
            })
        }
    };
    Ok(buffer)
}

/// Copy all four channels from `background` wherever `mask` is set.
///
/// Fractional mask values blend the two buffers.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask or background differ in size
/// from `buffer`.
pub fn replace_background(
    buffer: &mut PixelBuffer,
    mask: &Mask,
    background: &PixelBuffer,
) -> Result<()> {
    mask.ensure_matches(buffer)?;
    if background.dimensions() != buffer.dimensions() {
        return Err(Error::DimensionMismatch {
            expected: buffer.dimensions(),
            actual: background.dimensions(),
        });
    }
    for (x, y, px) in buffer.enumerate_pixels_mut() {
        let weight = mask.value(x, y);
        if weight <= 0.0 {
            continue;
        }
        let bg = background.get_pixel(x, y);
        if weight >= 1.0 {
            *px = *bg;
        } else {
            for c in 0..4 {
                px[c] = clamp_channel(
                    f32::from(px[c]) * (1.0 - weight) + f32::from(bg[c]) * weight,
                );
            }
        }
    }
    Ok(())
}

/// Make masked pixels transparent; fractional mask values scale alpha down.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask differs in size from `buffer`.
pub fn remove_background(buffer: &mut PixelBuffer, mask: &Mask) -> Result<()> {
    mask.ensure_matches(buffer)?;
    for (x, y, px) in buffer.enumerate_pixels_mut() {
        let weight = mask.value(x, y);
        if weight > 0.0 {
            px[3] = clamp_channel(f32::from(px[3]) * (1.0 - weight));
        }
    }
    Ok(())
}

/// Soften a mask with the 3x3 Gaussian kernel, clamping samples at the border.
#[must_use]
pub fn feather(mask: &Mask) -> Mask {
    let (width, height) = mask.dimensions();
    if mask.is_empty() {
        return mask.clone();
    }
    Mask::from_coverage(width, height, |x, y| {
        let mut sum = 0.0;
        for (ky, row) in GAUSSIAN.iter().enumerate() {
            for (kx, &k) in row.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let sx = (x + kx as u32).saturating_sub(1).min(width - 1);
                #[allow(clippy::cast_possible_truncation)]
                let sy = (y + ky as u32).saturating_sub(1).min(height - 1);
                sum += mask.value(sx, sy) * k;
            }
        }
        sum / 16.0
    })
}

/// Settings for [`apply`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundSettings {
    /// How the background is found.
    pub mode: ClassifyMode,
    /// Key color for color mode.
    pub background_color: String,
    /// Inclusive RGB distance to the key color.
    pub color_tolerance: f32,
    /// Fill to put behind the subject; `None` makes the background transparent.
    pub replacement: Option<BackgroundFill>,
    /// Feather the mask before applying it.
    pub smooth_edges: bool,
    /// Remove isolated alpha specks after a transparent removal.
    pub despeckle: bool,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            mode: ClassifyMode::Auto,
            background_color: "#FFFFFF".to_string(),
            color_tolerance: 30.0,
            replacement: None,
            smooth_edges: false,
            despeckle: false,
        }
    }
}

/// Classify the background and then replace or remove it.
///
/// Returns the mask that was applied.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for a zero-area buffer.
pub fn apply(buffer: &mut PixelBuffer, settings: &BackgroundSettings) -> Result<Mask> {
    ensure_non_empty(buffer)?;
    let classify_settings = ClassifySettings {
        mode: settings.mode,
        key: settings.background_color.clone(),
        tolerance: settings.color_tolerance,
    };
    let mut mask = classify(buffer, &classify_settings)?;
    if settings.smooth_edges {
        mask = feather(&mask);
    }

    match &settings.replacement {
        Some(fill) => {
            let (width, height) = buffer.dimensions();
            let background = render_fill(fill, width, height)?;
            replace_background(buffer, &mask, &background)?;
        }
        None => {
            remove_background(buffer, &mask)?;
            if settings.despeckle {
                kernels::despeckle_alpha(buffer);
            }
        }
    }

    tracing::debug!(
        replaced = settings.replacement.is_some(),
        pixels = mask.count(),
        "background applied"
    );
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn white_color_key_removal_clears_alpha() {
        let mut buf = white(4, 4);
        let settings = BackgroundSettings {
            mode: ClassifyMode::Color,
            background_color: "#FFFFFF".to_string(),
            color_tolerance: 10.0,
            ..BackgroundSettings::default()
        };
        let mask = apply(&mut buf, &settings).unwrap();
        assert_eq!(mask.count(), 16);
        assert!(buf.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn replacement_copies_all_channels() {
        let mut buf = white(3, 3);
        buf.put_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let mask = Mask::from_fn(3, 3, |x, y| !(x == 1 && y == 1));
        let background = PixelBuffer::from_pixel(3, 3, Rgba([1, 2, 3, 4]));
        replace_background(&mut buf, &mask, &background).unwrap();
        assert_eq!(buf.get_pixel(0, 0).0, [1, 2, 3, 4]);
        assert_eq!(buf.get_pixel(1, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let mut buf = white(3, 3);
        assert!(remove_background(&mut buf, &Mask::new(2, 3)).is_err());
        let bg = white(4, 4);
        assert!(replace_background(&mut buf, &Mask::new(3, 3), &bg).is_err());
    }

    #[test]
    fn solid_fill_and_fallback() {
        let red = render_fill(&BackgroundFill::solid(Rgb([255, 0, 0])), 2, 2).unwrap();
        assert_eq!(red.get_pixel(1, 1).0, [255, 0, 0, 255]);

        let bad = BackgroundFill::Solid {
            color: "oops".to_string(),
        };
        assert_eq!(render_fill(&bad, 1, 1).unwrap().get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert!(render_fill(&bad, 0, 1).is_err());
    }

    #[test]
    fn linear_gradient_runs_from_start_to_end() {
        let fill = BackgroundFill::Linear {
            from: "#000000".to_string(),
            to: "#FFFFFF".to_string(),
            angle: 0.0,
        };
        let img = render_fill(&fill, 100, 4).unwrap();
        assert!(img.get_pixel(0, 0)[0] < 5);
        assert!(img.get_pixel(99, 0)[0] > 250);
        assert!(img.get_pixel(20, 0)[0] < img.get_pixel(60, 0)[0]);
    }

    #[test]
    fn radial_gradient_is_centred() {
        let fill = BackgroundFill::Radial {
            from: "#FFFFFF".to_string(),
            to: "#000000".to_string(),
        };
        let img = render_fill(&fill, 21, 21).unwrap();
        assert!(img.get_pixel(10, 10)[0] > 240);
        assert!(img.get_pixel(0, 0)[0] < 20);
    }

    #[test]
    fn patterns_use_both_colors() {
        for pattern in [
            Pattern::Dots,
            Pattern::Lines,
            Pattern::Grid,
            Pattern::Waves,
            Pattern::Stars,
        ] {
            let fill = BackgroundFill::Pattern {
                pattern,
                foreground: "#FF0000".to_string(),
                background: "#0000FF".to_string(),
                size: 16,
            };
            let img = render_fill(&fill, 64, 64).unwrap();
            assert!(img.pixels().any(|p| p.0 == [255, 0, 0, 255]), "{pattern:?}");
            assert!(img.pixels().any(|p| p.0 == [0, 0, 255, 255]), "{pattern:?}");
        }
    }

    #[test]
    fn feather_softens_hard_edges() {
        let mask = Mask::from_fn(5, 5, |x, _| x < 2);
        let soft = feather(&mask);
        assert!((soft.value(0, 2) - 1.0).abs() < 1e-6);
        assert!(soft.value(2, 2) > 0.0 && soft.value(2, 2) < 0.5);
        assert!(soft.value(4, 2).abs() < 1e-6);
    }

    #[test]
    fn fill_deserializes_from_tagged_json() {
        let fill: BackgroundFill = serde_json::from_str(
            r##"{"type":"pattern","pattern":"stars","foreground":"#fff","background":"#000"}"##,
        )
        .unwrap();
        assert!(matches!(
            fill,
            BackgroundFill::Pattern {
                pattern: Pattern::Stars,
                size: 20,
                ..
            }
        ));
    }
}
