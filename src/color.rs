//! Color value types, hex parsing and RGB/HSL conversion.

use image::{Rgb, Rgba};
use serde::Deserialize;

/// Fallback for colorization targets when a hex string does not parse.
pub const NEUTRAL_GRAY: Rgb<u8> = Rgb([0x80, 0x80, 0x80]);

/// Fallback for background, text and border colors when a hex string does not parse.
pub const WHITE: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// A color in HSL space: `h` in degrees `[0, 360)`, `s` and `l` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Hue in degrees.
    pub h: f32,
    /// Saturation.
    pub s: f32,
    /// Lightness.
    pub l: f32,
}

/// How a pixel is reduced to a single gray value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum GrayMethod {
    /// Weighted sum `0.299R + 0.587G + 0.114B`.
    #[default]
    Luminance,
    /// Unweighted mean of the three channels.
    Average,
    /// `(max + min) / 2`, the HSL lightness.
    Lightness,
}

impl From<String> for GrayMethod {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Self::Average,
            "lightness" | "desaturate" => Self::Lightness,
            _ => Self::Luminance,
        }
    }
}

/// Perceived brightness, `0.299R + 0.587G + 0.114B`.
#[inline]
#[must_use]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

/// Gray value of a pixel under the given method, in `[0, 255]`.
#[inline]
#[must_use]
pub fn gray_value(r: u8, g: u8, b: u8, method: GrayMethod) -> f32 {
    match method {
        GrayMethod::Luminance => luminance(r, g, b),
        GrayMethod::Average => (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0,
        GrayMethod::Lightness => {
            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            (f32::from(max) + f32::from(min)) / 2.0
        }
    }
}

/// Euclidean distance between two RGB triples.
#[inline]
#[must_use]
pub fn distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let dr = f32::from(a[0]) - f32::from(b[0]);
    let dg = f32::from(a[1]) - f32::from(b[1]);
    let db = f32::from(a[2]) - f32::from(b[2]);
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Parse `#RRGGBB` (the `#` is optional). Returns `None` for anything else.
#[must_use]
pub fn parse_hex(input: &str) -> Option<Rgb<u8>> {
    let hex = input.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb([r, g, b]))
}

/// Parse a hex color, substituting `fallback` when the string is malformed.
#[must_use]
pub fn parse_hex_or(input: &str, fallback: Rgb<u8>) -> Rgb<u8> {
    parse_hex(input).unwrap_or_else(|| {
        tracing::debug!(input, "unparseable hex color, using fallback");
        fallback
    })
}

/// Attach an alpha channel to an RGB color.
#[inline]
#[must_use]
pub fn with_alpha(color: Rgb<u8>, alpha: u8) -> Rgba<u8> {
    let Rgb([r, g, b]) = color;
    Rgba([r, g, b, alpha])
}

/// Source-over composite of `src` onto `dst` with an extra opacity factor.
///
/// Straight (non-premultiplied) alpha. A fully transparent source returns
/// `dst` untouched.
#[must_use]
pub fn composite_over(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |c: usize| {
        let blended = f32::from(src[c]) * sa + f32::from(dst[c]) * da * (1.0 - sa);
        crate::buffer::clamp_channel(blended / out_a)
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        crate::buffer::clamp_channel(out_a * 255.0),
    ])
}

/// Convert RGB to HSL.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rgb_to_hsl(color: Rgb<u8>) -> Hsl {
    let r = f64::from(color[0]) / 255.0;
    let g = f64::from(color[1]) / 255.0;
    let b = f64::from(color[2]) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;

    if d.abs() < 1e-12 {
        return Hsl {
            h: 0.0,
            s: 0.0,
            l: l as f32,
        };
    }

    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if (max - r).abs() < 1e-12 {
        let mut h = (g - b) / d;
        if h < 0.0 {
            h += 6.0;
        }
        h
    } else if (max - g).abs() < 1e-12 {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    let mut degrees = h * 60.0;
    if degrees >= 360.0 {
        degrees -= 360.0;
    }

    Hsl {
        h: degrees as f32,
        s: s as f32,
        l: l as f32,
    }
}

/// Convert HSL to RGB, rounding each channel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsl_to_rgb(hsl: Hsl) -> Rgb<u8> {
    let h = f64::from(hsl.h).rem_euclid(360.0) / 360.0;
    let s = f64::from(hsl.s).clamp(0.0, 1.0);
    let l = f64::from(hsl.l).clamp(0.0, 1.0);

    let to_byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    if s < 1e-12 {
        let v = to_byte(l);
        return Rgb([v, v, v]);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    Rgb([
        to_byte(hue_to_channel(p, q, h + 1.0 / 3.0)),
        to_byte(hue_to_channel(p, q, h)),
        to_byte(hue_to_channel(p, q, h - 1.0 / 3.0)),
    ])
}

fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 0.5 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_with_and_without_hash() {
        assert_eq!(parse_hex("#FF8000"), Some(Rgb([255, 128, 0])));
        assert_eq!(parse_hex("00ff7f"), Some(Rgb([0, 255, 127])));
        assert_eq!(parse_hex("  #010203 "), Some(Rgb([1, 2, 3])));
    }

    #[test]
    fn parse_hex_rejects_malformed() {
        assert_eq!(parse_hex("#FFF"), None);
        assert_eq!(parse_hex("#GG0000"), None);
        assert_eq!(parse_hex(""), None);
        assert_eq!(parse_hex("#ÿÿÿ"), None);
    }

    #[test]
    fn parse_hex_or_falls_back() {
        assert_eq!(parse_hex_or("nope", NEUTRAL_GRAY), Rgb([128, 128, 128]));
        assert_eq!(parse_hex_or("#zzzzzz", WHITE), Rgb([255, 255, 255]));
        assert_eq!(parse_hex_or("#102030", WHITE), Rgb([16, 32, 48]));
    }

    #[test]
    fn gray_methods() {
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-3);
        assert!((gray_value(30, 60, 90, GrayMethod::Average) - 60.0).abs() < 1e-6);
        assert!((gray_value(30, 60, 90, GrayMethod::Lightness) - 60.0).abs() < 1e-6);
        assert_eq!(GrayMethod::from("AVERAGE".to_string()), GrayMethod::Average);
        assert_eq!(GrayMethod::from("bogus".to_string()), GrayMethod::Luminance);
    }

    #[test]
    fn hsl_of_primaries() {
        let red = rgb_to_hsl(Rgb([255, 0, 0]));
        assert!(red.h.abs() < 1e-3);
        assert!((red.s - 1.0).abs() < 1e-6);
        assert!((red.l - 0.5).abs() < 1e-6);

        let blue = rgb_to_hsl(Rgb([0, 0, 255]));
        assert!((blue.h - 240.0).abs() < 1e-3);

        let gray = rgb_to_hsl(Rgb([100, 100, 100]));
        assert!(gray.s.abs() < 1e-6);
    }

    #[test]
    fn hsl_round_trip_is_within_one() {
        for r in (0..=255u8).step_by(5) {
            for g in (0..=255u8).step_by(7) {
                for b in (0..=255u8).step_by(11) {
                    let back = hsl_to_rgb(rgb_to_hsl(Rgb([r, g, b])));
                    for (a, e) in back.0.iter().zip([r, g, b]) {
                        assert!(
                            (i16::from(*a) - i16::from(e)).abs() <= 1,
                            "({r},{g},{b}) -> {back:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn composite_over_basics() {
        let base = Rgba([10, 20, 30, 255]);
        assert_eq!(composite_over(base, Rgba([200, 200, 200, 255]), 0.0), base);
        assert_eq!(composite_over(base, Rgba([200, 200, 200, 0]), 1.0), base);
        assert_eq!(
            composite_over(base, Rgba([200, 100, 0, 255]), 1.0),
            Rgba([200, 100, 0, 255])
        );
        let half = composite_over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 0.5);
        assert_eq!(half, Rgba([128, 128, 128, 255]));
        let onto_clear = composite_over(Rgba([0, 0, 0, 0]), Rgba([90, 90, 90, 128]), 1.0);
        assert_eq!(onto_clear, Rgba([90, 90, 90, 128]));
    }

    #[test]
    fn distance_is_euclidean() {
        assert!((distance([0, 0, 0], [3, 4, 0]) - 5.0).abs() < 1e-6);
        assert_eq!(distance([9, 9, 9], [9, 9, 9]), 0.0);
    }
}
