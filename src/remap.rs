//! Tonal-band color remapping: colorization, grayscale conversion and tinting.
//!
//! Colorization always works from a luminance signal. Each pixel's gray value
//! picks a target color from a band table, then the output takes the target's
//! hue and (scaled) saturation while keeping the gray value as lightness, so
//! the photograph's tonal structure survives.

use image::Rgb;
use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::buffer::{clamp_channel, ensure_non_empty, PixelBuffer};
use crate::color::{self, gray_value, hsl_to_rgb, rgb_to_hsl, GrayMethod, Hsl};
use crate::error::Result;
use crate::kernels;

/// Upper bound on pixels sampled by [`is_monochrome`].
const MONOCHROME_SAMPLES: usize = 1000;

/// Mean channel spread below which an image counts as monochrome.
const MONOCHROME_VARIATION: f32 = 30.0;

/// Maximum relative jitter applied per channel after blending.
const JITTER_AMPLITUDE: f32 = 0.025;

/// Upper bounds of the seven tonal bands (normalized gray).
const BAND_LIMITS: [f32; 6] = [0.2, 0.35, 0.5, 0.65, 0.8, 0.9];

/// Auto-mode palette, one color per band from shadows to highlights.
const AUTO_PALETTE: [Rgb<u8>; 7] = [
    Rgb([62, 42, 30]),    // hair / deep shadow
    Rgb([112, 86, 62]),   // dark earth
    Rgb([156, 124, 92]),  // warm mid tone
    Rgb([135, 180, 225]), // sky
    Rgb([176, 198, 150]), // foliage highlight
    Rgb([204, 222, 240]), // pale sky
    Rgb([246, 240, 232]), // near white
];

/// Skin tones that replace bands 1 and 2 when skin detection is on.
const SKIN_TONES: [Rgb<u8>; 2] = [Rgb([168, 116, 92]), Rgb([214, 164, 134])];

const FACE_TONE: Rgb<u8> = Rgb([222, 172, 142]);
const SKY_TONE: Rgb<u8> = Rgb([132, 184, 234]);
const GROUND_TONE: Rgb<u8> = Rgb([122, 92, 62]);
const VEGETATION_TONE: Rgb<u8> = Rgb([88, 140, 72]);

/// Colorization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ColorizeMode {
    /// Fixed band table keyed on gray value.
    #[default]
    Auto,
    /// Band table biased by pixel position and mixed with a user color.
    Manual,
    /// Fixed palette chosen by [`ColorStyle`].
    Style,
}

impl From<String> for ColorizeMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Self::Manual,
            "style" => Self::Style,
            _ => Self::Auto,
        }
    }
}

/// Named palettes for [`ColorizeMode::Style`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ColorStyle {
    /// Plausible everyday colors.
    #[default]
    Natural,
    /// Faded, warm print tones.
    Vintage,
    /// Saturated colors.
    Vivid,
    /// Oranges and reds.
    Warm,
    /// Blues and teals.
    Cool,
}

impl From<String> for ColorStyle {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "vintage" => Self::Vintage,
            "vivid" => Self::Vivid,
            "warm" => Self::Warm,
            "cool" => Self::Cool,
            _ => Self::Natural,
        }
    }
}

impl ColorStyle {
    /// The seven band colors for this style.
    #[must_use]
    pub fn palette(self) -> [Rgb<u8>; 7] {
        match self {
            Self::Natural => AUTO_PALETTE,
            Self::Vintage => [
                Rgb([70, 52, 38]),
                Rgb([118, 94, 70]),
                Rgb([160, 132, 100]),
                Rgb([170, 170, 150]),
                Rgb([196, 180, 150]),
                Rgb([222, 208, 182]),
                Rgb([240, 230, 210]),
            ],
            Self::Vivid => [
                Rgb([60, 20, 10]),
                Rgb([150, 60, 30]),
                Rgb([230, 140, 80]),
                Rgb([40, 140, 240]),
                Rgb([60, 200, 80]),
                Rgb([130, 200, 255]),
                Rgb([255, 245, 220]),
            ],
            Self::Warm => [
                Rgb([80, 30, 20]),
                Rgb([140, 70, 40]),
                Rgb([200, 120, 70]),
                Rgb([230, 160, 90]),
                Rgb([240, 190, 120]),
                Rgb([250, 215, 160]),
                Rgb([255, 240, 215]),
            ],
            Self::Cool => [
                Rgb([20, 30, 60]),
                Rgb([40, 70, 110]),
                Rgb([70, 110, 150]),
                Rgb([90, 160, 200]),
                Rgb([120, 190, 190]),
                Rgb([180, 215, 235]),
                Rgb([230, 240, 250]),
            ],
        }
    }
}

/// Settings for [`colorize`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorizeSettings {
    /// Strategy used to pick the target color of each pixel.
    pub mode: ColorizeMode,
    /// Saturation strength, `0..=10`.
    pub intensity: u8,
    /// Swap the low mid-tone bands for skin tones (auto mode).
    pub skin_detection: bool,
    /// User color for manual mode, `#RRGGBB`.
    pub color: String,
    /// How strongly the user color is mixed in, percent.
    pub color_intensity: u8,
    /// Palette for style mode.
    pub style: ColorStyle,
    /// How gray values are computed.
    pub gray_method: GrayMethod,
    /// Apply a Laplacian detail pass afterwards.
    pub enhance_details: bool,
    /// Apply a Gaussian smoothing pass afterwards.
    pub smooth: bool,
}

impl Default for ColorizeSettings {
    fn default() -> Self {
        Self {
            mode: ColorizeMode::Auto,
            intensity: 7,
            skin_detection: true,
            color: "#C8A078".to_string(),
            color_intensity: 50,
            style: ColorStyle::Natural,
            gray_method: GrayMethod::Luminance,
            enhance_details: false,
            smooth: false,
        }
    }
}

/// Source of the per-channel multiplicative jitter applied after blending.
pub trait Jitter {
    /// A factor close to `1.0`.
    fn factor(&mut self) -> f32;
}

/// Jitter backed by a random number generator.
#[derive(Debug)]
pub struct RngJitter<R> {
    rng: R,
}

/// Non-reproducible jitter from the thread-local generator.
pub type RandomJitter = RngJitter<ThreadRng>;

/// Reproducible jitter from a seeded [`StdRng`].
pub type SeededJitter = RngJitter<StdRng>;

impl RngJitter<ThreadRng> {
    /// Jitter from the thread-local generator (non-reproducible).
    #[must_use]
    pub fn thread() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl RngJitter<StdRng> {
    /// Reproducible jitter from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> Jitter for RngJitter<R> {
    fn factor(&mut self) -> f32 {
        1.0 + self.rng.gen_range(-JITTER_AMPLITUDE..=JITTER_AMPLITUDE)
    }
}

/// No jitter at all; every factor is exactly `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn factor(&mut self) -> f32 {
        1.0
    }
}

/// Whether the image is already (close to) grayscale.
///
/// Samples up to 1000 evenly spaced pixels and compares the mean
/// `max(R,G,B) - min(R,G,B)` against 30. A buffer with no pixels counts as
/// monochrome.
#[must_use]
pub fn is_monochrome(buffer: &PixelBuffer) -> bool {
    let total = buffer.width() as usize * buffer.height() as usize;
    if total == 0 {
        return true;
    }
    let step = (total / MONOCHROME_SAMPLES).max(1);
    let raw = buffer.as_raw();

    let mut sum = 0u64;
    let mut samples = 0u64;
    for i in (0..total).step_by(step).take(MONOCHROME_SAMPLES) {
        let px = &raw[i * 4..i * 4 + 3];
        let max = px[0].max(px[1]).max(px[2]);
        let min = px[0].min(px[1]).min(px[2]);
        sum += u64::from(max - min);
        samples += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let avg = sum as f32 / samples as f32;
    avg < MONOCHROME_VARIATION
}

/// Index of the tonal band for a normalized gray value.
#[must_use]
pub fn tonal_band(gray: f32) -> usize {
    BAND_LIMITS
        .iter()
        .position(|&limit| gray < limit)
        .unwrap_or(BAND_LIMITS.len())
}

/// Auto-mode target color for a normalized gray value.
#[must_use]
pub fn auto_color(gray: f32, skin_detection: bool) -> Rgb<u8> {
    let band = tonal_band(gray);
    if skin_detection && (1..=2).contains(&band) {
        return SKIN_TONES[band - 1];
    }
    AUTO_PALETTE[band]
}

/// Manual-mode target: position-biased band color mixed with `user` by `mix` (0 to 1).
///
/// `nx` and `ny` are the pixel centre in normalized image coordinates.
#[must_use]
pub fn manual_color(gray: f32, nx: f32, ny: f32, user: Rgb<u8>, mix: f32) -> Rgb<u8> {
    let dx = nx - 0.5;
    let dy = ny - 0.5;
    let centre_distance = (dx * dx + dy * dy).sqrt();

    let base = if centre_distance < 0.25 && (0.3..0.8).contains(&gray) {
        FACE_TONE
    } else if ny < 1.0 / 3.0 && gray >= 0.5 {
        SKY_TONE
    } else if ny > 2.0 / 3.0 && gray < 0.4 {
        GROUND_TONE
    } else if (0.25..0.55).contains(&gray) {
        VEGETATION_TONE
    } else {
        auto_color(gray, false)
    };

    mix_rgb(base, user, mix)
}

fn mix_rgb(a: Rgb<u8>, b: Rgb<u8>, t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    Rgb([0, 1, 2].map(|c| clamp_channel(f32::from(a[c]) * (1.0 - t) + f32::from(b[c]) * t)))
}

/// Inject the hue and scaled saturation of `target` into a gray value.
///
/// `gray` is in `[0, 255]`; `intensity` in `[0, 1]` scales the target
/// saturation. Each output channel is multiplied by a jitter factor.
#[must_use]
pub fn blend(gray: f32, target: Rgb<u8>, intensity: f32, jitter: &mut dyn Jitter) -> Rgb<u8> {
    let target_hsl = rgb_to_hsl(target);
    let rgb = hsl_to_rgb(Hsl {
        h: target_hsl.h,
        s: target_hsl.s * intensity.clamp(0.0, 1.0),
        l: (gray / 255.0).clamp(0.0, 1.0),
    });
    Rgb(rgb.0.map(|v| clamp_channel(f32::from(v) * jitter.factor())))
}

/// Rewrite every pixel as its gray value (alpha untouched).
pub fn desaturate(buffer: &mut PixelBuffer, method: GrayMethod) {
    for px in buffer.pixels_mut() {
        let g = clamp_channel(gray_value(px[0], px[1], px[2], method));
        px[0] = g;
        px[1] = g;
        px[2] = g;
    }
}

/// Colorize a buffer in place.
///
/// Non-monochrome inputs are converted to grayscale first, so existing
/// chrominance never leaks into the result.
///
/// # Errors
///
/// Returns [`crate::Error::EmptyImage`] for a zero-area buffer.
pub fn colorize(
    buffer: &mut PixelBuffer,
    settings: &ColorizeSettings,
    jitter: &mut dyn Jitter,
) -> Result<()> {
    ensure_non_empty(buffer)?;
    let (width, height) = buffer.dimensions();

    let monochrome = is_monochrome(buffer);
    if !monochrome {
        desaturate(buffer, settings.gray_method);
    }
    tracing::debug!(
        width,
        height,
        mode = ?settings.mode,
        monochrome,
        "colorizing"
    );

    let intensity = f32::from(settings.intensity.min(10)) / 10.0;
    let user = color::parse_hex_or(&settings.color, color::NEUTRAL_GRAY);
    let mix = f32::from(settings.color_intensity.min(100)) / 100.0;
    let palette = settings.style.palette();

    #[allow(clippy::cast_precision_loss)]
    let (fw, fh) = (width as f32, height as f32);

    for (x, y, px) in buffer.enumerate_pixels_mut() {
        let gray = gray_value(px[0], px[1], px[2], settings.gray_method);
        let normalized = gray / 255.0;
        let target = match settings.mode {
            ColorizeMode::Auto => auto_color(normalized, settings.skin_detection),
            ColorizeMode::Manual => {
                #[allow(clippy::cast_precision_loss)]
                let (nx, ny) = ((x as f32 + 0.5) / fw, (y as f32 + 0.5) / fh);
                manual_color(normalized, nx, ny, user, mix)
            }
            ColorizeMode::Style => palette[tonal_band(normalized)],
        };
        let Rgb([r, g, b]) = blend(gray, target, intensity, jitter);
        px[0] = r;
        px[1] = g;
        px[2] = b;
    }

    if settings.enhance_details {
        kernels::sharpen(buffer, kernels::SHARPEN_WEIGHT);
    }
    if settings.smooth {
        kernels::smooth(buffer, kernels::SMOOTH_WEIGHT);
    }
    Ok(())
}

/// Settings for [`grayscale`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrayscaleSettings {
    /// How gray values are computed.
    pub method: GrayMethod,
    /// Brightness shift, `-100..=100` percent of full range.
    pub brightness: i32,
    /// Contrast, `-100..=100`.
    pub contrast: i32,
}

/// Convert to grayscale with optional brightness and contrast adjustment.
///
/// # Errors
///
/// Returns [`crate::Error::EmptyImage`] for a zero-area buffer.
#[allow(clippy::cast_precision_loss)]
pub fn grayscale(buffer: &mut PixelBuffer, settings: &GrayscaleSettings) -> Result<()> {
    ensure_non_empty(buffer)?;
    let c = settings.contrast.clamp(-100, 100) as f32 * 2.55;
    let factor = (259.0 * (c + 255.0)) / (255.0 * (259.0 - c));
    let shift = settings.brightness.clamp(-100, 100) as f32 * 2.55;

    for px in buffer.pixels_mut() {
        let g = gray_value(px[0], px[1], px[2], settings.method);
        let v = clamp_channel(factor * (g - 128.0) + 128.0 + shift);
        px[0] = v;
        px[1] = v;
        px[2] = v;
    }
    Ok(())
}

/// Toning applied by old-photo restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Tint {
    /// Classic sepia matrix.
    #[default]
    Sepia,
    /// Sepia with lifted blacks, softened whites and a warm cast.
    Vintage,
}

impl From<String> for Tint {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "vintage" => Self::Vintage,
            _ => Self::Sepia,
        }
    }
}

fn sepia(r: f32, g: f32, b: f32) -> [f32; 3] {
    [
        0.393 * r + 0.769 * g + 0.189 * b,
        0.349 * r + 0.686 * g + 0.168 * b,
        0.272 * r + 0.534 * g + 0.131 * b,
    ]
}

/// Tone the buffer, blending the toned color with the original by `strength` (0 to 1).
pub fn tint(buffer: &mut PixelBuffer, tint: Tint, strength: f32) {
    let strength = strength.clamp(0.0, 1.0);
    for px in buffer.pixels_mut() {
        let (r, g, b) = (f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
        let toned = match tint {
            Tint::Sepia => sepia(r, g, b),
            Tint::Vintage => {
                let [sr, sg, sb] = sepia(r, g, b).map(|v| v.min(255.0));
                let fade = |v: f32| 30.0 + v * 0.8;
                [fade(sr) * 1.05, fade(sg), fade(sb) * 0.9]
            }
        };
        for (c, value) in toned.iter().enumerate() {
            px[c] = clamp_channel(f32::from(px[c]) * (1.0 - strength) + value * strength);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, _| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (x * 255 / (width - 1)) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn uniform_gray_is_monochrome() {
        let buf = PixelBuffer::from_pixel(20, 20, Rgba([128, 128, 128, 255]));
        assert!(is_monochrome(&buf));
    }

    #[test]
    fn alternating_red_green_is_not_monochrome() {
        let buf = PixelBuffer::from_fn(10, 10, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });
        assert!(!is_monochrome(&buf));
    }

    #[test]
    fn empty_buffer_counts_as_monochrome() {
        assert!(is_monochrome(&PixelBuffer::new(0, 0)));
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(tonal_band(0.0), 0);
        assert_eq!(tonal_band(0.19), 0);
        assert_eq!(tonal_band(0.2), 1);
        assert_eq!(tonal_band(0.55), 3);
        assert_eq!(tonal_band(0.9), 6);
        assert_eq!(tonal_band(1.0), 6);
    }

    #[test]
    fn skin_detection_swaps_mid_bands_only() {
        assert_eq!(auto_color(0.3, true), SKIN_TONES[0]);
        assert_eq!(auto_color(0.4, true), SKIN_TONES[1]);
        assert_eq!(auto_color(0.3, false), AUTO_PALETTE[1]);
        assert_eq!(auto_color(0.1, true), AUTO_PALETTE[0]);
        assert_eq!(auto_color(0.6, true), AUTO_PALETTE[3]);
    }

    #[test]
    fn manual_color_is_position_gated() {
        let user = Rgb([0, 0, 0]);
        assert_eq!(manual_color(0.5, 0.5, 0.5, user, 0.0), FACE_TONE);
        assert_eq!(manual_color(0.7, 0.1, 0.1, user, 0.0), SKY_TONE);
        assert_eq!(manual_color(0.2, 0.1, 0.9, user, 0.0), GROUND_TONE);
        assert_eq!(manual_color(0.3, 0.05, 0.5, user, 0.0), VEGETATION_TONE);
        assert_eq!(manual_color(0.7, 0.1, 0.1, user, 1.0), user);
    }

    #[test]
    fn blend_preserves_lightness_without_jitter() {
        let out = blend(128.0, Rgb([200, 60, 60]), 1.0, &mut NoJitter);
        let hsl = rgb_to_hsl(out);
        assert!((hsl.l - 128.0 / 255.0).abs() < 0.01);
        assert!(hsl.s > 0.2);

        let gray = blend(128.0, Rgb([200, 60, 60]), 0.0, &mut NoJitter);
        assert_eq!(gray, Rgb([128, 128, 128]));
    }

    #[test]
    fn seeded_jitter_is_reproducible_and_bounded() {
        let mut a = RngJitter::seeded(7);
        let mut b = RngJitter::seeded(7);
        for _ in 0..100 {
            let fa = a.factor();
            assert_eq!(fa, b.factor());
            assert!((fa - 1.0).abs() <= 0.0251);
        }
    }

    #[test]
    fn colorize_keeps_alpha_and_adds_color() {
        let mut buf = gradient(32, 8);
        buf.get_pixel_mut(3, 3)[3] = 40;
        let settings = ColorizeSettings {
            intensity: 10,
            ..ColorizeSettings::default()
        };
        colorize(&mut buf, &settings, &mut NoJitter).unwrap();
        assert_eq!(buf.get_pixel(3, 3)[3], 40);
        assert!(!is_monochrome(&buf));
    }

    #[test]
    fn colorize_forces_grayscale_on_color_input() {
        let mut red = PixelBuffer::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        let mut gray = PixelBuffer::from_pixel(8, 8, Rgba([76, 76, 76, 255]));
        let settings = ColorizeSettings::default();
        colorize(&mut red, &settings, &mut NoJitter).unwrap();
        colorize(&mut gray, &settings, &mut NoJitter).unwrap();
        assert_eq!(red, gray);
    }

    #[test]
    fn colorize_is_deterministic_with_seeded_jitter() {
        let settings = ColorizeSettings {
            mode: ColorizeMode::Style,
            style: ColorStyle::Warm,
            ..ColorizeSettings::default()
        };
        let mut a = gradient(16, 4);
        let mut b = gradient(16, 4);
        colorize(&mut a, &settings, &mut RngJitter::seeded(42)).unwrap();
        colorize(&mut b, &settings, &mut RngJitter::seeded(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn colorize_rejects_empty_buffer() {
        let mut empty = PixelBuffer::new(0, 3);
        assert!(colorize(&mut empty, &ColorizeSettings::default(), &mut NoJitter).is_err());
    }

    #[test]
    fn unknown_names_fall_back() {
        assert_eq!(ColorStyle::from("neon".to_string()), ColorStyle::Natural);
        assert_eq!(ColorizeMode::from("magic".to_string()), ColorizeMode::Auto);
        assert_eq!(Tint::from("??".to_string()), Tint::Sepia);
        let settings: ColorizeSettings =
            serde_json::from_str(r#"{"mode":"style","style":"neon"}"#).unwrap();
        assert_eq!(settings.mode, ColorizeMode::Style);
        assert_eq!(settings.style, ColorStyle::Natural);
        assert_eq!(settings.intensity, 7);
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut buf = PixelBuffer::from_pixel(2, 2, Rgba([255, 0, 0, 9]));
        grayscale(&mut buf, &GrayscaleSettings::default()).unwrap();
        let px = buf.get_pixel(0, 0);
        assert_eq!(px.0, [76, 76, 76, 9]);
    }

    #[test]
    fn sepia_tint_warms_gray() {
        let mut buf = PixelBuffer::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        tint(&mut buf, Tint::Sepia, 1.0);
        let px = buf.get_pixel(0, 0);
        assert!(px[0] > px[1] && px[1] > px[2]);

        let mut untouched = PixelBuffer::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        tint(&mut untouched, Tint::Vintage, 0.0);
        assert_eq!(untouched.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }
}
