//! Region repair from surrounding context.
//!
//! Every repair reads from a snapshot and blends its estimate into the
//! original pixel at an intensity, so region boundaries stay soft. Alpha is
//! left untouched.

use serde::Deserialize;

use crate::buffer::{clamp_channel, ensure_non_empty, Mask, PixelBuffer, Region};
use crate::classify::{edge_strength, texture_score};
use crate::error::{Error, Result};

/// The 8 compass directions.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Minimum context padding of the advanced repair.
const MIN_PADDING: u32 = 15;
/// Context padding as a fraction of the region's longer side.
const PADDING_FRACTION: f32 = 0.15;
/// Distance scale of the first advanced pass.
const BASE_SCALE: f32 = 5.0;
/// Passes after the base pass.
const EXTRA_PASSES: u32 = 3;
/// Scale added per pass.
const SCALE_STEP: f32 = 2.0;
/// Intensity multiplier per pass.
const INTENSITY_GROWTH: f32 = 1.2;
/// Context samples per pixel above which the advanced repair strides.
const MAX_WINDOW_SAMPLES: u32 = 4096;
/// Largest half-width of the mask repair window.
const MAX_MASK_RADIUS: u32 = 8;
/// Unmasked samples that end the window growth.
const MIN_MASK_SAMPLES: u32 = 4;

/// Acceptance thresholds per candidate class.
const CORNER_THRESHOLD: f32 = 0.3;
const BAND_THRESHOLD: f32 = 0.35;
const CENTER_THRESHOLD: f32 = 0.4;

fn clip_region(buffer: &PixelBuffer, region: &Region) -> Result<Region> {
    ensure_non_empty(buffer)?;
    region
        .clipped_to(buffer.width(), buffer.height())
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "region {}x{} at ({}, {}) lies outside the {}x{} image",
                region.width,
                region.height,
                region.x,
                region.y,
                buffer.width(),
                buffer.height()
            ))
        })
}

/// Walk from `(x, y)` in direction `(dx, dy)` to the first pixel outside
/// `region`. Returns the step count, or `None` if the walk leaves the image.
fn first_outside(
    region: &Region,
    width: u32,
    height: u32,
    (x, y): (u32, u32),
    (dx, dy): (i64, i64),
) -> Option<i64> {
    let mut k = 1i64;
    loop {
        let px = i64::from(x) + dx * k;
        let py = i64::from(y) + dy * k;
        let (Ok(px), Ok(py)) = (u32::try_from(px), u32::try_from(py)) else {
            return None;
        };
        if px >= width || py >= height {
            return None;
        }
        if !region.contains(px, py) {
            return Some(k);
        }
        k += 1;
    }
}

fn blend_into(px: &mut image::Rgba<u8>, estimate: [f32; 3], intensity: f32) {
    for (c, e) in estimate.iter().enumerate() {
        px[c] = clamp_channel(f32::from(px[c]) * (1.0 - intensity) + e * intensity);
    }
}

/// Flat repair: each pixel becomes the unweighted mean of the nearest pixels
/// outside `region` in the 8 compass directions, blended at `intensity` (0 to 1).
///
/// Directions that leave the image contribute nothing; a pixel with no
/// samples at all is left as is.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `region` does not intersect the image.
pub fn repair(buffer: &mut PixelBuffer, region: &Region, intensity: f32) -> Result<()> {
    let region = clip_region(buffer, region)?;
    let intensity = intensity.clamp(0.0, 1.0);
    let source = buffer.clone();
    let (width, height) = source.dimensions();

    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let mut sum = [0.0f32; 3];
            let mut count = 0u8;
            for &(dx, dy) in &DIRECTIONS {
                let Some(k) = first_outside(&region, width, height, (x, y), (dx, dy)) else {
                    continue;
                };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let sample = source.get_pixel(
                    (i64::from(x) + dx * k) as u32,
                    (i64::from(y) + dy * k) as u32,
                );
                for (s, &v) in sum.iter_mut().zip(&sample.0[..3]) {
                    *s += f32::from(v);
                }
                count += 1;
            }
            if count > 0 {
                let n = f32::from(count);
                blend_into(buffer.get_pixel_mut(x, y), sum.map(|s| s / n), intensity);
            }
        }
    }
    tracing::debug!(?region, intensity, "region repaired");
    Ok(())
}

/// Distance from `(x, y)` to the nearest pixel of `window` outside `region`,
/// or `None` when the window holds no such pixel.
fn nearest_context(region: &Region, window: &Region, (x, y): (u32, u32)) -> Option<u32> {
    [
        (window.x < region.x).then_some(x - region.x + 1),
        (window.right() > region.right()).then_some(region.right() - x),
        (window.y < region.y).then_some(y - region.y + 1),
        (window.bottom() > region.bottom()).then_some(region.bottom() - y),
    ]
    .into_iter()
    .flatten()
    .min()
}

/// One weighted pass over the padded window around `region`: every window
/// pixel outside the region is weighted `exp(-distance / scale)`.
///
/// Weights are taken relative to the nearest context pixel so deep interior
/// pixels do not underflow. Large windows are sampled on a stride that keeps
/// roughly [`MAX_WINDOW_SAMPLES`] samples per pixel.
fn weighted_pass(
    buffer: &mut PixelBuffer,
    region: &Region,
    padding: u32,
    scale: f32,
    intensity: f32,
) {
    let source = buffer.clone();
    let (width, height) = source.dimensions();
    let window = region.padded(padding, width, height);
    let context = window.area().saturating_sub(region.area());
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let stride =
        ((context as f64 / f64::from(MAX_WINDOW_SAMPLES)).sqrt().ceil() as usize).max(1);

    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let Some(nearest) = nearest_context(region, &window, (x, y)) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let nearest = nearest as f32;
            let mut sum = [0.0f32; 3];
            let mut total = 0.0f32;
            for sy in (window.y..window.bottom()).step_by(stride) {
                for sx in (window.x..window.right()).step_by(stride) {
                    if region.contains(sx, sy) {
                        continue;
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    let distance = (f64::from(sx) - f64::from(x))
                        .hypot(f64::from(sy) - f64::from(y)) as f32;
                    let weight = (-(distance - nearest).max(0.0) / scale).exp();
                    let sample = source.get_pixel(sx, sy);
                    for (s, &v) in sum.iter_mut().zip(&sample.0[..3]) {
                        *s += f32::from(v) * weight;
                    }
                    total += weight;
                }
            }
            if total > 0.0 {
                blend_into(buffer.get_pixel_mut(x, y), sum.map(|s| s / total), intensity);
            }
        }
    }
}

/// Multi-pass distance-weighted repair.
///
/// Context padding is `max(15, 15% of the longer region side)` and the whole
/// padded window feeds every pass. A base pass at scale 5 is followed by 3
/// passes, each widening the scale by 2 and raising the intensity by 20%
/// (capped at 1).
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `region` does not intersect the image.
pub fn repair_advanced(buffer: &mut PixelBuffer, region: &Region, intensity: f32) -> Result<()> {
    let region = clip_region(buffer, region)?;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let padding =
        MIN_PADDING.max((region.width.max(region.height) as f32 * PADDING_FRACTION) as u32);

    let mut scale = BASE_SCALE;
    let mut strength = intensity.clamp(0.0, 1.0);
    for pass in 0..=EXTRA_PASSES {
        weighted_pass(buffer, &region, padding, scale, strength);
        tracing::trace!(pass, scale, strength, "weighted repair pass");
        scale += SCALE_STEP;
        strength = (strength * INTENSITY_GROWTH).min(1.0);
    }
    tracing::debug!(?region, padding, "region repaired (multi-pass)");
    Ok(())
}

/// Repair every masked pixel from the mean of unmasked pixels in a window that
/// grows until it holds enough samples. Returns the number of repaired pixels.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask does not match the buffer.
pub fn repair_mask(buffer: &mut PixelBuffer, mask: &Mask, intensity: f32) -> Result<usize> {
    mask.ensure_matches(buffer)?;
    let intensity = intensity.clamp(0.0, 1.0);
    let source = buffer.clone();
    let (width, height) = source.dimensions();
    let mut repaired = 0;

    for y in 0..height {
        for x in 0..width {
            if !mask.contains(x, y) {
                continue;
            }
            for radius in 1..=MAX_MASK_RADIUS {
                let mut sum = [0.0f32; 3];
                let mut count = 0u32;
                for ny in y.saturating_sub(radius)..=(y + radius).min(height - 1) {
                    for nx in x.saturating_sub(radius)..=(x + radius).min(width - 1) {
                        if mask.contains(nx, ny) {
                            continue;
                        }
                        let sample = source.get_pixel(nx, ny);
                        for (s, &v) in sum.iter_mut().zip(&sample.0[..3]) {
                            *s += f32::from(v);
                        }
                        count += 1;
                    }
                }
                if count >= MIN_MASK_SAMPLES || (radius == MAX_MASK_RADIUS && count > 0) {
                    #[allow(clippy::cast_precision_loss)]
                    let n = count as f32;
                    blend_into(buffer.get_pixel_mut(x, y), sum.map(|s| s / n), intensity);
                    repaired += 1;
                    break;
                }
            }
        }
    }
    tracing::debug!(repaired, "masked pixels repaired");
    Ok(repaired)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fraction(value: u32, f: f32) -> u32 {
    (f64::from(value) * f64::from(f)).round().max(1.0) as u32
}

/// Score fixed candidate rectangles and keep those whose edge strength or
/// texture exceeds their class threshold.
///
/// Candidates are the four corners (20% x 15% of the image), the top and
/// bottom bands (full width x 10%) and a centred 40% x 20% box. Accepted
/// regions carry their score as confidence, highest first.
#[must_use]
pub fn detect_candidate_regions(buffer: &PixelBuffer) -> Vec<Region> {
    let (width, height) = buffer.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let (cw, ch) = (fraction(width, 0.2), fraction(height, 0.15));
    let band = fraction(height, 0.1);
    let (mw, mh) = (fraction(width, 0.4), fraction(height, 0.2));

    let candidates = [
        (Region::new(0, 0, cw, ch), CORNER_THRESHOLD),
        (Region::new(width.saturating_sub(cw), 0, cw, ch), CORNER_THRESHOLD),
        (Region::new(0, height.saturating_sub(ch), cw, ch), CORNER_THRESHOLD),
        (
            Region::new(width.saturating_sub(cw), height.saturating_sub(ch), cw, ch),
            CORNER_THRESHOLD,
        ),
        (Region::new(0, 0, width, band), BAND_THRESHOLD),
        (Region::new(0, height.saturating_sub(band), width, band), BAND_THRESHOLD),
        (
            Region::new((width - mw.min(width)) / 2, (height - mh.min(height)) / 2, mw, mh),
            CENTER_THRESHOLD,
        ),
    ];

    let mut accepted: Vec<Region> = candidates
        .iter()
        .filter_map(|(region, threshold)| {
            let region = region.clipped_to(width, height)?;
            let score = edge_strength(buffer, &region).max(texture_score(buffer, &region));
            tracing::trace!(?region, score, threshold, "candidate scored");
            (score > *threshold).then(|| region.with_confidence(score))
        })
        .collect();
    accepted.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .total_cmp(&a.confidence.unwrap_or(0.0))
    });
    tracing::debug!(count = accepted.len(), "candidate regions detected");
    accepted
}

/// Where watermark regions come from and how they are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum RemovalMode {
    /// User-supplied regions, flat repair.
    Manual,
    /// Detected regions, flat repair.
    #[default]
    Auto,
    /// Detected regions, multi-pass weighted repair.
    Ai,
}

impl From<String> for RemovalMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Self::Manual,
            "ai" => Self::Ai,
            _ => Self::Auto,
        }
    }
}

/// Settings for [`remove_watermark`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkRemovalSettings {
    /// Region source and repair variant.
    pub mode: RemovalMode,
    /// Regions for [`RemovalMode::Manual`].
    pub regions: Vec<Region>,
    /// Blend strength, 0 to 1.
    pub intensity: f32,
}

impl Default for WatermarkRemovalSettings {
    fn default() -> Self {
        Self {
            mode: RemovalMode::Auto,
            regions: Vec::new(),
            intensity: 0.8,
        }
    }
}

/// Repair watermark regions in place and return the regions that were filled.
///
/// Detection modes that find nothing leave the buffer untouched.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for manual mode without regions or
/// with a region outside the image.
pub fn remove_watermark(
    buffer: &mut PixelBuffer,
    settings: &WatermarkRemovalSettings,
) -> Result<Vec<Region>> {
    ensure_non_empty(buffer)?;
    let regions = match settings.mode {
        RemovalMode::Manual => {
            if settings.regions.is_empty() {
                return Err(Error::InvalidParameter(
                    "manual watermark removal needs at least one region".to_string(),
                ));
            }
            settings.regions.clone()
        }
        RemovalMode::Auto | RemovalMode::Ai => detect_candidate_regions(buffer),
    };
    if regions.is_empty() {
        tracing::info!("no watermark candidates found");
    }

    for region in &regions {
        match settings.mode {
            RemovalMode::Ai => repair_advanced(buffer, region, settings.intensity)?,
            RemovalMode::Manual | RemovalMode::Auto => repair(buffer, region, settings.intensity)?,
        }
    }
    Ok(regions)
}
