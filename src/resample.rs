//! Resampling: arbitrary resizes, aspect-preserving fits and upscaling with
//! optional clean-up passes.

use image::imageops::{self, FilterType};
use serde::Deserialize;

use crate::buffer::{ensure_dimensions, ensure_non_empty, PixelBuffer};
use crate::error::{Error, Result};
use crate::kernels;

/// Interpolation used when resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Algorithm {
    /// Nearest neighbour.
    Nearest,
    /// Linear (triangle) filter.
    #[default]
    Bilinear,
    /// Catmull-Rom cubic.
    Bicubic,
    /// Lanczos with a window of 3.
    Lanczos,
}

impl From<String> for Algorithm {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "nearest" => Self::Nearest,
            "bicubic" => Self::Bicubic,
            "lanczos" => Self::Lanczos,
            _ => Self::Bilinear,
        }
    }
}

impl Algorithm {
    /// The `image` filter implementing this algorithm.
    #[must_use]
    pub fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Resample `buffer` to exactly `width x height`.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] if the source or the requested size has zero area.
pub fn resample(
    buffer: &PixelBuffer,
    width: u32,
    height: u32,
    algorithm: Algorithm,
) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    ensure_dimensions(width, height)?;
    if buffer.dimensions() == (width, height) {
        return Ok(buffer.clone());
    }
    tracing::debug!(
        from = ?buffer.dimensions(),
        to = ?(width, height),
        ?algorithm,
        "resampling"
    );
    Ok(imageops::resize(buffer, width, height, algorithm.filter()))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled(value: u32, factor: f64) -> u32 {
    (f64::from(value) * factor).round().max(1.0) as u32
}

/// Settings for [`resize`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizeSettings {
    /// Target width.
    pub width: Option<u32>,
    /// Target height.
    pub height: Option<u32>,
    /// Preserve the source aspect ratio (fit inside the box when both sides are given).
    pub keep_aspect: bool,
    /// Interpolation.
    pub algorithm: Algorithm,
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            keep_aspect: true,
            algorithm: Algorithm::Bilinear,
        }
    }
}

impl ResizeSettings {
    /// Output size for a `width x height` source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when no target side is given or a
    /// given side is zero.
    pub fn target_dimensions(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(Error::InvalidParameter(
                "resize target must be at least 1 pixel".to_string(),
            ));
        }
        let (w, h) = (f64::from(width), f64::from(height));
        match (self.width, self.height) {
            (None, None) => Err(Error::InvalidParameter(
                "resize needs a width or a height".to_string(),
            )),
            (Some(tw), None) if self.keep_aspect => Ok((tw, scaled(height, f64::from(tw) / w))),
            (None, Some(th)) if self.keep_aspect => Ok((scaled(width, f64::from(th) / h), th)),
            (Some(tw), Some(th)) if self.keep_aspect => {
                let factor = (f64::from(tw) / w).min(f64::from(th) / h);
                Ok((scaled(width, factor), scaled(height, factor)))
            }
            (tw, th) => Ok((tw.unwrap_or(width), th.unwrap_or(height))),
        }
    }
}

/// Resize according to [`ResizeSettings`].
///
/// # Errors
///
/// See [`ResizeSettings::target_dimensions`] and [`resample`].
pub fn resize(buffer: &PixelBuffer, settings: &ResizeSettings) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    let (width, height) = settings.target_dimensions(buffer.width(), buffer.height())?;
    resample(buffer, width, height, settings.algorithm)
}

/// Settings for [`upscale`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpscaleSettings {
    /// Scale factor applied to both sides.
    pub scale: f32,
    /// Interpolation.
    pub algorithm: Algorithm,
    /// Laplacian sharpen pass afterwards.
    pub sharpen: bool,
    /// Gaussian smoothing pass afterwards.
    pub smooth: bool,
    /// Median denoise pass afterwards.
    pub reduce_noise: bool,
}

impl Default for UpscaleSettings {
    fn default() -> Self {
        Self {
            scale: 2.0,
            algorithm: Algorithm::Bicubic,
            sharpen: false,
            smooth: false,
            reduce_noise: false,
        }
    }
}

/// Scale up (or down) by a factor, then run the requested passes in the order
/// denoise, smooth, sharpen.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a non-positive or non-finite scale.
pub fn upscale(buffer: &PixelBuffer, settings: &UpscaleSettings) -> Result<PixelBuffer> {
    ensure_non_empty(buffer)?;
    if !settings.scale.is_finite() || settings.scale <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "scale must be positive, got {}",
            settings.scale
        )));
    }
    let factor = f64::from(settings.scale);
    let mut out = resample(
        buffer,
        scaled(buffer.width(), factor),
        scaled(buffer.height(), factor),
        settings.algorithm,
    )?;

    if settings.reduce_noise {
        kernels::denoise(&mut out, kernels::DENOISE_WEIGHT);
    }
    if settings.smooth {
        kernels::smooth(&mut out, kernels::SMOOTH_WEIGHT);
    }
    if settings.sharpen {
        kernels::sharpen(&mut out, kernels::SHARPEN_WEIGHT);
    }
    Ok(out)
}

/// Heuristic encoder quality for a size budget in kilobytes:
/// `target_kb / (width * height * 3 / 1000)`, clamped to `[0.1, 1]`.
///
/// The divisor is the raw RGB size in kilobytes, so this is a plain
/// compression ratio with no feedback from a real encoder. See
/// [`crate::codec::encode_to_size`] for the encoder-backed search.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn estimate_quality(target_kb: u64, width: u32, height: u32) -> f32 {
    let raw_kb = f64::from(width) * f64::from(height) * 3.0 / 1000.0;
    if raw_kb <= 0.0 {
        return 1.0;
    }
    ((target_kb as f64 / raw_kb) as f32).clamp(0.1, 1.0)
}
