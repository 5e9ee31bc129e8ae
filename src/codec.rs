//! Decoding and encoding of pixel buffers, plus the file helpers used by the
//! batch driver.

use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use serde::Deserialize;

use crate::buffer::{ensure_non_empty, PixelBuffer};
use crate::error::{Error, Result};
use crate::resample::{estimate_quality, resize, Algorithm, ResizeSettings};

/// Encoded file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// Baseline JPEG; alpha is flattened onto white.
    Jpeg,
    /// WebP (lossless container, quality applied by pre-quantizing).
    WebP,
    /// Uncompressed BMP.
    Bmp,
}

impl From<String> for OutputFormat {
    fn from(value: String) -> Self {
        Self::from_extension(&value).unwrap_or_default()
    }
}

impl OutputFormat {
    /// Format for a file extension or format name, case-insensitive.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Format implied by the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for a missing or unknown extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))
    }

    /// Canonical file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
        }
    }

    /// Whether the quality knob changes the output.
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg | Self::WebP)
    }
}

/// Drop alpha by compositing onto white.
fn flatten(buffer: &PixelBuffer) -> RgbImage {
    RgbImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let px = buffer.get_pixel(x, y);
        let a = u32::from(px[3]);
        let mix = |c: u8| {
            let value = (u32::from(c) * a + 255 * (255 - a) + 127) / 255;
            u8::try_from(value).unwrap_or(u8::MAX)
        };
        Rgb([mix(px[0]), mix(px[1]), mix(px[2])])
    })
}

/// Posterize color channels so a lossless encoder compresses harder.
/// Quality 100 keeps every level; lower qualities snap to coarser steps.
fn quantize(buffer: &PixelBuffer, quality: u8) -> PixelBuffer {
    let step = u16::from(100 - quality.min(100)) / 4 + 1;
    if step == 1 {
        return buffer.clone();
    }
    let mut out = buffer.clone();
    for px in out.pixels_mut() {
        for c in &mut px.0[..3] {
            let snapped = u16::from(*c) / step * step + step / 2;
            *c = u8::try_from(snapped.min(255)).unwrap_or(u8::MAX);
        }
    }
    out
}

/// Encode `buffer` as `format`. `quality` (1-100) applies to JPEG and WebP.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] for a zero-area buffer and [`Error::Image`]
/// if the encoder fails.
pub fn encode(buffer: &PixelBuffer, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    ensure_non_empty(buffer)?;
    let quality = quality.clamp(1, 100);
    let (width, height) = buffer.dimensions();
    let mut bytes = Vec::new();

    match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut bytes).write_image(
                buffer.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
        OutputFormat::Jpeg => {
            let rgb = flatten(buffer);
            JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        OutputFormat::WebP => {
            let quantized = quantize(buffer, quality);
            WebPEncoder::new_lossless(&mut bytes).write_image(
                quantized.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
        OutputFormat::Bmp => {
            BmpEncoder::new(&mut bytes).write_image(
                buffer.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
    }

    tracing::debug!(?format, quality, bytes = bytes.len(), "encoded");
    Ok(bytes)
}

/// Binary-search the highest quality whose encoding fits in `target_kb`
/// kilobytes (1 kB = 1000 bytes).
///
/// Returns the bytes and the chosen quality. When even quality 1 is too large
/// the quality-1 encoding is returned anyway.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_to_size(
    buffer: &PixelBuffer,
    format: OutputFormat,
    target_kb: u64,
) -> Result<(Vec<u8>, u8)> {
    let budget = usize::try_from(target_kb.saturating_mul(1000)).unwrap_or(usize::MAX);
    let (mut lo, mut hi) = (1u8, 100u8);
    let mut best: Option<(Vec<u8>, u8)> = None;

    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let bytes = encode(buffer, format, mid)?;
        if bytes.len() <= budget {
            best = Some((bytes, mid));
            lo = mid + 1;
        } else if mid == 1 {
            break;
        } else {
            hi = mid - 1;
        }
    }

    match best {
        Some(found) => Ok(found),
        None => {
            tracing::warn!(target_kb, ?format, "size budget unreachable, using quality 1");
            Ok((encode(buffer, format, 1)?, 1))
        }
    }
}

/// Decode an in-memory image of any supported format.
///
/// # Errors
///
/// Returns [`Error::Image`] for undecodable input.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Load and decode an image file.
///
/// # Errors
///
/// Returns [`Error::Image`] if the file cannot be opened or decoded.
pub fn open(path: &Path) -> Result<PixelBuffer> {
    Ok(image::open(path)?.to_rgba8())
}

/// How a result is written to disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeOptions {
    /// Output format; taken from the path extension when absent.
    pub format: Option<OutputFormat>,
    /// Quality 1-100 for lossy formats.
    pub quality: u8,
    /// Size budget in kilobytes; overrides `quality` for lossy formats.
    pub target_kb: Option<u64>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format: None,
            quality: 92,
            target_kb: None,
        }
    }
}

/// Settings for the compress tool: optional downscale plus encoder options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressSettings {
    /// Output format; the input's format when absent.
    pub format: Option<OutputFormat>,
    /// Quality 1-100 when no size budget is given.
    pub quality: u8,
    /// Size budget in kilobytes.
    pub target_kb: Option<u64>,
    /// Hit the budget by searching encoder qualities; otherwise estimate a
    /// quality from the raw size.
    pub search: bool,
    /// Downscale to at most this width.
    pub max_width: Option<u32>,
    /// Downscale to at most this height.
    pub max_height: Option<u32>,
}

impl Default for CompressSettings {
    fn default() -> Self {
        Self {
            format: None,
            quality: 80,
            target_kb: None,
            search: true,
            max_width: None,
            max_height: None,
        }
    }
}

impl CompressSettings {
    /// Encoder options for a `width x height` result.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode_options(&self, width: u32, height: u32) -> EncodeOptions {
        match self.target_kb {
            Some(target_kb) if !self.search => EncodeOptions {
                format: self.format,
                quality: (estimate_quality(target_kb, width, height) * 100.0).round() as u8,
                target_kb: None,
            },
            target_kb => EncodeOptions {
                format: self.format,
                quality: self.quality,
                target_kb,
            },
        }
    }

    /// Downscale to fit the maximum dimensions, keeping the aspect ratio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero maximum.
    pub fn fit(&self, buffer: &PixelBuffer) -> Result<PixelBuffer> {
        ensure_non_empty(buffer)?;
        let (width, height) = buffer.dimensions();
        let too_wide = self.max_width.is_some_and(|m| width > m);
        let too_tall = self.max_height.is_some_and(|m| height > m);
        if !too_wide && !too_tall && self.max_width != Some(0) && self.max_height != Some(0) {
            return Ok(buffer.clone());
        }
        resize(
            buffer,
            &ResizeSettings {
                width: self.max_width,
                height: self.max_height,
                keep_aspect: true,
                algorithm: Algorithm::Lanczos,
            },
        )
    }
}

/// Encode `buffer` and write it to `path`, creating parent directories.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] when no format can be determined,
/// [`Error::Io`] if writing fails and encoder errors from [`encode`].
pub fn save(buffer: &PixelBuffer, path: &Path, options: &EncodeOptions) -> Result<usize> {
    let format = match options.format {
        Some(format) => format,
        None => OutputFormat::from_path(path)?,
    };
    let bytes = match options.target_kb {
        Some(target_kb) if format.is_lossy() => encode_to_size(buffer, format, target_kb)?.0,
        _ => encode(buffer, format, options.quality)?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &bytes)?;
    Ok(bytes.len())
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(OutputFormat::from_extension)
        .is_some()
}

/// Output path next to `input`: `photo.jpg` with tool `colorize` becomes
/// `photo_colorize.jpg`, or `photo_colorize.png` when `format` is PNG.
#[must_use]
pub fn default_output_path(input: &Path, tool: &str, format: Option<OutputFormat>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = format.map_or_else(
        || input.extension().unwrap_or_default().to_string_lossy().into_owned(),
        |f| f.extension().to_string(),
    );
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_{tool}.{ext}"))
}
