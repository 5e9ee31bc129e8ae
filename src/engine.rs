//! Operation dispatch and the file/directory batch driver.
//!
//! An [`Operation`] is a tool name plus its settings, deserialized from JSON
//! such as `{"tool": "resize", "width": 800}`. The [`Engine`] applies it to
//! decoded buffers and, for files, handles decoding and encoding around it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::background::{self, BackgroundSettings};
use crate::buffer::{PixelBuffer, Region};
use crate::clip::{self, IconSettings, RoundCornersSettings};
use crate::codec::{self, CompressSettings, EncodeOptions};
use crate::color;
use crate::error::{Error, Result};
use crate::grid::{self, JoinSettings, SliceSettings};
use crate::inpaint::{self, WatermarkRemovalSettings};
use crate::overlay::{self, WatermarkSettings};
use crate::remap::{self, ColorizeSettings, GrayscaleSettings, Jitter, RandomJitter, SeededJitter};
use crate::resample::{self, ResizeSettings, UpscaleSettings};
use crate::restore::{self, RestoreSettings};
use crate::text::{self, TextImageSettings};

/// Settings for the aspect-ratio crop.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AspectSettings {
    /// Ratio width term.
    pub ratio_width: u32,
    /// Ratio height term.
    pub ratio_height: u32,
}

impl Default for AspectSettings {
    fn default() -> Self {
        Self {
            ratio_width: 1,
            ratio_height: 1,
        }
    }
}

/// Settings for a multi-size icon set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconSetSettings {
    /// Edge lengths to produce.
    pub sizes: Vec<u32>,
    /// Shared icon styling; its `size` is ignored.
    pub icon: IconSettings,
}

impl Default for IconSetSettings {
    fn default() -> Self {
        Self {
            sizes: vec![16, 32, 48, 64, 128, 256],
            icon: IconSettings::default(),
        }
    }
}

/// Settings for a slice preview sheet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewSettings {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub columns: u32,
    /// Gap between cells in pixels.
    pub gap: u32,
    /// Gap color, `#RRGGBB`; transparent when absent.
    pub background: Option<String>,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            rows: 3,
            columns: 3,
            gap: 4,
            background: Some("#FFFFFF".to_string()),
        }
    }
}

/// One tool invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", rename_all = "camelCase")]
pub enum Operation {
    /// Tonal-band colorization.
    Colorize(ColorizeSettings),
    /// Grayscale conversion.
    Grayscale(GrayscaleSettings),
    /// Background replacement or removal.
    Background(BackgroundSettings),
    /// Downscale and re-encode.
    Compress(CompressSettings),
    /// Rounded corners.
    RoundCorners(RoundCornersSettings),
    /// Explicit rectangle crop.
    Crop(Region),
    /// Centred crop to an aspect ratio.
    CropAspect(AspectSettings),
    /// Resize to a target size.
    Resize(ResizeSettings),
    /// Scale by a factor with clean-up passes.
    Upscale(UpscaleSettings),
    /// Single icon.
    Icon(IconSettings),
    /// Icons at several sizes.
    IconSet(IconSetSettings),
    /// Join all inputs into one image.
    Join(JoinSettings),
    /// Cut each input into a grid of tiles.
    Slice(SliceSettings),
    /// Slice and reassemble with visible gaps.
    SlicePreview(PreviewSettings),
    /// Old-photo restoration.
    Restore(RestoreSettings),
    /// Text or image watermark.
    Watermark(WatermarkSettings),
    /// Watermark repair.
    RemoveWatermark(WatermarkRemovalSettings),
    /// Render text onto a generated background; takes no input image.
    TextToImage(TextImageSettings),
}

impl Operation {
    /// Parse an operation from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] for malformed JSON or an unknown tool.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Short tool name, used in output file names.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Colorize(_) => "colorize",
            Self::Grayscale(_) => "grayscale",
            Self::Background(_) => "background",
            Self::Compress(_) => "compress",
            Self::RoundCorners(_) => "rounded",
            Self::Crop(_) | Self::CropAspect(_) => "crop",
            Self::Resize(_) => "resize",
            Self::Upscale(_) => "upscale",
            Self::Icon(_) | Self::IconSet(_) => "icon",
            Self::Join(_) => "joined",
            Self::Slice(_) => "slice",
            Self::SlicePreview(_) => "preview",
            Self::Restore(_) => "restored",
            Self::Watermark(_) => "watermarked",
            Self::RemoveWatermark(_) => "cleaned",
            Self::TextToImage(_) => "text",
        }
    }

    /// Whether the operation consumes an input image.
    #[must_use]
    pub fn needs_input(&self) -> bool {
        !matches!(self, Self::TextToImage(_))
    }

    /// Whether the operation merges all inputs into one output.
    #[must_use]
    pub fn is_many_to_one(&self) -> bool {
        matches!(self, Self::Join(_))
    }

    /// Encoder options for a result, starting from `base`.
    #[must_use]
    pub fn encode_options(&self, result: &PixelBuffer, base: &EncodeOptions) -> EncodeOptions {
        match self {
            Self::Compress(settings) => {
                let mut options = settings.encode_options(result.width(), result.height());
                options.format = options.format.or(base.format);
                options
            }
            _ => base.clone(),
        }
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Files written.
    pub outputs: Vec<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        tracing::warn!(path = %path.display(), %message, "processing failed");
        Self {
            path: path.to_path_buf(),
            outputs: Vec::new(),
            success: false,
            message,
        }
    }
}

/// Success and failure counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Inputs that succeeded.
    pub success_count: usize,
    /// Inputs that failed.
    pub error_count: usize,
}

impl BatchSummary {
    /// Count the outcomes of a file batch.
    #[must_use]
    pub fn from_results(results: &[ProcessResult]) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            success_count,
            error_count: results.len() - success_count,
        }
    }
}

/// Outputs of an in-memory batch, one entry per input.
#[derive(Debug)]
pub struct BatchOutput {
    /// Produced buffers, or `None` where the input failed.
    pub outputs: Vec<Option<Vec<PixelBuffer>>>,
    /// Counts.
    pub summary: BatchSummary,
}

/// Applies operations to buffers and files.
///
/// Stateless apart from an optional jitter seed, so one engine can serve
/// many images, also from several threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine {
    seed: Option<u64>,
}

impl Engine {
    /// An engine with non-reproducible colorization jitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose colorization jitter is seeded, for reproducible output.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn jitter(&self) -> Box<dyn Jitter> {
        match self.seed {
            Some(seed) => Box::new(SeededJitter::seeded(seed)),
            None => Box::new(RandomJitter::thread()),
        }
    }

    /// Apply `operation` to one image.
    ///
    /// Most tools return a single buffer; slicing and icon sets return several.
    ///
    /// # Errors
    ///
    /// Propagates the tool's error; [`Error::InvalidParameter`] for
    /// [`Operation::TextToImage`], which takes no input.
    pub fn apply(&self, input: &PixelBuffer, operation: &Operation) -> Result<Vec<PixelBuffer>> {
        let out = match operation {
            Operation::Colorize(settings) => in_place(input, |buf| {
                remap::colorize(buf, settings, self.jitter().as_mut())
            })?,
            Operation::Grayscale(settings) => {
                in_place(input, |buf| remap::grayscale(buf, settings))?
            }
            Operation::Background(settings) => {
                in_place(input, |buf| background::apply(buf, settings).map(drop))?
            }
            Operation::Compress(settings) => settings.fit(input)?,
            Operation::RoundCorners(settings) => {
                in_place(input, |buf| clip::round_corners(buf, settings))?
            }
            Operation::Crop(region) => clip::crop(input, region)?,
            Operation::CropAspect(settings) => {
                clip::crop_to_aspect(input, settings.ratio_width, settings.ratio_height)?
            }
            Operation::Resize(settings) => resample::resize(input, settings)?,
            Operation::Upscale(settings) => resample::upscale(input, settings)?,
            Operation::Icon(settings) => clip::generate_icon(input, settings)?,
            Operation::IconSet(settings) => {
                return clip::generate_icon_set(input, &settings.sizes, &settings.icon);
            }
            Operation::Join(settings) => grid::join(std::slice::from_ref(input), settings)?,
            Operation::Slice(settings) => return grid::slice(input, settings),
            Operation::SlicePreview(settings) => {
                let slicing = SliceSettings {
                    rows: settings.rows,
                    columns: settings.columns,
                };
                grid::slice_preview(input, &slicing, settings.gap, settings.background.clone())?
            }
            Operation::Restore(settings) => {
                in_place(input, |buf| restore::restore(buf, settings).map(drop))?
            }
            Operation::Watermark(settings) => {
                in_place(input, |buf| apply_watermark(buf, settings))?
            }
            Operation::RemoveWatermark(settings) => in_place(input, |buf| {
                inpaint::remove_watermark(buf, settings).map(drop)
            })?,
            Operation::TextToImage(_) => {
                return Err(Error::InvalidParameter(
                    "textToImage renders from settings and takes no input".to_string(),
                ));
            }
        };
        Ok(vec![out])
    }

    /// Apply `operation` to several images.
    ///
    /// [`Operation::Join`] merges them into one buffer; every other tool is
    /// applied to each input in turn.
    ///
    /// # Errors
    ///
    /// Fails on the first input that fails.
    pub fn apply_many(
        &self,
        inputs: &[PixelBuffer],
        operation: &Operation,
    ) -> Result<Vec<PixelBuffer>> {
        if let Operation::Join(settings) = operation {
            return Ok(vec![grid::join(inputs, settings)?]);
        }
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.extend(self.apply(input, operation)?);
        }
        Ok(outputs)
    }

    /// Run a generator operation that needs no input image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for operations that need an input.
    pub fn render(&self, operation: &Operation) -> Result<PixelBuffer> {
        match operation {
            Operation::TextToImage(settings) => text::text_to_image(settings),
            other => Err(Error::InvalidParameter(format!(
                "{} needs an input image",
                other.name()
            ))),
        }
    }

    /// Apply each item's operation to its buffer independently.
    ///
    /// Every item carries its own settings. A failing item, bad input or bad
    /// settings alike, is logged and counted; the batch carries on.
    #[must_use]
    pub fn run_batch(&self, items: &[(PixelBuffer, Operation)]) -> BatchOutput {
        let mut summary = BatchSummary::default();
        let outputs = items
            .iter()
            .enumerate()
            .map(|(index, (input, operation))| match self.apply(input, operation) {
                Ok(buffers) => {
                    summary.success_count += 1;
                    Some(buffers)
                }
                Err(e) => {
                    tracing::warn!(index, tool = operation.name(), error = %e, "batch item failed");
                    summary.error_count += 1;
                    None
                }
            })
            .collect();
        tracing::info!(
            success = summary.success_count,
            failed = summary.error_count,
            "batch finished"
        );
        BatchOutput { outputs, summary }
    }

    /// Process a single image file: load, apply, save.
    ///
    /// Several results are written as `<stem>_<n>.<ext>` next to `output`.
    #[must_use]
    pub fn process_file(
        &self,
        input: &Path,
        output: &Path,
        operation: &Operation,
        encode: &EncodeOptions,
    ) -> ProcessResult {
        let buffer = match codec::open(input) {
            Ok(buffer) => buffer,
            Err(e) => return ProcessResult::failed(input, format!("Failed to load: {e}")),
        };
        let results = match self.apply(&buffer, operation) {
            Ok(results) => results,
            Err(e) => {
                return ProcessResult::failed(input, format!("{} failed: {e}", operation.name()));
            }
        };
        match write_outputs(&results, output, operation, encode) {
            Ok(outputs) => {
                tracing::debug!(input = %input.display(), count = outputs.len(), "written");
                ProcessResult {
                    path: input.to_path_buf(),
                    message: format!("{} -> {} file(s)", operation.name(), outputs.len()),
                    outputs,
                    success: true,
                }
            }
            Err(e) => ProcessResult::failed(input, format!("Failed to save: {e}")),
        }
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// [`Operation::Join`] instead merges every image, in file name order,
    /// into a single `joined` file in `output_dir`.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        operation: &Operation,
        encode: &EncodeOptions,
    ) -> Vec<ProcessResult> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| codec::is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult::failed(
                    input_dir,
                    format!("Failed to read directory: {e}"),
                )];
            }
        };
        entries.sort();

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult::failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        if operation.is_many_to_one() {
            return vec![self.join_files(&entries, input_dir, output_dir, operation, encode)];
        }

        let output_for = |input: &Path| -> PathBuf {
            let name = input.file_name().map_or_else(
                || PathBuf::from(operation.name()),
                PathBuf::from,
            );
            match encode.format {
                Some(format) => output_dir.join(name).with_extension(format.extension()),
                None => output_dir.join(name),
            }
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries
                .par_iter()
                .map(|input| self.process_file(input, &output_for(input), operation, encode))
                .collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries
                .iter()
                .map(|input| self.process_file(input, &output_for(input), operation, encode))
                .collect()
        }
    }

    fn join_files(
        &self,
        entries: &[PathBuf],
        input_dir: &Path,
        output_dir: &Path,
        operation: &Operation,
        encode: &EncodeOptions,
    ) -> ProcessResult {
        let mut buffers = Vec::with_capacity(entries.len());
        for path in entries {
            match codec::open(path) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                }
            }
        }
        let joined = match self.apply_many(&buffers, operation) {
            Ok(joined) => joined,
            Err(e) => return ProcessResult::failed(input_dir, format!("join failed: {e}")),
        };
        let ext = encode.format.unwrap_or_default().extension();
        let output = output_dir.join(format!("{}.{ext}", operation.name()));
        match write_outputs(&joined, &output, operation, encode) {
            Ok(outputs) => ProcessResult {
                path: input_dir.to_path_buf(),
                message: format!("joined {} image(s)", buffers.len()),
                outputs,
                success: true,
            },
            Err(e) => ProcessResult::failed(input_dir, format!("Failed to save: {e}")),
        }
    }
}

/// Run an in-place transform on a copy of `input`.
fn in_place(
    input: &PixelBuffer,
    transform: impl FnOnce(&mut PixelBuffer) -> Result<()>,
) -> Result<PixelBuffer> {
    let mut out = input.clone();
    transform(&mut out)?;
    Ok(out)
}

/// Draw a text or image watermark.
fn apply_watermark(buffer: &mut PixelBuffer, settings: &WatermarkSettings) -> Result<()> {
    match &settings.image {
        Some(path) => {
            let element = codec::open(path)?;
            overlay::overlay_image(buffer, &element, &settings.overlay)
        }
        None => {
            let fill = color::parse_hex_or(&settings.color, color::WHITE);
            overlay::overlay_text(
                buffer,
                &settings.text,
                settings.font_size,
                fill,
                &settings.overlay,
            )
        }
    }
}

/// `photo.png` with index 2 becomes `photo_2.png`.
fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let mut numbered = path.with_file_name(format!("{stem}_{index}"));
    if let Some(ext) = path.extension() {
        numbered.set_extension(ext);
    }
    numbered
}

/// Write one or more results; returns the written paths.
fn write_outputs(
    results: &[PixelBuffer],
    output: &Path,
    operation: &Operation,
    encode: &EncodeOptions,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(results.len());
    for (index, result) in results.iter().enumerate() {
        let path = if results.len() == 1 {
            output.to_path_buf()
        } else {
            numbered_path(output, index + 1)
        };
        let options = operation.encode_options(result, encode);
        let bytes = codec::save(result, &path, &options)?;
        tracing::debug!(path = %path.display(), bytes, "saved");
        written.push(path);
    }
    Ok(written)
}
