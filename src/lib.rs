//! Pixel-level transforms behind a set of raster image tools.
//!
//! Every transform works on a decoded RGBA [`PixelBuffer`] plus a settings
//! record and returns a new buffer (or edits one in place). The families are:
//!
//! - [`remap`]: tonal-band colorization, grayscale and sepia/vintage toning
//! - [`kernels`]: 3x3 Laplacian, Gaussian and median operators
//! - [`classify`]: background, chroma-key and damage masks
//! - [`background`], [`clip`], [`overlay`], [`text`], [`grid`]: compositing
//! - [`resample`], [`codec`]: scaling and quality-aware encoding
//! - [`inpaint`], [`restore`]: region repair and photo restoration
//!
//! [`Engine`] ties them together behind a JSON-deserializable [`Operation`].
//!
//! # Quick Start
//!
//! ```no_run
//! use rasterkit::{codec, Engine, Operation};
//!
//! let engine = Engine::new();
//! let op = Operation::from_json(r#"{"tool": "background", "mode": "color"}"#)?;
//! let img = codec::open("photo.png".as_ref())?;
//! let out = engine.apply(&img, &op)?;
//! codec::save(&out[0], "cutout.png".as_ref(), &codec::EncodeOptions::default())?;
//! # Ok::<(), rasterkit::Error>(())
//! ```
//!
//! # Reproducibility
//!
//! Colorization adds a small per-channel jitter. Use [`Engine::with_seed`] or
//! pass a [`remap::NoJitter`] to [`remap::colorize`] for deterministic output.

#![deny(missing_docs)]

pub mod background;
pub mod buffer;
pub mod classify;
pub mod clip;
pub mod codec;
pub mod color;
mod engine;
pub mod error;
pub mod grid;
pub mod inpaint;
pub mod kernels;
pub mod overlay;
pub mod remap;
pub mod resample;
pub mod restore;
pub mod text;

pub use buffer::{Mask, PixelBuffer, Region};
pub use engine::{
    AspectSettings, BatchOutput, BatchSummary, Engine, IconSetSettings, Operation,
    PreviewSettings, ProcessResult,
};
pub use error::{Error, Result};
