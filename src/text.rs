//! Bitmap text rasterization on the 8x8 `font8x8` glyph set.
//!
//! Glyphs are scaled by nearest neighbour to `max(1, font_size / 8)` and laid
//! out line by line. Characters without a glyph render as `?`.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::Rgba;
use serde::Deserialize;

use crate::background::{render_fill, BackgroundFill};
use crate::buffer::{Mask, PixelBuffer};
use crate::color::{self, composite_over, with_alpha};
use crate::error::{Error, Result};

/// Native glyph edge length.
const GLYPH: u32 = 8;

/// Largest rendered text block, in pixels per side.
pub const MAX_TEXT_EXTENT: u32 = 16_384;

/// Horizontal placement of each line inside the text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Centred.
    Center,
    /// Flush right.
    Right,
}

impl From<String> for TextAlign {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Self::Center,
            "right" => Self::Right,
            _ => Self::Left,
        }
    }
}

/// Integer scale factor for a font size in pixels.
#[inline]
#[must_use]
pub fn scale_for(font_size: u32) -> u32 {
    (font_size / GLYPH).max(1)
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn line_width(line: &str, scale: u32) -> u32 {
    let count = u32::try_from(line.chars().count()).unwrap_or(u32::MAX);
    if count == 0 {
        return 0;
    }
    count
        .saturating_mul(GLYPH)
        .saturating_mul(scale)
        .saturating_add((count - 1).saturating_mul(scale))
}

/// Pixel size `(width, height)` of `text` at `font_size`.
///
/// Lines are separated by `\n`; line pitch is `10 * scale`. Sizes saturate at
/// `u32::MAX` instead of overflowing.
#[must_use]
pub fn measure_text(text: &str, font_size: u32) -> (u32, u32) {
    if text.is_empty() {
        return (0, 0);
    }
    let scale = scale_for(font_size);
    let lines = u32::try_from(text.lines().count().max(1)).unwrap_or(u32::MAX);
    let width = text.lines().map(|l| line_width(l, scale)).max().unwrap_or(0);
    let height = lines
        .saturating_mul(GLYPH)
        .saturating_mul(scale)
        .saturating_add((lines - 1).saturating_mul(2).saturating_mul(scale));
    (width, height)
}

/// Coverage mask of the rendered text, sized by [`measure_text`].
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when the text measures zero pixels or
/// more than [`MAX_TEXT_EXTENT`] on either side.
pub fn render_text_mask(text: &str, font_size: u32, align: TextAlign) -> Result<Mask> {
    let (width, height) = measure_text(text, font_size);
    if width == 0 || height == 0 {
        return Err(Error::InvalidParameter("text must not be empty".to_string()));
    }
    if width > MAX_TEXT_EXTENT || height > MAX_TEXT_EXTENT {
        return Err(Error::InvalidParameter(format!(
            "text block of {width}x{height} exceeds {MAX_TEXT_EXTENT} pixels"
        )));
    }
    let scale = scale_for(font_size);
    let mut mask = Mask::new(width, height);

    for (row, line) in (0u32..).zip(text.lines()) {
        let offset_x = match align {
            TextAlign::Left => 0,
            TextAlign::Center => (width - line_width(line, scale)) / 2,
            TextAlign::Right => width - line_width(line, scale),
        };
        let top = row * (GLYPH + 2) * scale;
        for (index, ch) in (0u32..).zip(line.chars()) {
            let left = offset_x + index * (GLYPH + 1) * scale;
            for (gy, bits) in (0u32..).zip(glyph(ch)) {
                for gx in 0..GLYPH {
                    if (bits >> gx) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            mask.set(left + gx * scale + dx, top + gy * scale + dy, 1.0);
                        }
                    }
                }
            }
        }
    }
    Ok(mask)
}

/// Render text in `color` on a transparent buffer.
///
/// # Errors
///
/// See [`render_text_mask`].
pub fn render_text(
    text: &str,
    font_size: u32,
    color: Rgba<u8>,
    align: TextAlign,
) -> Result<PixelBuffer> {
    let mask = render_text_mask(text, font_size, align)?;
    let (width, height) = mask.dimensions();
    Ok(PixelBuffer::from_fn(width, height, |x, y| {
        if mask.contains(x, y) {
            color
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

/// Settings for [`text_to_image`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextImageSettings {
    /// Text to draw; `\n` starts a new line.
    pub text: String,
    /// Font size in pixels.
    pub font_size: u32,
    /// Text color, `#RRGGBB`.
    pub color: String,
    /// Canvas fill.
    pub background: BackgroundFill,
    /// Space around the text block when the canvas is sized automatically.
    pub padding: u32,
    /// Fixed canvas width.
    pub width: Option<u32>,
    /// Fixed canvas height.
    pub height: Option<u32>,
    /// Line alignment; also positions the block horizontally.
    pub align: TextAlign,
}

impl Default for TextImageSettings {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 48,
            color: "#000000".to_string(),
            background: BackgroundFill::default(),
            padding: 20,
            width: None,
            height: None,
            align: TextAlign::Center,
        }
    }
}

/// Render text onto a generated background.
///
/// Without a fixed size the canvas is the text block plus padding; with one,
/// the block is centred vertically, aligned horizontally and clipped.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for empty text and
/// [`Error::EmptyImage`] for a zero fixed size.
pub fn text_to_image(settings: &TextImageSettings) -> Result<PixelBuffer> {
    let fg = with_alpha(color::parse_hex_or(&settings.color, color::WHITE), 255);
    let glyphs = render_text(&settings.text, settings.font_size, fg, settings.align)?;
    let (tw, th) = glyphs.dimensions();

    let width = settings
        .width
        .unwrap_or_else(|| tw.saturating_add(settings.padding.saturating_mul(2)));
    let height = settings
        .height
        .unwrap_or_else(|| th.saturating_add(settings.padding.saturating_mul(2)));
    let mut canvas = render_fill(&settings.background, width, height)?;

    let left = match settings.align {
        TextAlign::Left => i64::from(settings.padding),
        TextAlign::Center => (i64::from(width) - i64::from(tw)) / 2,
        TextAlign::Right => i64::from(width) - i64::from(tw) - i64::from(settings.padding),
    };
    let top = (i64::from(height) - i64::from(th)) / 2;

    for (x, y, px) in glyphs.enumerate_pixels() {
        let (tx, ty) = (left + i64::from(x), top + i64::from(y));
        let (Ok(tx), Ok(ty)) = (u32::try_from(tx), u32::try_from(ty)) else {
            continue;
        };
        if tx < width && ty < height {
            let dst = canvas.get_pixel_mut(tx, ty);
            *dst = composite_over(*dst, *px, 1.0);
        }
    }
    tracing::debug!(width, height, chars = settings.text.chars().count(), "text rendered");
    Ok(canvas)
}
