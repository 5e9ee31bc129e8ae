//! Grid layout: joining several images into one and slicing one into many.

use image::{imageops, Rgba};
use serde::Deserialize;

use crate::buffer::{ensure_non_empty, PixelBuffer};
use crate::color::{self, composite_over, with_alpha};
use crate::error::{Error, Result};

/// Arrangement of joined images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum JoinLayout {
    /// One row.
    #[default]
    Horizontal,
    /// One column.
    Vertical,
    /// Rows of `columns` images.
    Grid,
}

impl From<String> for JoinLayout {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "vertical" => Self::Vertical,
            "grid" => Self::Grid,
            _ => Self::Horizontal,
        }
    }
}

/// Settings for [`join`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinSettings {
    /// Arrangement.
    pub layout: JoinLayout,
    /// Column count for [`JoinLayout::Grid`].
    pub columns: u32,
    /// Gap between cells in pixels.
    pub spacing: u32,
    /// Canvas color, `#RRGGBB`; transparent when absent.
    pub background: Option<String>,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            layout: JoinLayout::Horizontal,
            columns: 2,
            spacing: 0,
            background: None,
        }
    }
}

impl JoinSettings {
    /// `(rows, columns)` for `count` images.
    fn shape(&self, count: u32) -> (u32, u32) {
        match self.layout {
            JoinLayout::Horizontal => (1, count),
            JoinLayout::Vertical => (count, 1),
            JoinLayout::Grid => {
                let cols = self.columns.clamp(1, count.max(1));
                (count.div_ceil(cols), cols)
            }
        }
    }
}

/// Join `images` into one buffer.
///
/// Each column is as wide as its widest image and each row as tall as its
/// tallest; images are centred in their cells.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when `images` is empty and
/// [`Error::EmptyImage`] when any image has zero area.
pub fn join(images: &[PixelBuffer], settings: &JoinSettings) -> Result<PixelBuffer> {
    if images.is_empty() {
        return Err(Error::InvalidParameter("nothing to join".to_string()));
    }
    for image in images {
        ensure_non_empty(image)?;
    }
    let count = u32::try_from(images.len())
        .map_err(|_| Error::InvalidParameter("too many images".to_string()))?;
    let (rows, cols) = settings.shape(count);

    let mut col_widths = vec![0u32; cols as usize];
    let mut row_heights = vec![0u32; rows as usize];
    for (i, image) in images.iter().enumerate() {
        let (row, col) = (i / cols as usize, i % cols as usize);
        col_widths[col] = col_widths[col].max(image.width());
        row_heights[row] = row_heights[row].max(image.height());
    }

    let width = col_widths.iter().sum::<u32>() + settings.spacing * (cols - 1);
    let height = row_heights.iter().sum::<u32>() + settings.spacing * (rows - 1);
    let fill = settings
        .background
        .as_deref()
        .map_or(Rgba([0, 0, 0, 0]), |hex| {
            with_alpha(color::parse_hex_or(hex, color::WHITE), 255)
        });
    let mut canvas = PixelBuffer::from_pixel(width, height, fill);

    for (i, image) in images.iter().enumerate() {
        let (row, col) = (i / cols as usize, i % cols as usize);
        let cell_x: u32 = col_widths[..col].iter().sum::<u32>() + settings.spacing * col as u32;
        let cell_y: u32 = row_heights[..row].iter().sum::<u32>() + settings.spacing * row as u32;
        let x = cell_x + (col_widths[col] - image.width()) / 2;
        let y = cell_y + (row_heights[row] - image.height()) / 2;
        paste(&mut canvas, image, x, y);
    }

    tracing::debug!(count, rows, cols, width, height, "images joined");
    Ok(canvas)
}

fn paste(canvas: &mut PixelBuffer, image: &PixelBuffer, left: u32, top: u32) {
    for (x, y, px) in image.enumerate_pixels() {
        let dst = canvas.get_pixel_mut(left + x, top + y);
        *dst = composite_over(*dst, *px, 1.0);
    }
}

/// Settings for [`slice`] and [`slice_preview`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SliceSettings {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub columns: u32,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            rows: 3,
            columns: 3,
        }
    }
}

/// Cut `buffer` into `rows x columns` equal cells, row-major.
///
/// Cells are `floor(width / columns) x floor(height / rows)`; leftover pixels
/// on the right and bottom are dropped.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a zero grid dimension or when the
/// cells would be empty.
pub fn slice(buffer: &PixelBuffer, settings: &SliceSettings) -> Result<Vec<PixelBuffer>> {
    ensure_non_empty(buffer)?;
    let (rows, cols) = (settings.rows, settings.columns);
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidParameter(format!(
            "slice grid must be at least 1x1, got {rows}x{cols}"
        )));
    }
    let (width, height) = buffer.dimensions();
    let (cell_w, cell_h) = (width / cols, height / rows);
    if cell_w == 0 || cell_h == 0 {
        return Err(Error::InvalidParameter(format!(
            "a {width}x{height} image cannot be cut into {rows}x{cols} cells"
        )));
    }

    let mut cells = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            cells.push(
                imageops::crop_imm(buffer, col * cell_w, row * cell_h, cell_w, cell_h).to_image(),
            );
        }
    }
    tracing::debug!(rows, cols, cell_w, cell_h, "image sliced");
    Ok(cells)
}

/// Slice and reassemble with `gap` pixels between cells, showing the cut lines.
///
/// # Errors
///
/// See [`slice`].
pub fn slice_preview(
    buffer: &PixelBuffer,
    settings: &SliceSettings,
    gap: u32,
    background: Option<String>,
) -> Result<PixelBuffer> {
    let cells = slice(buffer, settings)?;
    join(
        &cells,
        &JoinSettings {
            layout: JoinLayout::Grid,
            columns: settings.columns,
            spacing: gap,
            background,
        },
    )
}
