//! Shared 3x3 convolution and morphology kernels.
//!
//! The per-pixel operators ([`laplacian`], [`gaussian_blur_3x3`], [`median_3x3`])
//! only answer for interior pixels and return `None` on the one-pixel border.
//! The whole-buffer passes read from an untouched snapshot and always blend the
//! operator output with the original pixel at a fixed weight; border pixels are
//! left as they are.

use crate::buffer::{clamp_channel, PixelBuffer};

/// Laplacian edge kernel.
pub const LAPLACIAN: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 0.0]];

/// Gaussian smoothing kernel (weights sum to 16).
pub const GAUSSIAN: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// Additive weight of the Laplacian response in a sharpen pass.
pub const SHARPEN_WEIGHT: f32 = 0.3;

/// Blend weight of the Gaussian response in a smooth pass.
pub const SMOOTH_WEIGHT: f32 = 0.2;

/// Blend weight of the median response in a denoise pass.
pub const DENOISE_WEIGHT: f32 = 0.3;

#[inline]
fn is_interior(buffer: &PixelBuffer, x: u32, y: u32) -> bool {
    x >= 1 && y >= 1 && x + 1 < buffer.width() && y + 1 < buffer.height()
}

fn convolve(buffer: &PixelBuffer, x: u32, y: u32, kernel: &[[f32; 3]; 3]) -> [f32; 3] {
    let mut acc = [0.0_f32; 3];
    for (ky, row) in kernel.iter().enumerate() {
        for (kx, &k) in row.iter().enumerate() {
            if k == 0.0 {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let px = buffer.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
            for (c, slot) in acc.iter_mut().enumerate() {
                *slot += f32::from(px[c]) * k;
            }
        }
    }
    acc
}

/// Laplacian response `[r, g, b]` at an interior pixel.
#[must_use]
pub fn laplacian(buffer: &PixelBuffer, x: u32, y: u32) -> Option<[f32; 3]> {
    is_interior(buffer, x, y).then(|| convolve(buffer, x, y, &LAPLACIAN))
}

/// 3x3 Gaussian-blurred color `[r, g, b]` at an interior pixel.
#[must_use]
pub fn gaussian_blur_3x3(buffer: &PixelBuffer, x: u32, y: u32) -> Option<[f32; 3]> {
    is_interior(buffer, x, y).then(|| convolve(buffer, x, y, &GAUSSIAN).map(|v| v / 16.0))
}

/// Median color of the 3x3 neighbourhood, ranked by `R + G + B`.
#[must_use]
pub fn median_3x3(buffer: &PixelBuffer, x: u32, y: u32) -> Option<[u8; 3]> {
    if !is_interior(buffer, x, y) {
        return None;
    }
    let mut window = [[0u8; 3]; 9];
    let mut i = 0;
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            let p = buffer.get_pixel(nx, ny);
            window[i] = [p[0], p[1], p[2]];
            i += 1;
        }
    }
    window.sort_by_key(|c| u16::from(c[0]) + u16::from(c[1]) + u16::from(c[2]));
    Some(window[4])
}

/// Median alpha of the 8 neighbours around an interior pixel (centre excluded).
#[must_use]
pub fn median_alpha(buffer: &PixelBuffer, x: u32, y: u32) -> Option<u8> {
    if !is_interior(buffer, x, y) {
        return None;
    }
    let mut window = [0u8; 8];
    let mut i = 0;
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if nx == x && ny == y {
                continue;
            }
            window[i] = buffer.get_pixel(nx, ny)[3];
            i += 1;
        }
    }
    window.sort_unstable();
    // Even count: average of the two middle values.
    Some(((u16::from(window[3]) + u16::from(window[4]) + 1) / 2) as u8)
}

/// Add `weight * laplacian` to every interior pixel.
pub fn sharpen(buffer: &mut PixelBuffer, weight: f32) {
    let source = buffer.clone();
    for y in 1..source.height().saturating_sub(1) {
        for x in 1..source.width().saturating_sub(1) {
            let edge = convolve(&source, x, y, &LAPLACIAN);
            let px = buffer.get_pixel_mut(x, y);
            for (c, e) in edge.iter().enumerate() {
                px[c] = clamp_channel(f32::from(px[c]) + e * weight);
            }
        }
    }
}

/// Blend every interior pixel toward its Gaussian blur by `weight`.
pub fn smooth(buffer: &mut PixelBuffer, weight: f32) {
    let source = buffer.clone();
    for y in 1..source.height().saturating_sub(1) {
        for x in 1..source.width().saturating_sub(1) {
            let blurred = convolve(&source, x, y, &GAUSSIAN);
            let px = buffer.get_pixel_mut(x, y);
            for (c, b) in blurred.iter().enumerate() {
                px[c] = clamp_channel(f32::from(px[c]) * (1.0 - weight) + b / 16.0 * weight);
            }
        }
    }
}

/// Blend every interior pixel toward its 3x3 median by `weight`.
pub fn denoise(buffer: &mut PixelBuffer, weight: f32) {
    let source = buffer.clone();
    for y in 1..source.height().saturating_sub(1) {
        for x in 1..source.width().saturating_sub(1) {
            let Some(median) = median_3x3(&source, x, y) else {
                continue;
            };
            let px = buffer.get_pixel_mut(x, y);
            for (c, &m) in median.iter().enumerate() {
                px[c] = clamp_channel(f32::from(px[c]) * (1.0 - weight) + f32::from(m) * weight);
            }
        }
    }
}

/// Replace isolated alpha values with the median of their neighbours.
///
/// Only pixels whose alpha differs from that median by more than half the
/// range are touched, so solid regions and soft ramps survive.
pub fn despeckle_alpha(buffer: &mut PixelBuffer) {
    let source = buffer.clone();
    for y in 1..source.height().saturating_sub(1) {
        for x in 1..source.width().saturating_sub(1) {
            let Some(median) = median_alpha(&source, x, y) else {
                continue;
            };
            let px = buffer.get_pixel_mut(x, y);
            if px[3].abs_diff(median) > 127 {
                px[3] = median;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn flat(width: u32, height: u32, value: u8) -> PixelBuffer {
        PixelBuffer::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn border_pixels_have_no_response() {
        let buf = flat(4, 4, 50);
        assert!(laplacian(&buf, 0, 2).is_none());
        assert!(gaussian_blur_3x3(&buf, 3, 1).is_none());
        assert!(median_3x3(&buf, 1, 0).is_none());
        assert!(median_alpha(&buf, 1, 3).is_none());
        assert!(laplacian(&buf, 1, 1).is_some());
    }

    #[test]
    fn laplacian_of_flat_image_is_zero() {
        let buf = flat(5, 5, 90);
        assert_eq!(laplacian(&buf, 2, 2), Some([0.0, 0.0, 0.0]));
        assert_eq!(gaussian_blur_3x3(&buf, 2, 2), Some([90.0, 90.0, 90.0]));
    }

    #[test]
    fn laplacian_responds_to_isolated_spike() {
        let mut buf = flat(3, 3, 10);
        buf.put_pixel(1, 1, Rgba([110, 110, 110, 255]));
        assert_eq!(laplacian(&buf, 1, 1), Some([400.0, 400.0, 400.0]));
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut buf = flat(3, 3, 20);
        buf.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        assert_eq!(median_3x3(&buf, 1, 1), Some([20, 20, 20]));
    }

    #[test]
    fn passes_leave_border_untouched() {
        let mut buf = flat(6, 6, 40);
        buf.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        buf.put_pixel(2, 2, Rgba([250, 250, 250, 255]));
        let before = *buf.get_pixel(0, 0);
        sharpen(&mut buf, SHARPEN_WEIGHT);
        smooth(&mut buf, SMOOTH_WEIGHT);
        denoise(&mut buf, DENOISE_WEIGHT);
        assert_eq!(*buf.get_pixel(0, 0), before);
    }

    #[test]
    fn smooth_is_a_partial_blend() {
        let mut buf = flat(3, 3, 0);
        buf.put_pixel(1, 1, Rgba([160, 160, 160, 255]));
        smooth(&mut buf, SMOOTH_WEIGHT);
        // blurred centre = 160 * 4 / 16 = 40; 160 * 0.8 + 40 * 0.2 = 136
        assert_eq!(buf.get_pixel(1, 1)[0], 136);
    }

    #[test]
    fn despeckle_fills_single_alpha_hole() {
        let mut buf = flat(3, 3, 100);
        buf.get_pixel_mut(1, 1)[3] = 0;
        despeckle_alpha(&mut buf);
        assert_eq!(buf.get_pixel(1, 1)[3], 255);
    }

    #[test]
    fn tiny_buffers_do_not_panic() {
        let mut one = flat(1, 1, 10);
        sharpen(&mut one, SHARPEN_WEIGHT);
        smooth(&mut one, SMOOTH_WEIGHT);
        denoise(&mut one, DENOISE_WEIGHT);
        despeckle_alpha(&mut one);
        assert_eq!(one.get_pixel(0, 0)[0], 10);
    }
}
