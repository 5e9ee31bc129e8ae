//! Property-based tests for rasterkit
//!
//! These tests use proptest to check invariants that must hold for every
//! buffer and setting the engine accepts.

use image::{Rgb, Rgba};
use proptest::prelude::*;
use rasterkit::buffer::from_raw;
use rasterkit::classify::{self, ClassifyMode, ClassifySettings};
use rasterkit::color::{composite_over, hsl_to_rgb, rgb_to_hsl};
use rasterkit::grid::{self, SliceSettings};
use rasterkit::inpaint;
use rasterkit::resample::{self, Algorithm};
use rasterkit::{PixelBuffer, Region};

/// Strategy for small but valid image dimensions
fn image_dimensions() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=24, 1u32..=24)
}

/// Strategy for a random RGBA image
fn rgba_image() -> impl Strategy<Value = PixelBuffer> {
    image_dimensions().prop_flat_map(|(w, h)| {
        prop::collection::vec(any::<u8>(), (w * h * 4) as usize)
            .prop_map(move |data| from_raw(w, h, data).unwrap())
    })
}

/// Strategy for RGB pixel values
fn rgb_pixel() -> impl Strategy<Value = Rgb<u8>> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgb([r, g, b]))
}

fn rgba_pixel() -> impl Strategy<Value = Rgba<u8>> {
    (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b, a)| Rgba([r, g, b, a]))
}

proptest! {
    /// Property: raw buffers are accepted exactly when they hold width*height*4 bytes
    #[test]
    fn raw_length_must_match_dimensions(
        (width, height) in image_dimensions(),
        delta in -3i64..=3,
    ) {
        let expected = (width * height * 4) as i64;
        let len = (expected + delta).max(0) as usize;
        let result = from_raw(width, height, vec![0; len]);
        prop_assert_eq!(result.is_ok(), len as i64 == expected);
    }

    /// Property: RGB -> HSL -> RGB is stable within one level per channel
    #[test]
    fn hsl_round_trip_within_one(color in rgb_pixel()) {
        let back = hsl_to_rgb(rgb_to_hsl(color));
        for c in 0..3 {
            prop_assert!(color[c].abs_diff(back[c]) <= 1, "{:?} -> {:?}", color, back);
        }
    }

    /// Property: classification has no hidden state
    #[test]
    fn classification_is_idempotent(
        image in rgba_image(),
        color_mode in any::<bool>(),
        tolerance in 0.0f32..=255.0,
    ) {
        let settings = ClassifySettings {
            mode: if color_mode { ClassifyMode::Color } else { ClassifyMode::Auto },
            key: "#808080".to_string(),
            tolerance,
        };
        let first = classify::classify(&image, &settings).unwrap();
        let second = classify::classify(&image, &settings).unwrap();
        prop_assert_eq!(first.len(), (image.width() * image.height()) as usize);
        prop_assert_eq!(first, second);
    }

    /// Property: slicing yields rows*cols cells of floor(w/cols) x floor(h/rows)
    #[test]
    fn slicing_uses_floored_cells(
        (width, height) in (5u32..=40, 5u32..=40),
        rows in 1u32..=5,
        columns in 1u32..=5,
    ) {
        let image = PixelBuffer::new(width, height);
        let cells = grid::slice(&image, &SliceSettings { rows, columns }).unwrap();
        prop_assert_eq!(cells.len(), (rows * columns) as usize);
        for cell in &cells {
            prop_assert_eq!(cell.dimensions(), (width / columns, height / rows));
        }
    }

    /// Property: resampling always produces the requested dimensions
    #[test]
    fn resample_hits_target_size(
        image in rgba_image(),
        (target_w, target_h) in image_dimensions(),
        algorithm in prop_oneof![
            Just(Algorithm::Nearest),
            Just(Algorithm::Bilinear),
            Just(Algorithm::Bicubic),
            Just(Algorithm::Lanczos),
        ],
    ) {
        let out = resample::resample(&image, target_w, target_h, algorithm).unwrap();
        prop_assert_eq!(out.dimensions(), (target_w, target_h));
        prop_assert_eq!(out.as_raw().len(), (target_w * target_h * 4) as usize);
    }

    /// Property: a fully transparent or zero-opacity source leaves the destination alone
    #[test]
    fn invisible_source_is_a_no_op(dst in rgba_pixel(), src in rgba_pixel()) {
        prop_assert_eq!(composite_over(dst, src, 0.0), dst);
        let clear = Rgba([src[0], src[1], src[2], 0]);
        prop_assert_eq!(composite_over(dst, clear, 1.0), dst);
    }

    /// Property: repair only writes inside its region and never touches alpha
    #[test]
    fn repair_stays_inside_region(
        image in rgba_image(),
        (rx, ry, rw, rh) in (0u32..12, 0u32..12, 1u32..8, 1u32..8),
        intensity in 0.0f32..=1.0,
    ) {
        let region = Region::new(rx, ry, rw, rh);
        let mut repaired = image.clone();
        match inpaint::repair(&mut repaired, &region, intensity) {
            Ok(()) => {
                for (x, y, px) in repaired.enumerate_pixels() {
                    let original = image.get_pixel(x, y);
                    prop_assert_eq!(px[3], original[3]);
                    if !region.contains(x, y) {
                        prop_assert_eq!(px, original);
                    }
                }
            }
            Err(_) => prop_assert!(region.clipped_to(image.width(), image.height()).is_none()),
        }
    }
}
