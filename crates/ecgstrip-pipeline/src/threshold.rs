//! Adaptive binarization: isolate dark trace pixels from paper and grid.
//!
//! Each pixel is compared against the mean of its `block_size` x
//! `block_size` neighbourhood. Pixels darker than that local mean by more
//! than `bias` become foreground (255); everything else becomes
//! background (0). A local threshold copes with uneven lighting across a
//! photographed strip where a single global cut-off would not.
//!
//! The output is already inverted: trace = 255, paper = 0.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// How the neighbourhood mean is weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// Uniform box mean via [`imageproc::filter::box_filter`].
    Mean,
    /// Gaussian-weighted mean via [`imageproc::filter::gaussian_blur_f32`],
    /// with the sigma a `block_size` window implies.
    #[default]
    Gaussian,
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => f.write_str("Mean"),
            Self::Gaussian => f.write_str("Gaussian"),
        }
    }
}

/// Gaussian sigma for a kernel of `block_size` taps.
///
/// `0.3 * ((block_size - 1) * 0.5 - 1) + 0.8`, the conventional mapping
/// used by adaptive-threshold implementations. Always positive for
/// `block_size >= 3`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gaussian_sigma(block_size: u32) -> f32 {
    let k = block_size as f32;
    0.3f32.mul_add((k - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Compute the per-pixel local mean for `method`.
fn local_mean(gray: &GrayImage, method: ThresholdMethod, block_size: u32) -> GrayImage {
    let radius = block_size / 2;
    match method {
        ThresholdMethod::Mean => imageproc::filter::box_filter(gray, radius, radius),
        ThresholdMethod::Gaussian => {
            let sigma = gaussian_sigma(block_size);
            if sigma <= 0.0 {
                return gray.clone();
            }
            imageproc::filter::gaussian_blur_f32(gray, sigma)
        }
    }
}

/// Binarize a luminance image with a local adaptive threshold.
///
/// Returns an image of identical dimensions where 255 marks trace
/// candidates (`pixel <= local_mean - bias`) and 0 marks background.
/// A uniform image therefore yields an all-background mask for any
/// positive `bias`.
#[must_use = "returns the binary trace mask"]
pub fn binarize(gray: &GrayImage, method: ThresholdMethod, block_size: u32, bias: f32) -> GrayImage {
    let mean = local_mean(gray, method, block_size);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = f32::from(gray.get_pixel(x, y).0[0]);
        let threshold = f32::from(mean.get_pixel(x, y).0[0]) - bias;
        if value <= threshold {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

/// Count foreground (255) pixels in a mask.
#[must_use]
pub fn foreground_count(mask: &GrayImage) -> u64 {
    mask.pixels()
        .map(|p| u64::from(u8::from(p.0[0] == 255)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White strip with a 2-pixel black horizontal line at rows 10..12.
    fn line_image() -> GrayImage {
        GrayImage::from_fn(30, 24, |_, y| {
            if (10..12).contains(&y) {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn sigma_for_default_block() {
        assert!((gaussian_sigma(11) - 2.0).abs() < 1e-6);
        assert!(gaussian_sigma(3) > 0.0);
    }

    #[test]
    fn uniform_image_has_no_foreground() {
        for method in [ThresholdMethod::Mean, ThresholdMethod::Gaussian] {
            let img = GrayImage::from_pixel(20, 20, image::Luma([128]));
            let mask = binarize(&img, method, 11, 2.0);
            assert_eq!(foreground_count(&mask), 0, "method {method}");
        }
    }

    #[test]
    fn dark_line_becomes_foreground() {
        for method in [ThresholdMethod::Mean, ThresholdMethod::Gaussian] {
            let mask = binarize(&line_image(), method, 11, 2.0);
            for x in 0..30 {
                assert_eq!(mask.get_pixel(x, 10).0[0], 255, "method {method} x={x}");
                assert_eq!(mask.get_pixel(x, 11).0[0], 255, "method {method} x={x}");
            }
            // White paper is never darker than its neighbourhood mean.
            assert_eq!(foreground_count(&mask), 60, "method {method}");
        }
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = GrayImage::new(17, 31);
        let mask = binarize(&img, ThresholdMethod::Gaussian, 11, 2.0);
        assert_eq!(mask.dimensions(), (17, 31));
    }

    #[test]
    fn mask_is_strictly_binary() {
        let img = GrayImage::from_fn(25, 25, |x, y| image::Luma([((x * 7 + y * 13) % 256) as u8]));
        let mask = binarize(&img, ThresholdMethod::Mean, 5, 2.0);
        assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
