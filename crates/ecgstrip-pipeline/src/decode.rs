//! Image decoding, dimension checks, and luminance conversion.
//!
//! This is the first step in the pipeline: raw bytes in, `RgbImage`
//! out, then a single-channel luminance image for the binarizer.

use image::{GrayImage, RgbImage};

use crate::types::{InvalidImageError, PipelineError};

/// Decode raw image bytes into an 8-bit RGB image.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// can decode). Alpha is discarded.
///
/// # Errors
///
/// Returns [`InvalidImageError::Empty`] if `bytes` is empty,
/// [`InvalidImageError::Decode`] if the format is unrecognized or the
/// data is corrupt, and [`InvalidImageError::Degenerate`] if the decoded
/// image has no pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(InvalidImageError::Empty.into());
    }

    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    validate_dimensions(&rgb)?;
    Ok(rgb)
}

/// Reject images with zero width or zero height.
///
/// # Errors
///
/// Returns [`InvalidImageError::Degenerate`] for an empty axis.
pub fn validate_dimensions(image: &RgbImage) -> Result<(), PipelineError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InvalidImageError::Degenerate { width, height }.into());
    }
    Ok(())
}

/// Convert an RGB image to luminance with the Rec. 601 weights
/// `0.299*R + 0.587*G + 0.114*B`.
#[must_use = "returns the luminance image"]
pub fn to_luminance(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = 0.114f32.mul_add(
            f32::from(b),
            0.299f32.mul_add(f32::from(r), 0.587 * f32::from(g)),
        );
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = luma.round().clamp(0.0, 255.0) as u8;
        image::Luma([value])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode(&[]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidImage(InvalidImageError::Empty))
        ));
    }

    #[test]
    fn corrupt_bytes_returns_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidImage(InvalidImageError::Decode(_)))
        ));
    }

    #[test]
    fn valid_png_decodes_with_dimensions() {
        let img = RgbImage::from_pixel(17, 31, image::Rgb([10, 20, 30]));
        let decoded = decode(&encode_png(&img)).unwrap();
        assert_eq!(decoded.dimensions(), (17, 31));
        assert_eq!(decoded.get_pixel(3, 4).0, [10, 20, 30]);
    }

    #[test]
    fn zero_width_is_degenerate() {
        let img = RgbImage::new(0, 5);
        assert!(matches!(
            validate_dimensions(&img),
            Err(PipelineError::InvalidImage(InvalidImageError::Degenerate {
                width: 0,
                height: 5
            }))
        ));
    }

    #[test]
    fn luminance_uses_rec601_weights() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        img.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        let gray = to_luminance(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
    }

    #[test]
    fn white_and_black_are_preserved() {
        let mut img = RgbImage::from_pixel(2, 1, image::Rgb([255, 255, 255]));
        img.put_pixel(1, 0, image::Rgb([0, 0, 0]));
        let gray = to_luminance(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 0);
    }
}
