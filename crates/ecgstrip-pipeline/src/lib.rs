//! ecgstrip-pipeline: Pure ECG strip analysis pipeline (sans-IO).
//!
//! Turns a photographed or scanned ECG strip into a heart-rate estimate
//! through:
//! decode -> luminance -> adaptive threshold -> column reduction ->
//! normalization -> peak detection -> feature estimation.
//!
//! This crate has **no I/O dependencies** and does no logging. It
//! operates on in-memory byte slices or decoded images and returns
//! structured data. Every call is independent: no state survives
//! between analyses.

pub mod decode;
pub mod diagnostics;
pub mod extract;
pub mod features;
pub mod normalize;
pub mod peaks;
pub mod pipeline;
pub mod threshold;
pub mod types;

pub use extract::{ColumnReducer, ColumnReducerKind};
pub use features::Features;
pub use pipeline::Pipeline;
pub use threshold::ThresholdMethod;
pub use types::{
    Abnormality, AnalysisConfig, AnalysisResult, Dimensions, GrayImage, InvalidImageError,
    NormalizedWaveform, PeakSet, PipelineError, RgbImage, StagedResult, StressLevel, Waveform,
};

/// Analyze a decoded RGB strip.
///
/// # Pipeline steps
///
/// 1. Luminance conversion
/// 2. Adaptive threshold (trace pixels become foreground)
/// 3. Per-column reduction into a waveform, then normalization
/// 4. Peak detection with a minimum spacing of `width / divisor`
/// 5. Heart rate, classification, stress and confidence
///
/// The image is only read. A strip without a detectable rhythm is a
/// valid result, not an error.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// [`AnalysisConfig::validate`].
/// Returns [`PipelineError::InvalidImage`] if the image has zero width
/// or height.
pub fn analyze(image: &RgbImage, config: &AnalysisConfig) -> Result<AnalysisResult, PipelineError> {
    config.validate()?;
    analyze_validated(image, config)
}

/// [`analyze`] for a config that has already passed validation.
fn analyze_validated(
    image: &RgbImage,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, PipelineError> {
    decode::validate_dimensions(image)?;

    // 1-2. Luminance and binarization.
    let luminance = decode::to_luminance(image);
    let mask = threshold::binarize(
        &luminance,
        config.threshold_method,
        config.block_size,
        config.threshold_bias,
    );
    drop(luminance);

    // 3. Waveform.
    let waveform = extract::extract_waveform(&mask, &config.column_reducer, config);
    drop(mask);
    let normalized = normalize::normalize(&waveform, config.normalize_epsilon);

    // 4. Peaks.
    let min_distance = peaks::min_peak_distance(waveform.len(), config.peak_spacing_divisor);
    let peaks = peaks::detect_peaks(&normalized, config.peak_height, min_distance);

    // 5. Features.
    let features = features::estimate(&normalized, &peaks, image.width(), config);
    Ok(features.to_result(&waveform))
}

/// Decode encoded image bytes (PNG, JPEG, BMP, WebP) and analyze them.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] if the bytes are empty,
/// undecodable, or decode to an image without pixels, and
/// [`PipelineError::InvalidConfig`] for an invalid config.
pub fn analyze_bytes(
    image_bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<AnalysisResult, PipelineError> {
    config.validate()?;
    let image = decode::decode(image_bytes)?;
    analyze_validated(&image, config)
}

/// Run the full pipeline, preserving every intermediate stage output.
///
/// The final [`StagedResult::result`] equals what [`analyze_bytes`]
/// returns for the same input.
///
/// # Errors
///
/// Same as [`analyze_bytes`].
pub fn process_staged(
    image_bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .binarize()
        .extract()
        .detect_peaks()
        .estimate()
        .into_result())
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

    /// White strip with a thin black spike train drawn as vertical bars
    /// rising from a flat baseline.
    fn spike_strip(width: u32, height: u32, period: u32) -> RgbImage {
        let baseline = height * 3 / 4;
        let top = height / 4;
        RgbImage::from_fn(width, height, |x, y| {
            let on_baseline = y == baseline;
            let on_spike = x % period == period / 2 && (top..=baseline).contains(&y);
            if on_baseline || on_spike {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn analyze_empty_bytes() {
        let result = analyze_bytes(&[], &AnalysisConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::InvalidImage(InvalidImageError::Empty))
        ));
    }

    #[test]
    fn analyze_corrupt_bytes() {
        let result = analyze_bytes(&[0xFF, 0x00], &AnalysisConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::InvalidImage(InvalidImageError::Decode(_)))
        ));
    }

    #[test]
    fn analyze_rejects_degenerate_image() {
        let result = analyze(&RgbImage::new(0, 10), &AnalysisConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::InvalidImage(InvalidImageError::Degenerate {
                width: 0,
                height: 10
            }))
        ));
    }

    #[test]
    fn analyze_rejects_invalid_config() {
        let img = spike_strip(40, 20, 10);
        let config = AnalysisConfig {
            peak_height: 2.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            analyze(&img, &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn analyze_bytes_checks_config_before_decoding() {
        let config = AnalysisConfig {
            block_size: AnalysisConfig::MAX_BLOCK_SIZE + 2,
            threshold_method: ThresholdMethod::Mean,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            analyze_bytes(&[], &config),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("block_size")
        ));

        let img = spike_strip(10, 10, 5);
        assert!(matches!(
            analyze(&img, &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn waveform_has_one_sample_per_column() {
        let img = spike_strip(123, 40, 20);
        let result = analyze(&img, &AnalysisConfig::default()).unwrap();
        assert_eq!(result.waveform.len(), 123);
        assert!(result.waveform.iter().all(|&v| (0.0..=40.0).contains(&v)));
    }

    #[test]
    fn spike_train_is_detected() {
        // 400 px wide, one spike every 40 px -> 10 spikes.
        let img = spike_strip(400, 100, 40);
        let result = analyze(&img, &AnalysisConfig::default()).unwrap();
        // 40 px of a 400 px / 5 s window is 0.5 s -> 120 bpm.
        assert!(
            (result.heart_rate - 120.0).abs() < 1.0,
            "heart rate {}",
            result.heart_rate
        );
        assert_eq!(result.abnormality, Abnormality::Tachycardia);
        assert!(result.confidence_score > 0.0);
    }

    #[test]
    fn bytes_and_image_entry_points_agree() {
        let img = spike_strip(200, 60, 40);
        let from_image = analyze(&img, &AnalysisConfig::default()).unwrap();
        let from_bytes = analyze_bytes(&encode_png(&img), &AnalysisConfig::default()).unwrap();
        assert_eq!(from_image, from_bytes);
    }

    #[test]
    fn staged_matches_single_call() {
        let img = spike_strip(200, 60, 40);
        let png = encode_png(&img);
        let config = AnalysisConfig::default();
        let staged = process_staged(&png, &config).unwrap();
        assert_eq!(staged.result, analyze_bytes(&png, &config).unwrap());
        assert_eq!(staged.waveform.samples(), staged.result.waveform.as_slice());
        assert_eq!(staged.mask.dimensions(), (200, 60));
    }

    #[test]
    fn staged_result_survives_json() {
        let img = spike_strip(60, 20, 15);
        let staged = process_staged(&encode_png(&img), &AnalysisConfig::default()).unwrap();
        let json = serde_json::to_string(&staged).unwrap();
        let back: StagedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mask, staged.mask);
        assert_eq!(back.original, staged.original);
        assert_eq!(back.result, staged.result);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let img = spike_strip(300, 80, 37);
        let config = AnalysisConfig::default();
        let first = analyze(&img, &config).unwrap();
        let second = analyze(&img, &config).unwrap();
        assert_eq!(first, second);
    }
}
