//! Shared types for the ecgstrip analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::extract::ColumnReducerKind;
use crate::features::Features;
use crate::threshold::ThresholdMethod;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand the pipeline an
/// already-decoded strip without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Vertical trace position per image column, y-flipped so that larger
/// values are larger deflections.
///
/// Holds exactly one sample per column of the source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform(Vec<f64>);

impl Waveform {
    /// Create a waveform from per-column samples.
    #[must_use]
    pub const fn new(samples: Vec<f64>) -> Self {
        Self(samples)
    }

    /// Returns `true` if the waveform has no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of samples (equals the image width).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all samples.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    /// Smallest sample, or `None` when empty.
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::min)
    }

    /// Largest sample, or `None` when empty.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::max)
    }

    /// Consumes the waveform and returns the underlying samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<f64> {
        self.0
    }
}

/// A [`Waveform`] rescaled to `[0, 1]` by its own extremes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWaveform(Vec<f64>);

impl NormalizedWaveform {
    /// Create a normalized waveform from already-rescaled samples.
    #[must_use]
    pub const fn new(samples: Vec<f64>) -> Self {
        Self(samples)
    }

    /// Returns `true` if the waveform has no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all samples.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    /// Dynamic range (`max - min`); `0.0` when empty.
    #[must_use]
    pub fn range(&self) -> f64 {
        let min = self.0.iter().copied().reduce(f64::min);
        let max = self.0.iter().copied().reduce(f64::max);
        match (min, max) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0,
        }
    }
}

/// Detected heartbeat positions: strictly increasing column indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeakSet(Vec<usize>);

impl PeakSet {
    /// Create a peak set from sorted, de-duplicated column indices.
    #[must_use]
    pub const fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Returns `true` if no peaks were detected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of detected peaks.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Column indices of the peaks.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Distances between consecutive peaks, in samples.
    #[must_use]
    pub fn intervals(&self) -> Vec<usize> {
        self.0.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Coarse rhythm classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Abnormality {
    /// Heart rate within the normal band.
    #[serde(rename = "Normal")]
    Normal,
    /// Heart rate below the bradycardia bound.
    #[serde(rename = "Bradycardia (Low Heart Rate)")]
    Bradycardia,
    /// Heart rate above the tachycardia bound.
    #[serde(rename = "Tachycardia (High Heart Rate)")]
    Tachycardia,
    /// Fewer than two beats were found, so no rhythm could be established.
    #[serde(rename = "Arrythmia / Signal Unclear")]
    SignalUnclear,
}

impl Abnormality {
    /// The user-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Bradycardia => "Bradycardia (Low Heart Rate)",
            Self::Tachycardia => "Tachycardia (High Heart Rate)",
            Self::SignalUnclear => "Arrythmia / Signal Unclear",
        }
    }

    /// Advice text shown alongside the label.
    #[must_use]
    pub const fn advice(self) -> &'static str {
        match self {
            Self::Normal => {
                "Your ECG appears normal. Maintain a healthy lifestyle and regular checkups."
            }
            Self::Bradycardia => {
                "Low heart rate detected. If you feel dizzy or faint, please consult a doctor."
            }
            Self::Tachycardia => {
                "High heart rate detected. This could be due to stress, caffeine, or an underlying condition. Consider professional evaluation."
            }
            Self::SignalUnclear => {
                "The system couldn't detect a regular rhythm. Ensure the image is clear and the trace is continuous."
            }
        }
    }
}

impl std::fmt::Display for Abnormality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Heuristic stress estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLevel {
    /// Score at or below 40.
    Low,
    /// Score above 40 and at most 70.
    Moderate,
    /// Score above 70.
    High,
}

impl std::fmt::Display for StressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("Low"),
            Self::Moderate => f.write_str("Moderate"),
            Self::High => f.write_str("High"),
        }
    }
}

/// Final output of one analysis.
///
/// Field names are part of the external contract and serialize as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Raw (not normalized) waveform, one sample per image column.
    pub waveform: Vec<f64>,
    /// Beats per minute, rounded to one decimal; `0.0` without a rhythm.
    pub heart_rate: f64,
    /// Rhythm classification.
    pub abnormality: Abnormality,
    /// Stress estimate.
    pub stress_level: StressLevel,
    /// Confidence in `[0, 99]`, rounded to one decimal.
    pub confidence_score: f64,
    /// Advice text keyed to `abnormality`.
    pub medical_advice: String,
}

/// Configuration for the analysis pipeline.
///
/// Every calibration constant lives here so callers (and tests) can tune
/// them independently of the pipeline logic. Use
/// [`validate`](Self::validate) before running; all entry points call it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// How the local neighbourhood mean is weighted during binarization.
    pub threshold_method: ThresholdMethod,

    /// Side length of the square binarization window. Must be odd and
    /// at least 3.
    pub block_size: u32,

    /// Amount a pixel must be darker than its local mean to count as trace.
    pub threshold_bias: f32,

    /// How the foreground rows of each column are reduced to one value.
    pub column_reducer: ColumnReducerKind,

    /// Fraction trimmed from each end by
    /// [`ColumnReducerKind::TrimmedMean`]. Must lie in `[0, 0.5)`.
    pub trim_fraction: f64,

    /// Seconds of recording assumed to span the full image width.
    pub window_seconds: f64,

    /// Minimum normalized height of an accepted peak.
    pub peak_height: f64,

    /// Minimum peak spacing is `width / peak_spacing_divisor` samples.
    pub peak_spacing_divisor: u32,

    /// Added to the waveform range before normalizing.
    pub normalize_epsilon: f64,

    /// Heart rates below this are bradycardic.
    pub bradycardia_below: f64,

    /// Heart rates above this are tachycardic.
    pub tachycardia_above: f64,

    /// Normalized ranges below this halve the confidence score.
    pub weak_signal_range: f64,
}

impl AnalysisConfig {
    /// Default binarization weighting.
    pub const DEFAULT_THRESHOLD_METHOD: ThresholdMethod = ThresholdMethod::Gaussian;
    /// Default binarization window.
    pub const DEFAULT_BLOCK_SIZE: u32 = 11;
    /// Largest accepted binarization window.
    pub const MAX_BLOCK_SIZE: u32 = 255;
    /// Default binarization bias.
    pub const DEFAULT_THRESHOLD_BIAS: f32 = 2.0;
    /// Default column reducer.
    pub const DEFAULT_COLUMN_REDUCER: ColumnReducerKind = ColumnReducerKind::Median;
    /// Default trimmed-mean fraction.
    pub const DEFAULT_TRIM_FRACTION: f64 = 0.25;
    /// Default recording window.
    pub const DEFAULT_WINDOW_SECONDS: f64 = 5.0;
    /// Default normalized peak height.
    pub const DEFAULT_PEAK_HEIGHT: f64 = 0.5;
    /// Default peak spacing divisor.
    pub const DEFAULT_PEAK_SPACING_DIVISOR: u32 = 20;
    /// Default normalization epsilon.
    pub const DEFAULT_NORMALIZE_EPSILON: f64 = 1e-6;
    /// Default bradycardia bound (bpm).
    pub const DEFAULT_BRADYCARDIA_BELOW: f64 = 60.0;
    /// Default tachycardia bound (bpm).
    pub const DEFAULT_TACHYCARDIA_ABOVE: f64 = 100.0;
    /// Default weak-signal range.
    pub const DEFAULT_WEAK_SIGNAL_RANGE: f64 = 0.2;

    /// Check every field for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.block_size < 3 || self.block_size % 2 == 0 {
            return invalid(format!(
                "block_size must be odd and >= 3, got {}",
                self.block_size
            ));
        }
        if self.block_size > Self::MAX_BLOCK_SIZE {
            return invalid(format!(
                "block_size must be <= {}, got {}",
                Self::MAX_BLOCK_SIZE,
                self.block_size
            ));
        }
        if !self.threshold_bias.is_finite() {
            return invalid("threshold_bias must be finite".to_owned());
        }
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return invalid(format!(
                "trim_fraction must be in [0, 0.5), got {}",
                self.trim_fraction
            ));
        }
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return invalid(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            ));
        }
        if !(0.0..=1.0).contains(&self.peak_height) {
            return invalid(format!(
                "peak_height must be in [0, 1], got {}",
                self.peak_height
            ));
        }
        if self.peak_spacing_divisor == 0 {
            return invalid("peak_spacing_divisor must be non-zero".to_owned());
        }
        if !self.normalize_epsilon.is_finite() || self.normalize_epsilon < 0.0 {
            return invalid(format!(
                "normalize_epsilon must be >= 0, got {}",
                self.normalize_epsilon
            ));
        }
        if !self.bradycardia_below.is_finite()
            || !self.tachycardia_above.is_finite()
            || self.bradycardia_below > self.tachycardia_above
        {
            return invalid(format!(
                "bradycardia_below ({}) must not exceed tachycardia_above ({})",
                self.bradycardia_below, self.tachycardia_above
            ));
        }
        if !self.weak_signal_range.is_finite() {
            return invalid("weak_signal_range must be finite".to_owned());
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_method: Self::DEFAULT_THRESHOLD_METHOD,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            threshold_bias: Self::DEFAULT_THRESHOLD_BIAS,
            column_reducer: Self::DEFAULT_COLUMN_REDUCER,
            trim_fraction: Self::DEFAULT_TRIM_FRACTION,
            window_seconds: Self::DEFAULT_WINDOW_SECONDS,
            peak_height: Self::DEFAULT_PEAK_HEIGHT,
            peak_spacing_divisor: Self::DEFAULT_PEAK_SPACING_DIVISOR,
            normalize_epsilon: Self::DEFAULT_NORMALIZE_EPSILON,
            bradycardia_below: Self::DEFAULT_BRADYCARDIA_BELOW,
            tachycardia_above: Self::DEFAULT_TACHYCARDIA_ABOVE,
            weak_signal_range: Self::DEFAULT_WEAK_SIGNAL_RANGE,
        }
    }
}

/// Result of running the pipeline with all intermediate stage outputs
/// preserved.
///
/// Uses custom `Serialize`/`Deserialize` implementations because
/// `GrayImage` and `RgbImage` do not implement serde traits. Raster
/// images are serialized as `(width, height, raw_pixels)` tuples.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Stage 1: decoded RGB strip.
    pub original: RgbImage,
    /// Stage 2: luminance image fed to the binarizer.
    pub luminance: GrayImage,
    /// Stage 2: binary trace mask (255 = trace).
    pub mask: GrayImage,
    /// Stage 3: per-column waveform.
    pub waveform: Waveform,
    /// Stage 3: waveform rescaled to `[0, 1]`.
    pub normalized: NormalizedWaveform,
    /// Stage 4: accepted peaks.
    pub peaks: PeakSet,
    /// Stage 5: unrounded derived metrics.
    pub features: Features,
    /// Stage 5: final result record.
    pub result: AnalysisResult,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

/// Serde-compatible proxy for `StagedResult`.
#[derive(Serialize, Deserialize)]
struct StagedResultProxy {
    original: (u32, u32, Vec<u8>),
    luminance: (u32, u32, Vec<u8>),
    mask: (u32, u32, Vec<u8>),
    waveform: Waveform,
    normalized: NormalizedWaveform,
    peaks: PeakSet,
    features: Features,
    result: AnalysisResult,
    dimensions: Dimensions,
}

impl Serialize for StagedResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = StagedResultProxy {
            original: (
                self.original.width(),
                self.original.height(),
                self.original.as_raw().clone(),
            ),
            luminance: (
                self.luminance.width(),
                self.luminance.height(),
                self.luminance.as_raw().clone(),
            ),
            mask: (
                self.mask.width(),
                self.mask.height(),
                self.mask.as_raw().clone(),
            ),
            waveform: self.waveform.clone(),
            normalized: self.normalized.clone(),
            peaks: self.peaks.clone(),
            features: self.features.clone(),
            result: self.result.clone(),
            dimensions: self.dimensions,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StagedResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = StagedResultProxy::deserialize(deserializer)?;

        let original = RgbImage::from_raw(proxy.original.0, proxy.original.1, proxy.original.2)
            .ok_or_else(|| serde::de::Error::custom("invalid RGB image dimensions"))?;
        let luminance =
            GrayImage::from_raw(proxy.luminance.0, proxy.luminance.1, proxy.luminance.2)
                .ok_or_else(|| serde::de::Error::custom("invalid luminance image dimensions"))?;
        let mask = GrayImage::from_raw(proxy.mask.0, proxy.mask.1, proxy.mask.2)
            .ok_or_else(|| serde::de::Error::custom("invalid mask image dimensions"))?;

        Ok(Self {
            original,
            luminance,
            mask,
            waveform: proxy.waveform,
            normalized: proxy.normalized,
            peaks: proxy.peaks,
            features: proxy.features,
            result: proxy.result,
            dimensions: proxy.dimensions,
        })
    }
}

/// The input image cannot be analyzed.
#[derive(Debug, thiserror::Error)]
pub enum InvalidImageError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    Empty,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The image has no pixels along at least one axis.
    #[error("image has degenerate dimensions {width}x{height}")]
    Degenerate {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
    },
}

/// Errors that can occur during pipeline processing.
///
/// A strip with no detectable heartbeat is *not* an error; it is
/// reported through the [`AnalysisResult`] fields.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The image is missing, undecodable, or has no pixels.
    #[error("invalid image: {0}")]
    InvalidImage(#[from] InvalidImageError),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        Self::InvalidImage(InvalidImageError::Decode(e))
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the decode variant
/// stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    EmptyInput,
    ImageDecode(String),
    Degenerate { width: u32, height: u32 },
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidImage(InvalidImageError::Empty) => PipelineErrorProxy::EmptyInput,
            Self::InvalidImage(InvalidImageError::Decode(e)) => {
                PipelineErrorProxy::ImageDecode(e.to_string())
            }
            Self::InvalidImage(InvalidImageError::Degenerate { width, height }) => {
                PipelineErrorProxy::Degenerate {
                    width: *width,
                    height: *height,
                }
            }
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::EmptyInput => Self::InvalidImage(InvalidImageError::Empty),
            // The typed decode error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidImage(InvalidImageError::Decode(image::ImageError::IoError(
                    std::io::Error::other(msg),
                )))
            }
            PipelineErrorProxy::Degenerate { width, height } => {
                Self::InvalidImage(InvalidImageError::Degenerate { width, height })
            }
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}
