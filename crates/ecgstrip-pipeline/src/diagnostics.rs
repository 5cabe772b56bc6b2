//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! calibration work (threshold block size, bias, peak height). They are
//! collected by [`process_staged_with_diagnostics`], which runs the same
//! stages as [`crate::process_staged`] and times each one.
//!
//! The core library has no clock of its own: callers pass a [`Clock`],
//! so the crate stays free of platform time sources.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::types::{AnalysisConfig, PipelineError, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Capture the current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: luminance conversion and adaptive threshold.
    pub binarize: StageDiagnostics,
    /// Stage 3: column reduction and normalization.
    pub extract: StageDiagnostics,
    /// Stage 4: peak detection.
    pub detect_peaks: StageDiagnostics,
    /// Stage 5: feature estimation.
    pub estimate: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes (0 when started from a decoded image).
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Binarization metrics.
    Binarize {
        /// Local-mean method.
        method: String,
        /// Neighborhood side length.
        block_size: u32,
        /// Constant subtracted from the local mean.
        bias: f32,
        /// Number of trace pixels in the mask.
        foreground_pixels: u64,
        /// Total pixel count for computing trace density.
        total_pixels: u64,
    },
    /// Signal extraction metrics.
    Extract {
        /// Column reducer used.
        reducer: String,
        /// Waveform length.
        samples: usize,
        /// Columns with no trace pixels.
        empty_columns: usize,
        /// Smallest raw sample.
        min: f64,
        /// Largest raw sample.
        max: f64,
    },
    /// Peak detection metrics.
    DetectPeaks {
        /// Minimum normalized height.
        height: f64,
        /// Minimum spacing in samples.
        min_distance: usize,
        /// Local maxima at or above `height`.
        candidates: usize,
        /// Peaks kept after spacing.
        accepted: usize,
    },
    /// Feature estimation metrics (unrounded).
    Estimate {
        /// Beats per minute.
        heart_rate: f64,
        /// Classification label.
        abnormality: String,
        /// Clamped stress score.
        stress_score: f64,
        /// Confidence score.
        confidence: f64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of accepted peaks.
    pub peak_count: usize,
    /// Reported (rounded) heart rate.
    pub heart_rate: f64,
}

impl PipelineDiagnostics {
    /// Stages in execution order, paired with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Decode", &self.decode),
            ("Binarize", &self.binarize),
            ("Extract", &self.extract),
            ("Detect Peaks", &self.detect_peaks),
            ("Estimate", &self.estimate),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Peaks: {}  |  Heart rate: {:.1} bpm",
            self.summary.peak_count, self.summary.heart_rate,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => {
            format!("{input_bytes} bytes -> {width}x{height}")
        }
        StageMetrics::Binarize {
            method,
            block_size,
            bias,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "{method} block={block_size} bias={bias:.1} trace={foreground_pixels} ({density:.1}%)",
            )
        }
        StageMetrics::Extract {
            reducer,
            samples,
            empty_columns,
            min,
            max,
        } => {
            format!("{reducer} {samples} samples, {empty_columns} empty cols, range {min:.1}..{max:.1}")
        }
        StageMetrics::DetectPeaks {
            height,
            min_distance,
            candidates,
            accepted,
        } => {
            format!("h>={height:.2} d>={min_distance} {candidates}->{accepted} peaks")
        }
        StageMetrics::Estimate {
            heart_rate,
            abnormality,
            stress_score,
            confidence,
        } => {
            format!("{heart_rate:.1} bpm {abnormality} stress={stress_score:.1} conf={confidence:.1}")
        }
    }
}

/// Run the full pipeline, timing each stage with `clock`.
///
/// Produces exactly the same [`StagedResult`] as
/// [`crate::process_staged`].
///
/// # Errors
///
/// Returns [`PipelineError`] for an invalid config or an image that
/// cannot be decoded.
pub fn process_staged_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &AnalysisConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let pipeline_start = clock.now();

    let start = clock.now();
    let decoded = Pipeline::new(image_bytes.to_vec(), config.clone()).decode()?;
    let decode = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: decoded.stage_metrics(),
    };

    let start = clock.now();
    let binarized = decoded.binarize();
    let binarize = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: binarized.stage_metrics(),
    };

    let start = clock.now();
    let extracted = binarized.extract();
    let extract = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: extracted.stage_metrics(),
    };

    let start = clock.now();
    let peaks = extracted.detect_peaks();
    let detect_peaks = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: peaks.stage_metrics(),
    };

    let start = clock.now();
    let analyzed = peaks.estimate();
    let estimate = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: analyzed.stage_metrics(),
    };

    let staged = analyzed.into_result();
    let total_duration = clock.elapsed(&pipeline_start);

    let summary = PipelineSummary {
        image_width: staged.dimensions.width,
        image_height: staged.dimensions.height,
        pixel_count: staged.dimensions.pixel_count(),
        peak_count: staged.peaks.len(),
        heart_rate: staged.result.heart_rate,
    };

    Ok((
        staged,
        PipelineDiagnostics {
            decode,
            binarize,
            extract,
            detect_peaks,
            estimate,
            total_duration,
            summary,
        },
    ))
}
