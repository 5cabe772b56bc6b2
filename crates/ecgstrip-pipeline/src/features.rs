//! Feature estimation: heart rate, rhythm label, stress, and confidence
//! derived from peak statistics.
//!
//! All formulas assume the image spans a fixed recording window
//! ([`AnalysisConfig::window_seconds`]) across its full width, so one
//! column corresponds to `window_seconds / width` seconds.

use serde::{Deserialize, Serialize};

use crate::types::{
    Abnormality, AnalysisConfig, AnalysisResult, NormalizedWaveform, PeakSet, StressLevel,
    Waveform,
};

/// Stress score used when there are too few peaks to measure variability.
pub const DEFAULT_STRESS_SCORE: f64 = 30.0;

/// Lower bound of the stress score.
pub const MIN_STRESS_SCORE: f64 = 10.0;

/// Upper bound of the stress score.
pub const MAX_STRESS_SCORE: f64 = 95.0;

/// Confidence contributed by each detected peak.
pub const CONFIDENCE_PER_PEAK: f64 = 15.0;

/// Ceiling of the confidence score.
pub const MAX_CONFIDENCE: f64 = 99.0;

/// Unrounded metrics derived from one strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Number of accepted peaks.
    pub peak_count: usize,
    /// Mean distance between consecutive peaks, in samples.
    pub avg_interval: Option<f64>,
    /// Population standard deviation of the peak intervals, in samples.
    pub hrv: Option<f64>,
    /// Beats per minute; `0.0` with fewer than two peaks.
    pub heart_rate: f64,
    /// Rhythm label.
    pub abnormality: Abnormality,
    /// Clamped stress score in `[10, 95]`.
    pub stress_score: f64,
    /// Stress label for `stress_score`.
    pub stress_level: StressLevel,
    /// Confidence in `[0, 99]`.
    pub confidence: f64,
    /// `max - min` of the normalized waveform.
    pub normalized_range: f64,
}

impl Features {
    /// Assemble the final result record around the raw waveform.
    ///
    /// Heart rate and confidence are rounded to one decimal here and
    /// nowhere else.
    #[must_use]
    pub fn to_result(&self, waveform: &Waveform) -> AnalysisResult {
        AnalysisResult {
            waveform: waveform.samples().to_vec(),
            heart_rate: round1(self.heart_rate),
            abnormality: self.abnormality,
            stress_level: self.stress_level,
            confidence_score: round1(self.confidence),
            medical_advice: self.abnormality.advice().to_owned(),
        }
    }
}

impl StressLevel {
    /// Label a stress score: above 70 is high, above 40 moderate.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            Self::High
        } else if score > 40.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[usize]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

#[allow(clippy::cast_precision_loss)]
fn population_std(values: &[usize]) -> Option<f64> {
    let m = mean(values)?;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(var.sqrt())
}

/// Mean peak interval in samples, when at least two peaks exist.
#[must_use]
pub fn average_interval(peaks: &PeakSet) -> Option<f64> {
    mean(&peaks.intervals())
}

/// Heart rate in beats per minute.
///
/// `60 * (width / window_seconds) / avg_interval` with at least two
/// peaks, otherwise `0.0`.
#[must_use]
pub fn heart_rate(peaks: &PeakSet, width: u32, window_seconds: f64) -> f64 {
    match average_interval(peaks) {
        Some(avg) if avg > 0.0 => {
            let pixels_per_sec = f64::from(width) / window_seconds;
            60.0 * pixels_per_sec / avg
        }
        _ => 0.0,
    }
}

/// Rhythm label with the documented priority: the rate bands first, then
/// the fewer-than-two-peaks override last.
#[must_use]
pub fn classify(
    heart_rate: f64,
    peak_count: usize,
    bradycardia_below: f64,
    tachycardia_above: f64,
) -> Abnormality {
    let mut label = Abnormality::Normal;
    if heart_rate < bradycardia_below {
        label = Abnormality::Bradycardia;
    } else if heart_rate > tachycardia_above {
        label = Abnormality::Tachycardia;
    }

    // A zero rate would otherwise read as bradycardia.
    if peak_count < 2 {
        label = Abnormality::SignalUnclear;
    }
    label
}

/// Heart-rate variability: population standard deviation of the peak
/// intervals, defined with more than two peaks.
#[must_use]
pub fn hrv(peaks: &PeakSet) -> Option<f64> {
    if peaks.len() > 2 {
        population_std(&peaks.intervals())
    } else {
        None
    }
}

/// Stress score, clamped to `[10, 95]`.
///
/// High rate and low variability push the score up:
/// `heart_rate / 150 * 50 + (10 - hrv / width * 100)`. Without enough
/// peaks for a variability estimate the score is 30.
#[must_use]
pub fn stress_score(peaks: &PeakSet, heart_rate: f64, width: u32) -> f64 {
    let raw = hrv(peaks).map_or(DEFAULT_STRESS_SCORE, |hrv| {
        (heart_rate / 150.0).mul_add(50.0, 10.0 - hrv / f64::from(width) * 100.0)
    });
    raw.clamp(MIN_STRESS_SCORE, MAX_STRESS_SCORE)
}

/// Confidence score in `[0, 99]`.
///
/// 15 points per peak, capped at 99, then halved when the normalized
/// range falls below `weak_signal_range`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn confidence(peak_count: usize, normalized_range: f64, weak_signal_range: f64) -> f64 {
    let base = (peak_count as f64 * CONFIDENCE_PER_PEAK).min(MAX_CONFIDENCE);
    if normalized_range < weak_signal_range {
        base * 0.5
    } else {
        base
    }
}

/// Round half away from zero to one decimal place.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Derive every feature for one strip.
#[must_use]
pub fn estimate(
    normalized: &NormalizedWaveform,
    peaks: &PeakSet,
    width: u32,
    config: &AnalysisConfig,
) -> Features {
    let heart_rate = heart_rate(peaks, width, config.window_seconds);
    let stress_score = stress_score(peaks, heart_rate, width);
    let normalized_range = normalized.range();
    Features {
        peak_count: peaks.len(),
        avg_interval: average_interval(peaks),
        hrv: hrv(peaks),
        heart_rate,
        abnormality: classify(
            heart_rate,
            peaks.len(),
            config.bradycardia_below,
            config.tachycardia_above,
        ),
        stress_score,
        stress_level: StressLevel::from_score(stress_score),
        confidence: confidence(peaks.len(), normalized_range, config.weak_signal_range),
        normalized_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks(indices: &[usize]) -> PeakSet {
        PeakSet::new(indices.to_vec())
    }

    #[test]
    fn heart_rate_from_even_spacing() {
        // 800 px over 5 s = 160 px/s; 150 px per beat -> 64 bpm.
        let p = peaks(&[100, 250, 400, 550, 700]);
        assert!((heart_rate(&p, 800, 5.0) - 64.0).abs() < 1e-9);
        let p = peaks(&[100, 175, 250, 325]);
        assert!((heart_rate(&p, 800, 5.0) - 128.0).abs() < 1e-9);
    }

    #[test]
    fn heart_rate_needs_two_peaks() {
        assert!(heart_rate(&peaks(&[]), 800, 5.0).abs() < f64::EPSILON);
        assert!(heart_rate(&peaks(&[300]), 800, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn window_length_scales_rate() {
        let p = peaks(&[100, 250]);
        let five = heart_rate(&p, 800, 5.0);
        let ten = heart_rate(&p, 800, 10.0);
        assert!((five - 2.0 * ten).abs() < 1e-9);
    }

    #[test]
    fn classification_bands() {
        assert_eq!(classify(64.0, 5, 60.0, 100.0), Abnormality::Normal);
        assert_eq!(classify(60.0, 5, 60.0, 100.0), Abnormality::Normal);
        assert_eq!(classify(100.0, 5, 60.0, 100.0), Abnormality::Normal);
        assert_eq!(classify(59.9, 5, 60.0, 100.0), Abnormality::Bradycardia);
        assert_eq!(classify(128.0, 5, 60.0, 100.0), Abnormality::Tachycardia);
    }

    #[test]
    fn too_few_peaks_override_bradycardia() {
        assert_eq!(classify(0.0, 0, 60.0, 100.0), Abnormality::SignalUnclear);
        assert_eq!(classify(0.0, 1, 60.0, 100.0), Abnormality::SignalUnclear);
    }

    #[test]
    fn stress_defaults_with_two_or_fewer_peaks() {
        assert!((stress_score(&peaks(&[10, 20]), 200.0, 800) - 30.0).abs() < f64::EPSILON);
        assert_eq!(StressLevel::from_score(30.0), StressLevel::Low);
    }

    #[test]
    fn stress_formula_with_regular_rhythm() {
        // hrv = 0: 64/150*50 + 10 = 31.33...
        let p = peaks(&[100, 250, 400, 550, 700]);
        let s = stress_score(&p, 64.0, 800);
        assert!((s - (64.0 / 150.0 * 50.0 + 10.0)).abs() < 1e-9);
        assert_eq!(StressLevel::from_score(s), StressLevel::Low);
    }

    #[test]
    fn stress_is_clamped() {
        let p = peaks(&[0, 1, 2, 3]);
        assert!((stress_score(&p, 10_000.0, 800) - 95.0).abs() < f64::EPSILON);
        // Wildly irregular intervals drive the raw score negative.
        let p = peaks(&[0, 1, 700, 701]);
        assert!((stress_score(&p, 0.0, 800) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stress_labels() {
        assert_eq!(StressLevel::from_score(40.0), StressLevel::Low);
        assert_eq!(StressLevel::from_score(40.1), StressLevel::Moderate);
        assert_eq!(StressLevel::from_score(70.0), StressLevel::Moderate);
        assert_eq!(StressLevel::from_score(70.1), StressLevel::High);
    }

    #[test]
    fn hrv_is_population_std() {
        // intervals 10, 20 -> mean 15, population std 5.
        let h = hrv(&peaks(&[0, 10, 30])).unwrap_or_default();
        assert!((h - 5.0).abs() < 1e-12);
        assert!(hrv(&peaks(&[0, 10])).is_none());
    }

    #[test]
    fn confidence_scales_and_caps() {
        assert!(confidence(0, 1.0, 0.2).abs() < f64::EPSILON);
        assert!((confidence(3, 1.0, 0.2) - 45.0).abs() < f64::EPSILON);
        assert!((confidence(7, 1.0, 0.2) - 99.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weak_signal_halves_confidence() {
        assert!((confidence(3, 0.1, 0.2) - 22.5).abs() < f64::EPSILON);
        assert!((confidence(10, 0.19, 0.2) - 49.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert!((round1(63.96) - 64.0).abs() < f64::EPSILON);
        assert!((round1(22.5) - 22.5).abs() < f64::EPSILON);
        assert!((round1(128.04) - 128.0).abs() < f64::EPSILON);
    }

    #[test]
    fn estimate_without_peaks() {
        let n = NormalizedWaveform::new(vec![0.0; 50]);
        let f = estimate(&n, &PeakSet::default(), 50, &AnalysisConfig::default());
        assert_eq!(f.abnormality, Abnormality::SignalUnclear);
        assert!(f.heart_rate.abs() < f64::EPSILON);
        assert!(f.confidence.abs() < f64::EPSILON);
        assert_eq!(f.stress_level, StressLevel::Low);

        let r = f.to_result(&Waveform::new(vec![25.0; 50]));
        assert_eq!(r.waveform.len(), 50);
        assert_eq!(r.medical_advice, Abnormality::SignalUnclear.advice());
    }
}
