//! Property tests for the per-stage invariants.

#![allow(clippy::unwrap_used)]

use ecgstrip_pipeline::extract::{ColumnReducerKind, extract_waveform};
use ecgstrip_pipeline::features::{self, MAX_CONFIDENCE, MAX_STRESS_SCORE, MIN_STRESS_SCORE};
use ecgstrip_pipeline::normalize::normalize;
use ecgstrip_pipeline::peaks::detect_peaks;
use ecgstrip_pipeline::{Abnormality, AnalysisConfig, GrayImage, PeakSet, Waveform};
use proptest::prelude::*;

/// A random sparse binary mask up to 39x39.
fn mask_strategy() -> impl Strategy<Value = GrayImage> {
    (1u32..40, 1u32..40).prop_flat_map(|(w, h)| {
        prop::collection::vec(prop::bool::weighted(0.1), (w * h) as usize).prop_map(move |bits| {
            let raw = bits.into_iter().map(|on| if on { 255 } else { 0 }).collect();
            GrayImage::from_raw(w, h, raw).unwrap()
        })
    })
}

fn column_is_empty(mask: &GrayImage, x: u32) -> bool {
    (0..mask.height()).all(|y| mask.get_pixel(x, y).0[0] <= 127)
}

proptest! {
    #[test]
    fn waveform_has_width_samples_within_height(
        mask in mask_strategy(),
        trimmed in any::<bool>(),
    ) {
        let reducer = if trimmed { ColumnReducerKind::TrimmedMean } else { ColumnReducerKind::Median };
        let w = extract_waveform(&mask, &reducer, &AnalysisConfig::default());
        prop_assert_eq!(w.len(), mask.width() as usize);
        let top = f64::from(mask.height());
        prop_assert!(w.samples().iter().all(|&v| (0.0..=top).contains(&v)));
    }

    #[test]
    fn empty_columns_repeat_the_previous_value(mask in mask_strategy()) {
        let w = extract_waveform(&mask, &ColumnReducerKind::Median, &AnalysisConfig::default());
        let s = w.samples();
        for x in 1..mask.width() {
            if column_is_empty(&mask, x) {
                prop_assert!((s[x as usize] - s[x as usize - 1]).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn normalized_values_lie_in_unit_interval(
        samples in prop::collection::vec(0.0f64..2000.0, 1..300),
    ) {
        let n = normalize(&Waveform::new(samples.clone()), AnalysisConfig::DEFAULT_NORMALIZE_EPSILON);
        prop_assert_eq!(n.len(), samples.len());
        prop_assert!(n.samples().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn peaks_are_ascending_spaced_and_tall(
        samples in prop::collection::vec(0.0f64..1.0, 0..400),
        height in 0.0f64..1.0,
        min_distance in 1usize..60,
    ) {
        let n = normalize(&Waveform::new(samples), 1e-6);
        let peaks = detect_peaks(&n, height, min_distance);
        let idx = peaks.indices();
        for pair in idx.windows(2) {
            prop_assert!(pair[0] < pair[1]);
            prop_assert!(pair[1] - pair[0] >= min_distance);
        }
        for &i in idx {
            prop_assert!(n.samples()[i] >= height);
            prop_assert!(i > 0 && i + 1 < n.len());
        }
    }

    #[test]
    fn stress_score_is_clamped(
        mut indices in prop::collection::vec(0usize..5000, 0..30),
        width in 1u32..5000,
    ) {
        indices.sort_unstable();
        indices.dedup();
        let peaks = PeakSet::new(indices);
        let hr = features::heart_rate(&peaks, width, AnalysisConfig::DEFAULT_WINDOW_SECONDS);
        let score = features::stress_score(&peaks, hr, width);
        prop_assert!((MIN_STRESS_SCORE..=MAX_STRESS_SCORE).contains(&score));
    }

    #[test]
    fn confidence_is_bounded(
        peak_count in 0usize..1000,
        range in 0.0f64..1.0,
    ) {
        let c = features::confidence(peak_count, range, AnalysisConfig::DEFAULT_WEAK_SIGNAL_RANGE);
        prop_assert!((0.0..=MAX_CONFIDENCE).contains(&c));
    }

    #[test]
    fn fewer_than_two_peaks_is_always_unclear(
        heart_rate in 0.0f64..300.0,
        peak_count in 0usize..2,
    ) {
        let label = features::classify(heart_rate, peak_count, 60.0, 100.0);
        prop_assert_eq!(label, Abnormality::SignalUnclear);
    }

    #[test]
    fn rounding_keeps_one_decimal(value in -1000.0f64..1000.0) {
        let r = features::round1(value);
        prop_assert!((r - value).abs() <= 0.05 + 1e-9);
        prop_assert!(((r * 10.0).round() - r * 10.0).abs() < 1e-6);
    }
}
