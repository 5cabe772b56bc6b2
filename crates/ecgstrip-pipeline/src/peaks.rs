//! Heartbeat peak detection on the normalized waveform.
//!
//! Three passes:
//!
//! 1. [`local_maxima`]: every sample that rises from its left neighbour
//!    and is followed (possibly after a flat plateau) by a strictly lower
//!    sample. Plateaus report their midpoint, rounded down. The first and
//!    last samples are never maxima.
//! 2. Height filter: keep maxima at or above the height threshold.
//! 3. [`select_by_distance`]: walk candidates from tallest to shortest
//!    (leftmost first among equals). Each surviving candidate suppresses
//!    all candidates closer than the minimum distance. This collapses
//!    the small wiggles inside one QRS complex into a single beat.
//!
//! Finding no peaks is a valid outcome.

use crate::types::{NormalizedWaveform, PeakSet};

/// Minimum spacing between accepted peaks: `width / divisor`, at least 1.
#[must_use]
pub fn min_peak_distance(width: usize, divisor: u32) -> usize {
    (width / (divisor.max(1) as usize)).max(1)
}

/// Indices of all local maxima, plateau-aware, in ascending order.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn local_maxima(samples: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if samples.len() < 3 {
        return maxima;
    }
    let last = samples.len() - 1;

    let mut i = 1;
    while i < last {
        if samples[i - 1] < samples[i] {
            let mut ahead = i + 1;
            while ahead < last && samples[ahead] == samples[i] {
                ahead += 1;
            }
            if samples[ahead] < samples[i] {
                maxima.push(usize::midpoint(i, ahead - 1));
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Local maxima whose value is at least `height`.
#[must_use]
pub fn find_candidates(samples: &[f64], height: f64) -> Vec<usize> {
    local_maxima(samples)
        .into_iter()
        .filter(|&i| samples[i] >= height)
        .collect()
}

/// Enforce a minimum spacing between ascending `candidates`, preferring
/// taller peaks.
///
/// Every pair of consecutive survivors is at least `min_distance`
/// samples apart. The output stays in ascending order.
#[must_use]
pub fn select_by_distance(samples: &[f64], candidates: &[usize], min_distance: usize) -> Vec<usize> {
    let n = candidates.len();
    if min_distance <= 1 || n < 2 {
        return candidates.to_vec();
    }

    let mut priority: Vec<usize> = (0..n).collect();
    priority.sort_by(|&a, &b| {
        samples[candidates[b]]
            .total_cmp(&samples[candidates[a]])
            .then(a.cmp(&b))
    });

    let mut keep = vec![true; n];
    for &j in &priority {
        if !keep[j] {
            continue;
        }
        let pos = candidates[j];

        let mut k = j;
        while k > 0 && pos - candidates[k - 1] < min_distance {
            k -= 1;
            keep[k] = false;
        }

        let mut k = j + 1;
        while k < n && candidates[k] - pos < min_distance {
            keep[k] = false;
            k += 1;
        }
    }

    candidates
        .iter()
        .zip(keep)
        .filter_map(|(&c, kept)| kept.then_some(c))
        .collect()
}

/// Detect heartbeat peaks in a normalized waveform.
#[must_use = "returns the detected peaks"]
pub fn detect_peaks(normalized: &NormalizedWaveform, height: f64, min_distance: usize) -> PeakSet {
    let samples = normalized.samples();
    let candidates = find_candidates(samples, height);
    PeakSet::new(select_by_distance(samples, &candidates, min_distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_uses_integer_division() {
        assert_eq!(min_peak_distance(800, 20), 40);
        assert_eq!(min_peak_distance(799, 20), 39);
        assert_eq!(min_peak_distance(10, 20), 1);
        assert_eq!(min_peak_distance(100, 0), 100);
    }

    #[test]
    fn simple_maxima() {
        let s = [0.0, 1.0, 0.0, 0.5, 0.2, 0.9, 0.1];
        assert_eq!(local_maxima(&s), vec![1, 3, 5]);
    }

    #[test]
    fn edges_are_never_maxima() {
        let s = [1.0, 0.5, 0.0, 0.5, 1.0];
        assert!(local_maxima(&s).is_empty());
    }

    #[test]
    fn plateau_reports_midpoint() {
        // Plateau spans 2..=5 -> midpoint 3.
        let s = [0.0, 0.2, 0.8, 0.8, 0.8, 0.8, 0.1];
        assert_eq!(local_maxima(&s), vec![3]);
        // Plateau of two -> the left sample.
        let s = [0.0, 0.7, 0.7, 0.0];
        assert_eq!(local_maxima(&s), vec![1]);
    }

    #[test]
    fn plateau_running_into_the_edge_is_not_a_maximum() {
        let s = [0.0, 0.6, 0.6, 0.6];
        assert!(local_maxima(&s).is_empty());
    }

    #[test]
    fn height_filter_is_inclusive() {
        let s = [0.0, 0.5, 0.0, 0.49, 0.0];
        assert_eq!(find_candidates(&s, 0.5), vec![1]);
    }

    #[test]
    fn taller_peak_wins_within_distance() {
        let mut s = vec![0.0; 20];
        s[5] = 0.8;
        s[7] = 1.0;
        s[15] = 0.9;
        let candidates = find_candidates(&s, 0.5);
        assert_eq!(candidates, vec![5, 7, 15]);
        assert_eq!(select_by_distance(&s, &candidates, 5), vec![7, 15]);
    }

    #[test]
    fn equal_heights_keep_the_leftmost() {
        let mut s = vec![0.0; 12];
        s[3] = 0.9;
        s[5] = 0.9;
        let candidates = find_candidates(&s, 0.5);
        assert_eq!(select_by_distance(&s, &candidates, 4), vec![3]);
    }

    #[test]
    fn exact_distance_is_allowed() {
        let mut s = vec![0.0; 12];
        s[2] = 0.9;
        s[6] = 0.8;
        let candidates = find_candidates(&s, 0.5);
        assert_eq!(select_by_distance(&s, &candidates, 4), vec![2, 6]);
    }

    #[test]
    fn flat_waveform_has_no_peaks() {
        let n = NormalizedWaveform::new(vec![0.0; 100]);
        assert!(detect_peaks(&n, 0.5, 5).is_empty());
    }

    #[test]
    fn periodic_spikes_are_all_found() {
        let samples: Vec<f64> = (0..200)
            .map(|i| if i % 50 == 25 { 1.0 } else { 0.1 })
            .collect();
        let peaks = detect_peaks(&NormalizedWaveform::new(samples), 0.5, 10);
        assert_eq!(peaks.indices(), &[25, 75, 125, 175]);
    }
}
