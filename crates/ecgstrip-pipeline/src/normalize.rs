//! Waveform normalization to `[0, 1]`.
//!
//! The transform is:
//!
//! ```text
//! norm[i] = (w[i] - min(w)) / (max(w) - min(w) + epsilon)
//! ```
//!
//! `epsilon` keeps a perfectly flat waveform (min == max) from dividing
//! by zero; such a waveform normalizes to all zeros.

use crate::types::{NormalizedWaveform, Waveform};

/// Rescale a waveform by its own global extremes.
#[must_use]
pub fn normalize(waveform: &Waveform, epsilon: f64) -> NormalizedWaveform {
    let (Some(min), Some(max)) = (waveform.min(), waveform.max()) else {
        return NormalizedWaveform::new(Vec::new());
    };
    let span = max - min + epsilon;
    NormalizedWaveform::new(
        waveform
            .samples()
            .iter()
            .map(|&v| if span > 0.0 { (v - min) / span } else { 0.0 })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_map_near_zero_and_one() {
        let w = Waveform::new(vec![200.0, 250.0, 300.0]);
        let n = normalize(&w, 1e-6);
        let s = n.samples();
        assert!(s[0].abs() < 1e-12);
        assert!((s[1] - 0.5).abs() < 1e-6);
        assert!((s[2] - 1.0).abs() < 1e-6);
        assert!(s[2] < 1.0, "epsilon keeps the maximum just below one");
    }

    #[test]
    fn flat_waveform_normalizes_to_zeros() {
        let w = Waveform::new(vec![200.0; 5]);
        let n = normalize(&w, 1e-6);
        assert!(n.samples().iter().all(|&v| v == 0.0));
        assert!(n.range().abs() < f64::EPSILON);
    }

    #[test]
    fn flat_waveform_with_zero_epsilon_does_not_divide_by_zero() {
        let w = Waveform::new(vec![3.0; 4]);
        let n = normalize(&w, 0.0);
        assert!(n.samples().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn empty_waveform_stays_empty() {
        assert!(normalize(&Waveform::new(vec![]), 1e-6).is_empty());
    }

    #[test]
    fn preserves_length() {
        let w = Waveform::new((0..37).map(f64::from).collect());
        assert_eq!(normalize(&w, 1e-6).len(), 37);
    }
}
