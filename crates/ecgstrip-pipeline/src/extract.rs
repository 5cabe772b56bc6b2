//! Signal extraction: collapse a binary trace mask into one value per column.
//!
//! This module defines the [`ColumnReducer`] trait for pluggable
//! per-column summary statistics and the [`ColumnReducerKind`] enum for
//! selecting one at runtime.
//!
//! Grid lines that survive binarization show up as a few scattered
//! foreground rows in a column, while the trace itself is a dense run.
//! The reducers here are chosen so those sparse outliers barely move the
//! result.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::types::{AnalysisConfig, Waveform};

/// Selects which per-column reduction to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnReducerKind {
    /// Median foreground row; the mean of the two middle rows for an even
    /// count.
    #[default]
    Median,
    /// Mean of the foreground rows after discarding
    /// [`AnalysisConfig::trim_fraction`] of them from each end.
    TrimmedMean,
}

impl fmt::Display for ColumnReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => f.write_str("Median"),
            Self::TrimmedMean => f.write_str("TrimmedMean"),
        }
    }
}

/// Trait for per-column reduction strategies.
///
/// Input: the ascending row indices of foreground pixels in one column.
/// Output: a single row position, or `None` when the column is empty.
pub trait ColumnReducer {
    /// Reduce the foreground rows of one column.
    fn reduce(&self, rows: &[u32], config: &AnalysisConfig) -> Option<f64>;
}

impl ColumnReducer for ColumnReducerKind {
    fn reduce(&self, rows: &[u32], config: &AnalysisConfig) -> Option<f64> {
        match *self {
            Self::Median => median(rows),
            Self::TrimmedMean => trimmed_mean(rows, config.trim_fraction),
        }
    }
}

/// Median of sorted rows.
fn median(rows: &[u32]) -> Option<f64> {
    let n = rows.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        Some(f64::from(rows[mid]))
    } else {
        Some(f64::midpoint(f64::from(rows[mid - 1]), f64::from(rows[mid])))
    }
}

/// Mean of sorted rows with `fraction` of the count dropped from each end.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn trimmed_mean(rows: &[u32], fraction: f64) -> Option<f64> {
    let n = rows.len();
    if n == 0 {
        return None;
    }
    let k = ((n as f64) * fraction.clamp(0.0, 0.5)).floor() as usize;
    let kept = if 2 * k < n { &rows[k..n - k] } else { rows };
    let sum: f64 = kept.iter().map(|&r| f64::from(r)).sum();
    Some(sum / kept.len() as f64)
}

/// Whether a mask pixel counts as trace.
const fn is_foreground(value: u8) -> bool {
    value > 127
}

/// Build the waveform from a binary mask.
///
/// For each column, the foreground rows are reduced with `reducer`. An
/// empty column repeats the previous column's value; an empty first
/// column starts at the vertical midline (`height / 2`). Every value is
/// then flipped to `height - row` so upward deflections grow.
///
/// The result always has exactly `mask.width()` samples, each in
/// `[0, height]`.
#[must_use = "returns the extracted waveform"]
pub fn extract_waveform(
    mask: &GrayImage,
    reducer: &impl ColumnReducer,
    config: &AnalysisConfig,
) -> Waveform {
    let (width, height) = mask.dimensions();
    let midline = f64::from(height / 2);

    let mut raw: Vec<f64> = Vec::with_capacity(width as usize);
    let mut rows: Vec<u32> = Vec::with_capacity(height as usize);
    for x in 0..width {
        rows.clear();
        rows.extend((0..height).filter(|&y| is_foreground(mask.get_pixel(x, y).0[0])));
        let value = reducer
            .reduce(&rows, config)
            .unwrap_or_else(|| raw.last().copied().unwrap_or(midline));
        raw.push(value);
    }

    let top = f64::from(height);
    Waveform::new(raw.into_iter().map(|row| top - row).collect())
}

/// Number of columns without any foreground pixel.
#[must_use]
pub fn empty_columns(mask: &GrayImage) -> usize {
    (0..mask.width())
        .filter(|&x| (0..mask.height()).all(|y| !is_foreground(mask.get_pixel(x, y).0[0])))
        .count()
}
