//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::analyze`] which runs the whole analysis in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use ecgstrip_pipeline::{AnalysisConfig, Pipeline, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let staged = Pipeline::new(png, AnalysisConfig::default())
//!     .decode()?
//!     .binarize()
//!     .extract()
//!     .detect_peaks()
//!     .estimate()
//!     .into_result();
//! println!("{} bpm", staged.result.heart_rate);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for the fallible decode step), carrying all previously
//! computed intermediates. Data only flows forward; no stage revisits an
//! earlier one.
//!
//! # Memory
//!
//! Every stage from [`Binarized`] onward keeps the original RGB image,
//! the luminance image and the mask alive so [`StagedResult`] can expose
//! them. Callers that only need the final record should prefer
//! [`crate::analyze`], which drops each intermediate as soon as the
//! next one exists.

use crate::diagnostics::StageMetrics;
use crate::extract::ColumnReducerKind;
use crate::features::Features;
use crate::types::{
    AnalysisConfig, AnalysisResult, Dimensions, GrayImage, NormalizedWaveform, PeakSet,
    PipelineError, RgbImage, StagedResult, Waveform,
};

/// Dimensions of an RGB image.
fn dimensions_of(image: &RgbImage) -> Dimensions {
    Dimensions {
        width: image.width(),
        height: image.height(),
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    config: AnalysisConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate the config, decode the source image, and advance to
    /// [`Decoded`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad config and
    /// [`PipelineError::InvalidImage`] when the bytes are empty,
    /// undecodable, or decode to an image without pixels.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let source_len = self.source.len();
        let original = crate::decode::decode(&self.source)?;
        Ok(Decoded {
            config: self.config,
            dimensions: dimensions_of(&original),
            original,
            source_len,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding (or accepting) the source image.
///
/// Call [`binarize`](Self::binarize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .binarize() to continue"]
pub struct Decoded {
    config: AnalysisConfig,
    original: RgbImage,
    source_len: usize,
    dimensions: Dimensions,
}

impl Decoded {
    /// The decoded RGB image.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        }
    }

    /// Convert to luminance and apply the adaptive threshold.
    pub fn binarize(self) -> Binarized {
        let luminance = crate::decode::to_luminance(&self.original);
        let mask = crate::threshold::binarize(
            &luminance,
            self.config.threshold_method,
            self.config.block_size,
            self.config.threshold_bias,
        );
        Binarized {
            config: self.config,
            original: self.original,
            luminance,
            mask,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Binarized ────────────────────────

/// Pipeline state after binarization.
///
/// Call [`extract`](Self::extract) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .extract() to continue"]
pub struct Binarized {
    config: AnalysisConfig,
    original: RgbImage,
    luminance: GrayImage,
    mask: GrayImage,
    dimensions: Dimensions,
}

impl Binarized {
    /// The luminance image the threshold ran on.
    #[must_use]
    pub const fn luminance(&self) -> &GrayImage {
        &self.luminance
    }

    /// The binary trace mask (255 = trace).
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Binarize {
            method: self.config.threshold_method.to_string(),
            block_size: self.config.block_size,
            bias: self.config.threshold_bias,
            foreground_pixels: crate::threshold::foreground_count(&self.mask),
            total_pixels: self.dimensions.pixel_count(),
        }
    }

    /// Collapse the mask into a waveform and normalize it.
    pub fn extract(self) -> Extracted {
        let reducer: ColumnReducerKind = self.config.column_reducer;
        let waveform = crate::extract::extract_waveform(&self.mask, &reducer, &self.config);
        let normalized = crate::normalize::normalize(&waveform, self.config.normalize_epsilon);
        let empty_columns = crate::extract::empty_columns(&self.mask);
        Extracted {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            mask: self.mask,
            waveform,
            normalized,
            empty_columns,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 3: Extracted ────────────────────────

/// Pipeline state after signal extraction and normalization.
///
/// Call [`detect_peaks`](Self::detect_peaks) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .detect_peaks() to continue"]
pub struct Extracted {
    config: AnalysisConfig,
    original: RgbImage,
    luminance: GrayImage,
    mask: GrayImage,
    waveform: Waveform,
    normalized: NormalizedWaveform,
    empty_columns: usize,
    dimensions: Dimensions,
}

impl Extracted {
    /// The raw waveform.
    #[must_use]
    pub const fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    /// The waveform rescaled to `[0, 1]`.
    #[must_use]
    pub const fn normalized(&self) -> &NormalizedWaveform {
        &self.normalized
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Extract {
            reducer: self.config.column_reducer.to_string(),
            samples: self.waveform.len(),
            empty_columns: self.empty_columns,
            min: self.waveform.min().unwrap_or_default(),
            max: self.waveform.max().unwrap_or_default(),
        }
    }

    /// Find heartbeat peaks in the normalized waveform.
    pub fn detect_peaks(self) -> PeaksDetected {
        let min_distance =
            crate::peaks::min_peak_distance(self.waveform.len(), self.config.peak_spacing_divisor);
        let samples = self.normalized.samples();
        let candidates = crate::peaks::find_candidates(samples, self.config.peak_height);
        let peaks = PeakSet::new(crate::peaks::select_by_distance(
            samples,
            &candidates,
            min_distance,
        ));
        PeaksDetected {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            mask: self.mask,
            waveform: self.waveform,
            normalized: self.normalized,
            candidate_count: candidates.len(),
            min_distance,
            peaks,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 4: PeaksDetected ────────────────────

/// Pipeline state after peak detection.
///
/// Call [`estimate`](Self::estimate) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .estimate() to continue"]
pub struct PeaksDetected {
    config: AnalysisConfig,
    original: RgbImage,
    luminance: GrayImage,
    mask: GrayImage,
    waveform: Waveform,
    normalized: NormalizedWaveform,
    candidate_count: usize,
    min_distance: usize,
    peaks: PeakSet,
    dimensions: Dimensions,
}

impl PeaksDetected {
    /// The accepted peaks.
    #[must_use]
    pub const fn peaks(&self) -> &PeakSet {
        &self.peaks
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::DetectPeaks {
            height: self.config.peak_height,
            min_distance: self.min_distance,
            candidates: self.candidate_count,
            accepted: self.peaks.len(),
        }
    }

    /// Derive the features and assemble the result record.
    pub fn estimate(self) -> Analyzed {
        let features = crate::features::estimate(
            &self.normalized,
            &self.peaks,
            self.dimensions.width,
            &self.config,
        );
        let result = features.to_result(&self.waveform);
        Analyzed {
            original: self.original,
            luminance: self.luminance,
            mask: self.mask,
            waveform: self.waveform,
            normalized: self.normalized,
            peaks: self.peaks,
            features,
            result,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 5: Analyzed ─────────────────────────

/// Pipeline state after feature estimation, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Analyzed {
    original: RgbImage,
    luminance: GrayImage,
    mask: GrayImage,
    waveform: Waveform,
    normalized: NormalizedWaveform,
    peaks: PeakSet,
    features: Features,
    result: AnalysisResult,
    dimensions: Dimensions,
}

impl Analyzed {
    /// The final result record.
    #[must_use]
    pub const fn result(&self) -> &AnalysisResult {
        &self.result
    }

    /// The unrounded features behind the result.
    #[must_use]
    pub const fn features(&self) -> &Features {
        &self.features
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Estimate {
            heart_rate: self.features.heart_rate,
            abnormality: self.features.abnormality.label().to_owned(),
            stress_score: self.features.stress_score,
            confidence: self.features.confidence,
        }
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            luminance: self.luminance,
            mask: self.mask,
            waveform: self.waveform,
            normalized: self.normalized,
            peaks: self.peaks,
            features: self.features,
            result: self.result,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 6;

/// The output produced by a single pipeline stage.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded RGB image.
    Decoded {
        /// The original image.
        original: &'a RgbImage,
    },
    /// Binarization result.
    Binarized {
        /// The binary trace mask.
        mask: &'a GrayImage,
    },
    /// Extraction result.
    Extracted {
        /// The raw waveform.
        waveform: &'a Waveform,
        /// The normalized waveform.
        normalized: &'a NormalizedWaveform,
    },
    /// Peak detection result.
    PeaksDetected {
        /// The accepted peaks.
        peaks: &'a PeakSet,
    },
    /// Final result record.
    Analyzed {
        /// The result record.
        result: &'a AnalysisResult,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// ```rust
/// # use ecgstrip_pipeline::{AnalysisConfig, Pipeline, PipelineError};
/// # use ecgstrip_pipeline::pipeline::{Advance, Stage};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, AnalysisConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let staged = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Short name of this stage (e.g. `"source"`, `"peaks"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `5` for
    /// Analyzed).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics; `None` for [`Pending`].
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success or `Ok(None)` if already at
    /// the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when decoding fails or the config is
    /// invalid.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Decoded(self.decode()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.decode()?.complete()
    }
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            original: &self.original,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Binarized(self.binarize())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.binarize().complete()
    }
}

impl PipelineStage for Binarized {
    const NAME: &str = "binarize";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Binarized { mask: &self.mask }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Extracted(self.extract())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.extract().complete()
    }
}

impl PipelineStage for Extracted {
    const NAME: &str = "extract";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Extracted {
            waveform: &self.waveform,
            normalized: &self.normalized,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::PeaksDetected(self.detect_peaks())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.detect_peaks().complete()
    }
}

impl PipelineStage for PeaksDetected {
    const NAME: &str = "peaks";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::PeaksDetected { peaks: &self.peaks }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Analyzed(self.estimate())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.estimate().complete()
    }
}

impl PipelineStage for Analyzed {
    const NAME: &str = "analyze";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Analyzed {
            result: &self.result,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Decoded`].
    Decoded(Decoded),
    /// See [`Binarized`].
    Binarized(Binarized),
    /// See [`Extracted`].
    Extracted(Extracted),
    /// See [`PeaksDetected`].
    PeaksDetected(PeaksDetected),
    /// See [`Analyzed`].
    Analyzed(Analyzed),
}

/// Compile-time guard: adding a [`Stage`] variant breaks this match,
/// a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Binarized(_)
        | Stage::Extracted(_)
        | Stage::PeaksDetected(_)
        | Stage::Analyzed(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Binarized(s) => s.$method($($arg),*),
            Self::Extracted(s) => s.$method($($arg),*),
            Self::PeaksDetected(s) => s.$method($($arg),*),
            Self::Analyzed(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Short name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Analyzed(_))
    }

    /// Advance to the next stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Non-complete stages always return Ok(Some(_)) from next().
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// Lets the macro call `.name()` and `.index()` on `&self`; associated
// constants are not reachable through `self`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Decoded> for Stage {
    fn from(s: Decoded) -> Self {
        Self::Decoded(s)
    }
}

impl From<Binarized> for Stage {
    fn from(s: Binarized) -> Self {
        Self::Binarized(s)
    }
}

impl From<Extracted> for Stage {
    fn from(s: Extracted) -> Self {
        Self::Extracted(s)
    }
}

impl From<PeaksDetected> for Stage {
    fn from(s: PeaksDetected) -> Self {
        Self::PeaksDetected(s)
    }
}

impl From<Analyzed> for Stage {
    fn from(s: Analyzed) -> Self {
        Self::Analyzed(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental ECG strip analysis pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or run them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from encoded image bytes and config.
    ///
    /// Nothing is processed until [`.decode()`](Pending::decode).
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: AnalysisConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }

    /// Start from an already-decoded image, skipping the decode stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad config and
    /// [`PipelineError::InvalidImage`] for an image without pixels.
    pub fn from_image(image: RgbImage, config: AnalysisConfig) -> Result<Decoded, PipelineError> {
        config.validate()?;
        crate::decode::validate_dimensions(&image)?;
        Ok(Decoded {
            config,
            dimensions: dimensions_of(&image),
            original: image,
            source_len: 0,
        })
    }
}
