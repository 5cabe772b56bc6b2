//! ecgstrip: analyze a photographed ECG strip from the command line.
//!
//! Reads an image file, runs the analysis pipeline with configurable
//! calibration, and prints the result record. Useful for:
//!
//! - Checking a strip quickly (`--json` for the machine-readable record)
//! - Tuning the threshold block size, bias and peak height
//! - Measuring per-stage durations (`--diagnostics --runs N`)
//!
//! Logs go to stderr, controlled by `RUST_LOG` (default `info`).
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin ecgstrip -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use ecgstrip_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use ecgstrip_pipeline::{AnalysisConfig, AnalysisResult, ColumnReducerKind, ThresholdMethod};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Heart-rate estimation from an ECG strip image.
///
/// Binarizes the strip, traces the waveform column by column, counts
/// R peaks and derives heart rate, rhythm class, stress level and a
/// confidence score.
#[derive(Parser)]
#[command(name = "ecgstrip", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Local-mean method for the adaptive threshold.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_METHOD)]
    threshold_method: Method,

    /// Threshold neighborhood side length (odd, 3..=255).
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Constant subtracted from the local mean.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_THRESHOLD_BIAS, allow_negative_numbers = true)]
    threshold_bias: f32,

    /// Per-column reduction of trace pixels.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_REDUCER)]
    column_reducer: Reducer,

    /// Fraction trimmed from each end by the trimmed-mean reducer.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_TRIM_FRACTION)]
    trim_fraction: f64,

    /// Seconds spanned by the strip width.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_WINDOW_SECONDS)]
    window_seconds: f64,

    /// Minimum normalized peak height.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_PEAK_HEIGHT)]
    peak_height: f64,

    /// Minimum peak spacing is `width / divisor`.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_PEAK_SPACING_DIVISOR)]
    peak_spacing_divisor: u32,

    /// Added to the normalization denominator.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_NORMALIZE_EPSILON)]
    normalize_epsilon: f64,

    /// Heart rates below this are bradycardia.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_BRADYCARDIA_BELOW)]
    bradycardia_below: f64,

    /// Heart rates above this are tachycardia.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_TACHYCARDIA_ABOVE)]
    tachycardia_above: f64,

    /// Normalized range below which confidence is halved.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_WEAK_SIGNAL_RANGE)]
    weak_signal_range: f64,

    /// Full analysis config as a JSON string.
    ///
    /// When provided, all other calibration flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the result record as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Print the per-stage diagnostics report (to stderr with `--json`).
    #[arg(long)]
    diagnostics: bool,

    /// Number of runs for timing.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,
}

/// Threshold method selection.
#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Unweighted box mean.
    Mean,
    /// Gaussian-weighted mean.
    Gaussian,
}

/// Column reducer selection.
#[derive(Clone, Copy, ValueEnum)]
enum Reducer {
    /// Median trace row.
    Median,
    /// Trimmed mean of the trace rows.
    TrimmedMean,
}

const fn method_from_pipeline(m: ThresholdMethod) -> Method {
    match m {
        ThresholdMethod::Mean => Method::Mean,
        ThresholdMethod::Gaussian => Method::Gaussian,
    }
}

const fn reducer_from_pipeline(r: ColumnReducerKind) -> Reducer {
    match r {
        ColumnReducerKind::Median => Reducer::Median,
        ColumnReducerKind::TrimmedMean => Reducer::TrimmedMean,
    }
}

/// CLI defaults derived from [`AnalysisConfig`] so the two cannot
/// silently diverge.
const CLI_DEFAULT_METHOD: Method = method_from_pipeline(AnalysisConfig::DEFAULT_THRESHOLD_METHOD);
const CLI_DEFAULT_REDUCER: Reducer = reducer_from_pipeline(AnalysisConfig::DEFAULT_COLUMN_REDUCER);

/// Build an [`AnalysisConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual calibration flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<AnalysisConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("parsing --config-json: {e}"));
    }

    Ok(AnalysisConfig {
        threshold_method: match cli.threshold_method {
            Method::Mean => ThresholdMethod::Mean,
            Method::Gaussian => ThresholdMethod::Gaussian,
        },
        block_size: cli.block_size,
        threshold_bias: cli.threshold_bias,
        column_reducer: match cli.column_reducer {
            Reducer::Median => ColumnReducerKind::Median,
            Reducer::TrimmedMean => ColumnReducerKind::TrimmedMean,
        },
        trim_fraction: cli.trim_fraction,
        window_seconds: cli.window_seconds,
        peak_height: cli.peak_height,
        peak_spacing_divisor: cli.peak_spacing_divisor,
        normalize_epsilon: cli.normalize_epsilon,
        bradycardia_below: cli.bradycardia_below,
        tachycardia_above: cli.tachycardia_above,
        weak_signal_range: cli.weak_signal_range,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_result(result: &AnalysisResult, as_json: bool) -> Result<(), serde_json::Error> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("Heart rate:   {:.1} bpm", result.heart_rate);
        println!("Rhythm:       {}", result.abnormality);
        println!("Stress level: {}", result.stress_level);
        println!("Confidence:   {:.1}%", result.confidence_score);
        println!("Advice:       {}", result.medical_advice);
    }
    Ok(())
}

/// Destination for human-readable reports. With `--json`, stdout carries
/// only the result record.
fn report_writer<'a>(
    stdout: &'a mut dyn Write,
    stderr: &'a mut dyn Write,
    as_json: bool,
) -> &'a mut dyn Write {
    if as_json { stderr } else { stdout }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    info!(
        path = %cli.image_path.display(),
        bytes = image_bytes.len(),
        runs = cli.runs,
        "analyzing strip"
    );
    debug!(?config, "analysis config");

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            debug!(run = run + 1, of = cli.runs, "starting run");
        }

        match ecgstrip_pipeline::diagnostics::process_staged_with_diagnostics(
            &image_bytes,
            &config,
            &StdClock,
        ) {
            Ok((staged, diagnostics)) => {
                if run == 0 {
                    if staged.peaks.len() < 2 {
                        warn!(
                            peaks = staged.peaks.len(),
                            "no rhythm detected; check the image quality"
                        );
                    }
                    if let Err(e) = print_result(&staged.result, cli.json) {
                        error!("serializing result: {e}");
                        return ExitCode::FAILURE;
                    }
                }
                if cli.diagnostics
                    && let Err(e) = writeln!(
                        report_writer(&mut io::stdout(), &mut io::stderr(), cli.json),
                        "{}",
                        diagnostics.report()
                    )
                {
                    error!("writing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                error!("analysis failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1
        && let Err(e) = write_multi_run_summary(
            report_writer(&mut io::stdout(), &mut io::stderr(), cli.json),
            &all_diagnostics,
        )
    {
        error!("writing summary: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Write aggregated timing across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn write_multi_run_summary(
    out: &mut dyn Write,
    all_diagnostics: &[PipelineDiagnostics],
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    )?;

    if all_diagnostics.is_empty() {
        writeln!(out, "Warning: no diagnostics to summarize")?;
        return Ok(());
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    writeln!(
        out,
        "Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms"
    )?;

    writeln!(out)?;
    writeln!(out, "{:<24} {:>12}", "Stage", "Mean (ms)")?;
    writeln!(out, "{}", "-".repeat(40))?;

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| d.decode.duration),
        ("Binarize", |d| d.binarize.duration),
        ("Extract", |d| d.extract.duration),
        ("Detect Peaks", |d| d.detect_peaks.duration),
        ("Estimate", |d| d.estimate.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        writeln!(out, "{name:<24} {stage_mean:>10.3}ms")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_pipeline_defaults() {
        let cli = Cli::parse_from(["ecgstrip", "strip.png"]);
        assert_eq!(config_from_cli(&cli).unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "ecgstrip",
            "strip.png",
            "--threshold-method",
            "mean",
            "--block-size",
            "15",
            "--column-reducer",
            "trimmed-mean",
            "--peak-height",
            "0.6",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.threshold_method, ThresholdMethod::Mean);
        assert_eq!(config.block_size, 15);
        assert_eq!(config.column_reducer, ColumnReducerKind::TrimmedMean);
        assert!((config.peak_height - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "ecgstrip",
            "strip.png",
            "--block-size",
            "15",
            "--config-json",
            r#"{"block_size": 21}"#,
        ]);
        assert_eq!(config_from_cli(&cli).unwrap().block_size, 21);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = Cli::parse_from(["ecgstrip", "strip.png", "--config-json", "{"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn normalize_epsilon_flag_is_applied() {
        let cli = Cli::parse_from(["ecgstrip", "strip.png", "--normalize-epsilon", "0.001"]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.normalize_epsilon - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn json_mode_keeps_reports_off_stdout() {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        write_multi_run_summary(report_writer(&mut stdout, &mut stderr, true), &[]).unwrap();
        assert!(stdout.is_empty());
        assert!(String::from_utf8(stderr).unwrap().contains("Summary (0 runs)"));
    }

    #[test]
    fn plain_mode_reports_on_stdout() {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        write_multi_run_summary(report_writer(&mut stdout, &mut stderr, false), &[]).unwrap();
        assert!(stderr.is_empty());
        assert!(String::from_utf8(stdout).unwrap().contains("no diagnostics"));
    }

    #[test]
    fn zero_runs_is_rejected() {
        assert!(Cli::try_parse_from(["ecgstrip", "strip.png", "--runs", "0"]).is_err());
    }
}
