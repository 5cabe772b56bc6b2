//! ecgstrip-synth: write a synthetic ECG strip to a PNG file.
//!
//! # Usage
//!
//! ```text
//! cargo run --bin ecgstrip-synth -- --output strip.png [OPTIONS]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ecgstrip_synth::SynthConfig;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Render a synthetic ECG strip.
#[derive(Parser)]
#[command(name = "ecgstrip-synth", version)]
struct Cli {
    /// Where to write the PNG.
    #[arg(long, short)]
    output: PathBuf,

    /// Image width in pixels.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_WIDTH)]
    width: u32,

    /// Image height in pixels.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_HEIGHT)]
    height: u32,

    /// Column of the first R peak.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_FIRST_PEAK)]
    first_peak: u32,

    /// Columns between R peaks.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_SPACING)]
    spacing: u32,

    /// No peak beyond `width - end_margin`.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_END_MARGIN)]
    end_margin: u32,

    /// Omit the ECG paper grid.
    #[arg(long)]
    no_grid: bool,

    /// Vertical noise standard deviation in pixels.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_NOISE_STD)]
    noise_std: f64,

    /// Noise seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Trace thickness in pixels.
    #[arg(long, default_value_t = SynthConfig::DEFAULT_LINE_THICKNESS)]
    line_thickness: u32,
}

impl From<&Cli> for SynthConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            width: cli.width,
            height: cli.height,
            first_peak: cli.first_peak,
            spacing: cli.spacing,
            end_margin: cli.end_margin,
            grid: !cli.no_grid,
            noise_std: cli.noise_std,
            seed: cli.seed,
            line_thickness: cli.line_thickness,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let config = SynthConfig::from(&cli);

    let peaks = ecgstrip_synth::peak_positions(&config);
    info!(
        width = config.width,
        height = config.height,
        beats = peaks.len(),
        "rendering strip"
    );

    let png = match ecgstrip_synth::render(&config).and_then(|img| ecgstrip_synth::encode_png(&img))
    {
        Ok(png) => png,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::write(&cli.output, &png) {
        error!("writing {}: {e}", cli.output.display());
        return ExitCode::FAILURE;
    }
    info!(path = %cli.output.display(), bytes = png.len(), "wrote strip");
    ExitCode::SUCCESS
}
