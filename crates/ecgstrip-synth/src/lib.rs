//! ecgstrip-synth: synthetic ECG strip images.
//!
//! Renders a strip of evenly spaced heartbeats on optional ECG paper
//! grid. Each beat is the sum of three Gaussian bumps (P wave, QRS
//! complex, T wave) subtracted from a flat baseline, so upward
//! deflections on paper are upward on screen. Noise is Gaussian but
//! derived from a keyed hash of the column index, so a given config
//! always renders the same pixels.

use std::hash::Hasher;

use image::{Rgb, RgbImage};
use siphasher::sip::SipHasher13;

/// White paper.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
/// Light red minor grid line.
const MINOR_GRID: Rgb<u8> = Rgb([255, 220, 220]);
/// Darker red major grid line.
const MAJOR_GRID: Rgb<u8> = Rgb([255, 180, 180]);
/// Trace ink.
const TRACE: Rgb<u8> = Rgb([0, 0, 0]);

const MINOR_GRID_STEP: u32 = 10;
const MAJOR_GRID_STEP: u32 = 50;
const MAJOR_GRID_THICKNESS: u32 = 2;

/// One Gaussian component of a heartbeat, relative to the R peak.
struct Wave {
    offset: f64,
    amplitude: f64,
    /// Denominator of the exponent, `2 * sigma^2`.
    width: f64,
}

const P_WAVE: Wave = Wave {
    offset: -40.0,
    amplitude: 15.0,
    width: 50.0,
};
const QRS_COMPLEX: Wave = Wave {
    offset: 0.0,
    amplitude: 100.0,
    width: 10.0,
};
const T_WAVE: Wave = Wave {
    offset: 60.0,
    amplitude: 25.0,
    width: 100.0,
};

impl Wave {
    fn at(&self, x: f64, peak: f64) -> f64 {
        let d = x - (peak + self.offset);
        self.amplitude * (-(d * d) / self.width).exp()
    }
}

/// Errors from rendering or encoding a synthetic strip.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// The configuration describes an image that cannot be drawn.
    #[error("invalid synth configuration: {0}")]
    InvalidConfig(String),

    /// PNG encoding failed.
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Parameters for one synthetic strip.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Column of the first R peak.
    pub first_peak: u32,
    /// Columns between consecutive R peaks.
    pub spacing: u32,
    /// No peak is placed beyond `width - end_margin`.
    pub end_margin: u32,
    /// Draw ECG paper grid lines.
    pub grid: bool,
    /// Standard deviation of the vertical noise, in pixels. `0` disables it.
    pub noise_std: f64,
    /// Noise seed.
    pub seed: u64,
    /// Trace thickness in pixels.
    pub line_thickness: u32,
}

impl SynthConfig {
    /// Default image width.
    pub const DEFAULT_WIDTH: u32 = 800;
    /// Default image height.
    pub const DEFAULT_HEIGHT: u32 = 400;
    /// Default first peak column.
    pub const DEFAULT_FIRST_PEAK: u32 = 100;
    /// Default beat spacing (64 bpm at 800 px per 5 s).
    pub const DEFAULT_SPACING: u32 = 150;
    /// Default right margin.
    pub const DEFAULT_END_MARGIN: u32 = 100;
    /// Default noise standard deviation.
    pub const DEFAULT_NOISE_STD: f64 = 2.0;
    /// Default trace thickness.
    pub const DEFAULT_LINE_THICKNESS: u32 = 2;

    /// A clean strip: no grid, no noise.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            grid: false,
            noise_std: 0.0,
            ..Self::default()
        }
    }

    /// Check that the strip can be drawn.
    ///
    /// # Errors
    ///
    /// Returns [`SynthError::InvalidConfig`] for zero dimensions, zero
    /// spacing or thickness, or negative or non-finite noise.
    pub fn validate(&self) -> Result<(), SynthError> {
        if self.width == 0 || self.height == 0 {
            return Err(SynthError::InvalidConfig(format!(
                "dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.spacing == 0 {
            return Err(SynthError::InvalidConfig(
                "spacing must be non-zero".to_owned(),
            ));
        }
        if self.line_thickness == 0 {
            return Err(SynthError::InvalidConfig(
                "line_thickness must be non-zero".to_owned(),
            ));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(SynthError::InvalidConfig(format!(
                "noise_std must be >= 0, got {}",
                self.noise_std
            )));
        }
        Ok(())
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            first_peak: Self::DEFAULT_FIRST_PEAK,
            spacing: Self::DEFAULT_SPACING,
            end_margin: Self::DEFAULT_END_MARGIN,
            grid: true,
            noise_std: Self::DEFAULT_NOISE_STD,
            seed: 0,
            line_thickness: Self::DEFAULT_LINE_THICKNESS,
        }
    }
}

/// R peak columns: `first_peak`, `first_peak + spacing`, ... up to and
/// including `width - end_margin`.
#[must_use]
pub fn peak_positions(config: &SynthConfig) -> Vec<u32> {
    let last = config.width.saturating_sub(config.end_margin);
    if config.spacing == 0 || config.first_peak > last {
        return Vec::new();
    }
    (config.first_peak..=last)
        .step_by(config.spacing as usize)
        .collect()
}

/// Standard normal sample for `index`, reproducible per `seed`.
#[allow(clippy::cast_precision_loss)]
fn gaussian_noise(seed: u64, index: u64) -> f64 {
    let uniform = |stream: u64| {
        let mut hasher = SipHasher13::new_with_keys(seed, stream);
        hasher.write_u64(index);
        // 53 random bits, shifted off zero.
        ((hasher.finish() >> 11) as f64 + 0.5) / (1u64 << 53) as f64
    };
    let (u1, u2) = (uniform(0), uniform(1));
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Vertical trace position for every column.
#[must_use]
pub fn trace_rows(config: &SynthConfig) -> Vec<f64> {
    let peaks: Vec<f64> = peak_positions(config)
        .into_iter()
        .map(f64::from)
        .collect();
    let baseline = f64::from(config.height / 2);

    (0..config.width)
        .map(|x| {
            let xf = f64::from(x);
            let beats: f64 = peaks
                .iter()
                .map(|&p| P_WAVE.at(xf, p) + QRS_COMPLEX.at(xf, p) + T_WAVE.at(xf, p))
                .sum();
            let noise = if config.noise_std > 0.0 {
                config.noise_std * gaussian_noise(config.seed, u64::from(x))
            } else {
                0.0
            };
            baseline - beats + noise
        })
        .collect()
}

fn draw_grid(img: &mut RgbImage) {
    for (x, y, px) in img.enumerate_pixels_mut() {
        if x % MINOR_GRID_STEP == 0 || y % MINOR_GRID_STEP == 0 {
            *px = MINOR_GRID;
        }
        if x % MAJOR_GRID_STEP < MAJOR_GRID_THICKNESS || y % MAJOR_GRID_STEP < MAJOR_GRID_THICKNESS
        {
            *px = MAJOR_GRID;
        }
    }
}

/// Render the strip.
///
/// # Errors
///
/// Returns [`SynthError::InvalidConfig`] if `config` fails
/// [`SynthConfig::validate`].
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn render(config: &SynthConfig) -> Result<RgbImage, SynthError> {
    config.validate()?;

    let mut img = RgbImage::from_pixel(config.width, config.height, BACKGROUND);
    if config.grid {
        draw_grid(&mut img);
    }

    let rows: Vec<f32> = trace_rows(config)
        .into_iter()
        .map(|y| y.round() as f32)
        .collect();

    // A thickness of n draws n copies shifted down one row each.
    for offset in 0..config.line_thickness {
        let dy = offset as f32;
        for (x, pair) in rows.windows(2).enumerate() {
            let x0 = x as f32;
            imageproc::drawing::draw_line_segment_mut(
                &mut img,
                (x0, pair[0] + dy),
                (x0 + 1.0, pair[1] + dy),
                TRACE,
            );
        }
    }

    Ok(img)
}

/// Encode an image as PNG bytes.
///
/// # Errors
///
/// Returns [`SynthError::Encode`] if the encoder rejects the image.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, SynthError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}
