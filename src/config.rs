//! Analyzer configuration: defaults, TOML loading, CLI overrides, validation
//!
//! Configuration is fixed once the pipeline starts. Anything invalid is
//! rejected up front with [`AnalyzerError::InvalidConfig`].
//!
//! ```toml
//! sample_frequency = 1000.0
//! fft_samples = 512
//! fft_bands = 16
//! window_shift = 256
//! dc_alpha = 0.01
//! max_analysis_hz = 300.0
//! load_window_us = 1000000
//! window = "hamming"
//! ```

use crate::error::{AnalyzerError, Result};
use crate::spectrum::WindowFunction;
use clap::Args;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// Supported transform lengths
pub const FFT_SIZES: [usize; 5] = [128, 256, 512, 1024, 2048];

/// Largest accepted `window_shift`
pub const MAX_WINDOW_SHIFT: usize = 4096;

/// Largest accepted `fft_bands`
pub const MAX_FFT_BANDS: usize = 64;

/// Accepted `sample_frequency` in Hz
pub const SAMPLE_FREQUENCY_RANGE: RangeInclusive<f64> = 10.0..=5000.0;

/// Accepted `max_analysis_hz`
pub const ANALYSIS_RATE_RANGE: RangeInclusive<f64> = 0.01..=10_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Nominal sample rate in Hz
    pub sample_frequency: f64,
    /// Window / transform length
    pub fft_samples: usize,
    /// Number of published energy bands
    pub fft_bands: usize,
    /// Hop between windows in samples; 0 means no overlap
    pub window_shift: usize,
    /// DC filter coefficient in (0, 1]
    pub dc_alpha: f32,
    /// Ceiling on analysis cycle starts per second
    pub max_analysis_hz: f64,
    /// CPU load accounting window in microseconds
    pub load_window_us: u64,
    /// Tapering window applied before the FFT
    pub window: WindowFunction,
    /// Withhold cycles while load is at or above this percentage
    pub max_load_percent: Option<f32>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_frequency: 1000.0,
            fft_samples: 512,
            fft_bands: 16,
            window_shift: 0,
            dc_alpha: 0.01,
            max_analysis_hz: 300.0,
            load_window_us: 1_000_000,
            window: WindowFunction::Hamming,
            max_load_percent: None,
        }
    }
}

impl AnalyzerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalyzerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Samples the window advances per cycle
    pub fn effective_hop(&self) -> usize {
        if self.window_shift == 0 {
            self.fft_samples
        } else {
            self.window_shift
        }
    }

    /// Frequency resolution of one spectrum bin
    pub fn bin_hz(&self) -> f64 {
        self.sample_frequency / self.fft_samples as f64
    }

    /// Duration covered by one window in milliseconds
    pub fn window_ms(&self) -> f64 {
        self.fft_samples as f64 * 1000.0 / self.sample_frequency
    }

    /// Duration of one hop in milliseconds
    pub fn hop_ms(&self) -> f64 {
        self.effective_hop() as f64 * 1000.0 / self.sample_frequency
    }

    /// Check every field, returning the first violation
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AnalyzerError::InvalidConfig(msg));

        if !SAMPLE_FREQUENCY_RANGE.contains(&self.sample_frequency) {
            return invalid(format!(
                "sample_frequency must be within {:?} Hz, got {}",
                SAMPLE_FREQUENCY_RANGE, self.sample_frequency
            ));
        }
        if !FFT_SIZES.contains(&self.fft_samples) {
            return invalid(format!(
                "fft_samples must be one of {:?}, got {}",
                FFT_SIZES, self.fft_samples
            ));
        }
        if self.fft_bands == 0 || self.fft_bands > MAX_FFT_BANDS {
            return invalid(format!(
                "fft_bands must be between 1 and {}, got {}",
                MAX_FFT_BANDS, self.fft_bands
            ));
        }
        if self.window_shift > MAX_WINDOW_SHIFT {
            return invalid(format!(
                "window_shift must be at most {}, got {}",
                MAX_WINDOW_SHIFT, self.window_shift
            ));
        }
        if self.window_shift > self.fft_samples {
            return invalid(format!(
                "window_shift {} exceeds fft_samples {}",
                self.window_shift, self.fft_samples
            ));
        }
        if !(self.dc_alpha > 0.0 && self.dc_alpha <= 1.0) {
            return invalid(format!("dc_alpha must be in (0, 1], got {}", self.dc_alpha));
        }
        if !ANALYSIS_RATE_RANGE.contains(&self.max_analysis_hz) {
            return invalid(format!(
                "max_analysis_hz must be within {:?} Hz, got {}",
                ANALYSIS_RATE_RANGE, self.max_analysis_hz
            ));
        }
        if self.load_window_us == 0 {
            return invalid("load_window_us must be positive".to_string());
        }
        if let Some(ceiling) = self.max_load_percent {
            if !(ceiling > 0.0 && ceiling <= 100.0) {
                return invalid(format!("max_load_percent must be in (0, 100], got {}", ceiling));
            }
        }
        Ok(())
    }
}

/// Command-line overrides shared by the binaries
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// Sample rate in Hz
    #[arg(long)]
    pub sample_frequency: Option<f64>,

    /// FFT length (128, 256, 512, 1024 or 2048)
    #[arg(long)]
    pub fft_samples: Option<usize>,

    /// Number of energy bands (1-64)
    #[arg(long)]
    pub fft_bands: Option<usize>,

    /// Hop between windows in samples (0 = no overlap)
    #[arg(long)]
    pub window_shift: Option<usize>,

    /// DC removal filter coefficient
    #[arg(long)]
    pub dc_alpha: Option<f32>,

    /// Maximum analysis cycles per second
    #[arg(long)]
    pub max_analysis_hz: Option<f64>,

    /// CPU load accounting window in microseconds
    #[arg(long)]
    pub load_window_us: Option<u64>,

    /// Window function: hamming, hann or rectangular
    #[arg(long, value_parser = parse_window_function)]
    pub window: Option<WindowFunction>,

    /// Withhold analysis while CPU load is at or above this percentage
    #[arg(long)]
    pub max_load_percent: Option<f32>,
}

fn parse_window_function(value: &str) -> std::result::Result<WindowFunction, String> {
    match value.to_ascii_lowercase().as_str() {
        "hamming" => Ok(WindowFunction::Hamming),
        "hann" | "hanning" => Ok(WindowFunction::Hann),
        "rectangular" | "rect" | "none" => Ok(WindowFunction::Rectangular),
        other => Err(format!("unknown window function '{}'", other)),
    }
}

impl ConfigArgs {
    /// Load the file (if any), apply flag overrides, validate the result
    pub fn resolve(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => AnalyzerConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields for every flag that was given
    pub fn apply(&self, config: &mut AnalyzerConfig) {
        if let Some(v) = self.sample_frequency {
            config.sample_frequency = v;
        }
        if let Some(v) = self.fft_samples {
            config.fft_samples = v;
        }
        if let Some(v) = self.fft_bands {
            config.fft_bands = v;
        }
        if let Some(v) = self.window_shift {
            config.window_shift = v;
        }
        if let Some(v) = self.dc_alpha {
            config.dc_alpha = v;
        }
        if let Some(v) = self.max_analysis_hz {
            config.max_analysis_hz = v;
        }
        if let Some(v) = self.load_window_us {
            config.load_window_us = v;
        }
        if let Some(v) = self.window {
            config.window = v;
        }
        if let Some(v) = self.max_load_percent {
            config.max_load_percent = Some(v);
        }
    }
}
