//! Real-time vibration spectrum analysis for MPU6050 accelerometers
//!
//! This library turns a stream of scalar acceleration samples into periodic
//! spectral summaries: RMS level, dominant frequency and per-band energy.
//! Samples are debiased by a single-pole DC filter, collected into a sliding
//! window, transformed with rustfft and reduced to a fixed number of bands.
//! A load governor caps how often the analysis runs and reports CPU load.
//!
//! # Quick Start
//!
//! ## Live Monitoring
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # {
//! use mpu_fft_analyzer::{
//!     AnalyzerConfig, Axis, LinuxI2c, Mpu6050, Mpu6050Source, Pipeline, StreamControl,
//!     MPU6050_ADDRESS,
//! };
//!
//! let sensor = Mpu6050::new(LinuxI2c::open(1)?, MPU6050_ADDRESS)?;
//! let mut source = Mpu6050Source::new(sensor, Axis::Magnitude);
//! let mut pipeline = Pipeline::new(AnalyzerConfig::default())?;
//!
//! // Sample at 1 kHz, print each record as JSON
//! pipeline.run(&mut source, |outcome| {
//!     if let Some(result) = outcome.result() {
//!         println!("{}", result.to_json().unwrap_or_default());
//!     }
//!     StreamControl::Continue
//! })?;
//! # }
//! # Ok::<(), mpu_fft_analyzer::AnalyzerError>(())
//! ```
//!
//! ## Feeding Samples Directly
//! ```
//! use mpu_fft_analyzer::{AnalyzerConfig, Pipeline};
//! use std::time::{Duration, Instant};
//!
//! let config = AnalyzerConfig {
//!     fft_samples: 256,
//!     ..AnalyzerConfig::default()
//! };
//! let mut pipeline = Pipeline::new(config)?;
//! let start = Instant::now();
//!
//! for i in 0..256u64 {
//!     let t = i as f32 / 1000.0;
//!     let sample = 1.0 + 0.2 * (2.0 * std::f32::consts::PI * 60.0 * t).sin();
//!     if let Some(result) = pipeline.push_sample(sample, start + Duration::from_millis(i)) {
//!         println!("peak {:.1} Hz, rms {:.3} g", result.peak_hz, result.rms);
//!     }
//! }
//! # Ok::<(), mpu_fft_analyzer::AnalyzerError>(())
//! ```
//!
//! ## Watching Individual Values
//! ```
//! use mpu_fft_analyzer::{AnalyzerConfig, NumericField, Pipeline};
//!
//! let mut pipeline = Pipeline::new(AnalyzerConfig::default())?;
//! pipeline.publisher_mut().observe(NumericField::CpuLoad, |load| {
//!     println!("analysis load {:.1}%", load);
//! });
//! # Ok::<(), mpu_fft_analyzer::AnalyzerError>(())
//! ```

pub mod bands;
pub mod common;
pub mod config;
pub mod dc_filter;
pub mod error;
pub mod governor;
pub mod i2c;
pub mod mpu6050;
pub mod pipeline;
pub mod publisher;
pub mod source;
pub mod spectrum;
pub mod window;

// Re-export public API
pub use bands::{BandEdges, BandLayout, BandVector};
pub use common::{create_level_bar, SystemClock, TimeKeeper, WallClock};
pub use config::{AnalyzerConfig, ConfigArgs};
pub use dc_filter::DcFilter;
pub use error::{AnalyzerError, Result};
pub use governor::{GovernorState, LoadGovernor};
#[cfg(target_os = "linux")]
pub use i2c::LinuxI2c;
pub use i2c::I2cBus;
pub use mpu6050::{AccelSample, Mpu6050, MPU6050_ADDRESS};
pub use pipeline::{Pipeline, StreamControl, TickOutcome};
pub use publisher::{AnalysisResult, Diagnostics, NumericField, ResultPublisher, ResultReader};
pub use source::{Axis, Mpu6050Source, ReplaySource, SampleSource, ToneSource};
pub use spectrum::{FftAnalyzer, SpectralAnalyzer, Spectrum, WindowFunction};
pub use window::{Window, WindowBuffer};
