//! Scalar sample sources feeding the pipeline

use crate::error::{AnalyzerError, Result};
use crate::i2c::I2cBus;
use crate::mpu6050::Mpu6050;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// Produces one scalar acceleration reading per call
pub trait SampleSource {
    /// Read the next sample
    ///
    /// # Returns
    /// * `Ok(Some(value))` - A new reading
    /// * `Ok(None)` - The source is exhausted
    /// * `Err(_)` - The reading failed; the caller skips this tick
    fn read_sample(&mut self) -> Result<Option<f32>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_sample(&mut self) -> Result<Option<f32>> {
        (**self).read_sample()
    }
}

/// Which accelerometer signal becomes the scalar series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Magnitude,
    X,
    Y,
    Z,
}

/// MPU6050 accelerometer as a sample source, values in g
pub struct Mpu6050Source<B: I2cBus> {
    sensor: Mpu6050<B>,
    axis: Axis,
}

impl<B: I2cBus> Mpu6050Source<B> {
    pub fn new(sensor: Mpu6050<B>, axis: Axis) -> Self {
        Self { sensor, axis }
    }
}

impl<B: I2cBus> SampleSource for Mpu6050Source<B> {
    fn read_sample(&mut self) -> Result<Option<f32>> {
        let sample = self.sensor.read_accel()?;
        let (x, y, z) = sample.to_g();
        let value = match self.axis {
            Axis::Magnitude => sample.magnitude_g(),
            Axis::X => x,
            Axis::Y => y,
            Axis::Z => z,
        };
        Ok(Some(value))
    }
}

/// Synthetic sum of sinusoids on a constant offset
#[derive(Debug, Clone)]
pub struct ToneSource {
    sample_frequency: f64,
    offset: f64,
    components: Vec<(f64, f64)>,
    index: u64,
    limit: Option<u64>,
}

impl ToneSource {
    /// Single tone of `amplitude` at `frequency` Hz
    pub fn new(sample_frequency: f64, frequency: f64, amplitude: f64) -> Self {
        Self {
            sample_frequency,
            offset: 0.0,
            components: vec![(frequency, amplitude)],
            index: 0,
            limit: None,
        }
    }

    /// Add another `(frequency, amplitude)` component
    pub fn with_component(mut self, frequency: f64, amplitude: f64) -> Self {
        self.components.push((frequency, amplitude));
        self
    }

    /// Constant offset, e.g. 1.0 for gravity on the measured axis
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Stop after `count` samples
    pub fn with_limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }
}

impl SampleSource for ToneSource {
    fn read_sample(&mut self) -> Result<Option<f32>> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return Ok(None);
        }
        let t = self.index as f64 / self.sample_frequency;
        self.index += 1;
        let value = self.offset
            + self
                .components
                .iter()
                .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                .sum::<f64>();
        Ok(Some(value as f32))
    }
}

/// Pre-recorded samples played back in order
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<f32>,
    position: usize,
}

impl ReplaySource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples, position: 0 }
    }

    /// Load a recording: one value per line, or CSV whose last column is the value
    ///
    /// Blank lines and `#` comments are ignored, as is a non-numeric first line
    /// (column header).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map(Self::new)
    }

    fn parse(text: &str) -> Result<Vec<f32>> {
        let mut samples = Vec::new();
        let mut first = true;

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let field = line.rsplit(',').next().unwrap_or(line).trim();
            match field.parse::<f32>() {
                Ok(value) => samples.push(value),
                Err(_) if first => {}
                Err(_) => {
                    return Err(AnalyzerError::InvalidParameter(format!(
                        "line {}: '{}' is not a number",
                        line_no + 1,
                        field
                    )))
                }
            }
            first = false;
        }
        Ok(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn read_sample(&mut self) -> Result<Option<f32>> {
        let value = self.samples.get(self.position).copied();
        if value.is_some() {
            self.position += 1;
        }
        Ok(value)
    }
}
