//! Windowed FFT magnitude spectrum

use crate::window::Window;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Tapering window applied before the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    #[default]
    Hamming,
    Hann,
    Rectangular,
}

impl WindowFunction {
    /// Coefficient for sample `i` of an `n`-sample window
    pub fn coefficient(self, i: usize, n: usize) -> f64 {
        if n < 2 {
            return 1.0;
        }
        let phase = 2.0 * PI * i as f64 / (n as f64 - 1.0);
        match self {
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Rectangular => 1.0,
        }
    }

    /// Precompute all coefficients for an `n`-sample window
    pub fn coefficients(self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// Single-sided magnitude spectrum up to (excluding) the Nyquist bin
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// One amplitude per bin, `fft_samples / 2` entries
    pub magnitudes: Vec<f64>,
    /// Bin width in Hz (`sample_frequency / fft_samples`)
    pub bin_hz: f64,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Centre frequency of bin `k`
    pub fn frequency_of(&self, k: usize) -> f64 {
        k as f64 * self.bin_hz
    }
}

/// Transforms one analysis window into a magnitude spectrum
///
/// Implementations must derive the result from the window alone; `&mut self`
/// only grants access to reusable scratch storage.
pub trait SpectralAnalyzer: Send {
    /// Window length this analyzer was built for
    fn size(&self) -> usize;

    fn analyze(&mut self, window: &Window) -> Spectrum;
}

/// rustfft-backed analyzer with precomputed window and scratch buffers
pub struct FftAnalyzer {
    size: usize,
    bin_hz: f64,
    fft: Arc<dyn Fft<f64>>,
    coefficients: Vec<f64>,
    coherent_sum: f64,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl FftAnalyzer {
    /// Plan a forward transform of `size` points
    pub fn new(size: usize, window: WindowFunction, sample_frequency: f64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let coefficients = window.coefficients(size);
        let coherent_sum = coefficients.iter().sum::<f64>();
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            size,
            bin_hz: sample_frequency / size as f64,
            fft,
            coefficients,
            coherent_sum,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch,
        }
    }

    pub fn bin_hz(&self) -> f64 {
        self.bin_hz
    }
}

impl SpectralAnalyzer for FftAnalyzer {
    fn size(&self) -> usize {
        self.size
    }

    fn analyze(&mut self, window: &Window) -> Spectrum {
        debug_assert_eq!(window.len(), self.size, "window length does not match FFT size");

        for ((slot, &x), &w) in self
            .buffer
            .iter_mut()
            .zip(window.as_slice())
            .zip(&self.coefficients)
        {
            *slot = Complex::new(x as f64 * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Amplitude scaling: undo the window's coherent gain, fold negative frequencies
        let scale = if self.coherent_sum > 0.0 {
            1.0 / self.coherent_sum
        } else {
            0.0
        };
        let magnitudes = self
            .buffer
            .iter()
            .take(self.size / 2)
            .enumerate()
            .map(|(k, c)| {
                let fold = if k == 0 { 1.0 } else { 2.0 };
                c.norm() * scale * fold
            })
            .collect();

        Spectrum {
            magnitudes,
            bin_hz: self.bin_hz,
        }
    }
}
