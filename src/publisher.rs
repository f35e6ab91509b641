//! Published analysis records and their consumers
//!
//! The publisher holds the current record behind an `Arc`; a publish swaps
//! the whole `Arc`, so readers see either the previous record or the new one.
//!
//! Serialized form (field order fixed):
//! ```text
//! {"fs":1000.0,"n":512,"bin_hz":1.953125,"rms":0.0123,"peak_hz":50.78,"bands":[...]}
//! ```

use crate::error::Result;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Version of the serialized record layout
pub const SCHEMA_VERSION: u32 = 1;

/// Optional per-record diagnostics, serialized after `bands`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub fft_bands: usize,
    pub window_shift: usize,
    pub max_analysis_hz: f64,
    /// Monotonic cycle counter
    pub seq: u64,
    /// Milliseconds since pipeline start, at the window centre
    pub ts_ms: u64,
    pub win_ms: f64,
    pub hop_ms: f64,
    /// Wall-clock time of the window centre, present only with a clock attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_ms: Option<i64>,
    pub schema_version: u32,
    /// Band edges and centres in Hz, one entry per band
    pub band_center: Vec<f64>,
    pub band_low: Vec<f64>,
    pub band_high: Vec<f64>,
}

/// One completed analysis cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub fs: f64,
    pub n: usize,
    pub bin_hz: f64,
    pub rms: f64,
    pub peak_hz: f64,
    pub bands: Vec<f64>,
    #[serde(flatten)]
    pub diagnostics: Option<Diagnostics>,
}

#[derive(Serialize)]
struct CoreRecord<'a> {
    fs: f64,
    n: usize,
    bin_hz: f64,
    rms: f64,
    peak_hz: f64,
    bands: &'a [f64],
}

impl AnalysisResult {
    /// Compact record with the six contract fields only
    pub fn to_json(&self) -> Result<String> {
        let core = CoreRecord {
            fs: self.fs,
            n: self.n,
            bin_hz: self.bin_hz,
            rms: self.rms,
            peak_hz: self.peak_hz,
            bands: &self.bands,
        };
        Ok(serde_json::to_string(&core)?)
    }

    /// Record including diagnostics fields, when present
    pub fn to_json_with_diagnostics(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Value of one scalar field, `None` for fields not carried by the record
    pub fn field(&self, field: NumericField) -> Option<f64> {
        let diag = self.diagnostics.as_ref();
        match field {
            NumericField::Rms => Some(self.rms),
            NumericField::PeakHz => Some(self.peak_hz),
            NumericField::BinHz => Some(self.bin_hz),
            NumericField::Fs => Some(self.fs),
            NumericField::N => Some(self.n as f64),
            NumericField::FftBands => Some(self.bands.len() as f64),
            NumericField::WindowShift => diag.map(|d| d.window_shift as f64),
            NumericField::MaxAnalysisHz => diag.map(|d| d.max_analysis_hz),
            NumericField::CpuLoad => None,
        }
    }
}

/// Scalar values exposed to independent numeric observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    Rms,
    PeakHz,
    BinHz,
    Fs,
    N,
    FftBands,
    WindowShift,
    MaxAnalysisHz,
    /// Published once per load accounting window, not per record
    CpuLoad,
}

type Observer = Box<dyn FnMut(f64) + Send>;

/// Cheap, cloneable read handle on the current record
#[derive(Clone)]
pub struct ResultReader {
    current: Arc<RwLock<Option<Arc<AnalysisResult>>>>,
}

impl ResultReader {
    /// Most recently published record
    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sole writer of the current record
pub struct ResultPublisher {
    current: Arc<RwLock<Option<Arc<AnalysisResult>>>>,
    observers: Vec<(NumericField, Observer)>,
    published: u64,
}

impl ResultPublisher {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            observers: Vec::new(),
            published: 0,
        }
    }

    pub fn reader(&self) -> ResultReader {
        ResultReader {
            current: Arc::clone(&self.current),
        }
    }

    /// Register a callback for one scalar field
    pub fn observe<F>(&mut self, field: NumericField, callback: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.observers.push((field, Box::new(callback)));
    }

    /// Number of records published so far
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Replace the current record and notify observers
    pub fn publish(&mut self, result: AnalysisResult) -> Arc<AnalysisResult> {
        let result = Arc::new(result);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&result));
        self.published += 1;

        for (field, observer) in self.observers.iter_mut() {
            if let Some(value) = result.field(*field) {
                observer(value);
            }
        }

        result
    }

    /// Forward a CPU load sample to `CpuLoad` observers
    pub fn publish_load(&mut self, percent: f32) {
        for (field, observer) in self.observers.iter_mut() {
            if *field == NumericField::CpuLoad {
                observer(percent as f64);
            }
        }
    }
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new()
    }
}
