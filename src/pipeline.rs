//! Sample-to-record pipeline
//!
//! One [`Pipeline`] owns every stage: the DC filter, the sliding window, the
//! spectral analyzer, the band layout, the load governor and the publisher.
//! Each sampling tick feeds one debiased sample in; when a full window is
//! available and the governor admits a cycle, the window is analyzed and a
//! complete [`AnalysisResult`] replaces the published one.

use crate::bands::{self, BandEdges, BandLayout};
use crate::common::WallClock;
use crate::config::AnalyzerConfig;
use crate::dc_filter::DcFilter;
use crate::error::{AnalyzerError, Result};
use crate::governor::LoadGovernor;
use crate::publisher::{AnalysisResult, Diagnostics, ResultPublisher, ResultReader, SCHEMA_VERSION};
use crate::source::SampleSource;
use crate::spectrum::{FftAnalyzer, SpectralAnalyzer};
use crate::window::{Window, WindowBuffer};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Control flow for streaming callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Continue streaming
    Continue,
    /// Stop streaming
    Break,
}

/// What one sampling tick produced
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// A sample was consumed; carries the record if a cycle completed
    Sampled(Option<Arc<AnalysisResult>>),
    /// The read failed and the tick was skipped
    Skipped,
    /// The source has no more samples
    Exhausted,
}

impl TickOutcome {
    /// Record published by this tick, if any
    pub fn result(&self) -> Option<&Arc<AnalysisResult>> {
        match self {
            TickOutcome::Sampled(result) => result.as_ref(),
            _ => None,
        }
    }
}

pub struct Pipeline {
    config: AnalyzerConfig,
    filter: DcFilter,
    buffer: WindowBuffer,
    window: Window,
    analyzer: Box<dyn SpectralAnalyzer>,
    layout: BandLayout,
    edges: BandEdges,
    governor: LoadGovernor,
    publisher: ResultPublisher,
    clock: Option<Box<dyn WallClock>>,
    origin: Option<Instant>,
    seq: u64,
    samples: u64,
    skipped: u64,
}

impl Pipeline {
    /// Validate `config` and build every stage
    ///
    /// # Returns
    /// * `Err(AnalyzerError::InvalidConfig)` - Nothing is started
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;

        let analyzer = FftAnalyzer::new(config.fft_samples, config.window, config.sample_frequency);
        let layout = BandLayout::new(config.fft_samples, config.fft_bands);
        let edges = layout.edges_hz(config.bin_hz());

        info!(
            "Pipeline: fs={} Hz, n={}, bands={}, hop={}, bin={:.3} Hz, max_rate={} Hz, window={:?}",
            config.sample_frequency,
            config.fft_samples,
            config.fft_bands,
            config.effective_hop(),
            config.bin_hz(),
            config.max_analysis_hz,
            config.window
        );

        Ok(Self {
            filter: DcFilter::new(config.dc_alpha),
            buffer: WindowBuffer::new(config.fft_samples),
            window: Window::zeroed(config.fft_samples),
            analyzer: Box::new(analyzer),
            layout,
            edges,
            governor: LoadGovernor::new(
                config.max_analysis_hz,
                config.load_window_us,
                config.max_load_percent,
            ),
            publisher: ResultPublisher::new(),
            clock: None,
            origin: None,
            seq: 0,
            samples: 0,
            skipped: 0,
            config,
        })
    }

    /// Replace the spectral analyzer
    ///
    /// The analyzer must accept windows of exactly `fft_samples` samples.
    pub fn with_analyzer(mut self, analyzer: Box<dyn SpectralAnalyzer>) -> Result<Self> {
        if analyzer.size() != self.config.fft_samples {
            return Err(AnalyzerError::InvalidConfig(format!(
                "analyzer size {} does not match fft_samples {}",
                analyzer.size(),
                self.config.fft_samples
            )));
        }
        self.analyzer = analyzer;
        Ok(self)
    }

    /// Attach a wall clock; records then carry `epoch_ms`
    pub fn with_wall_clock(mut self, clock: Box<dyn WallClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn reader(&self) -> ResultReader {
        self.publisher.reader()
    }

    /// Publisher, for registering observers
    pub fn publisher_mut(&mut self) -> &mut ResultPublisher {
        &mut self.publisher
    }

    pub fn governor(&self) -> &LoadGovernor {
        &self.governor
    }

    /// Samples consumed so far
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Ticks skipped because the read failed
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Feed one raw sample taken at `now`
    ///
    /// Returns the published record when this sample completed a cycle.
    pub fn push_sample(&mut self, sample: f32, now: Instant) -> Option<Arc<AnalysisResult>> {
        self.origin.get_or_insert(now);

        let debiased = self.filter.update(sample);
        self.buffer.push(debiased);
        self.samples += 1;

        if let Some(load) = self.governor.poll(now) {
            debug!("CPU load {:.2}%", load);
            self.publisher.publish_load(load);
        }

        if !self.buffer.is_full() || !self.governor.may_run_now(now) {
            return None;
        }
        Some(self.run_cycle(now))
    }

    fn run_cycle(&mut self, now: Instant) -> Arc<AnalysisResult> {
        self.governor.begin_cycle(now);
        let started = Instant::now();

        self.buffer.snapshot_into(&mut self.window);
        let spectrum = self.analyzer.analyze(&self.window);
        let (bands, peak_hz) = self.layout.reduce(&spectrum);
        let rms = bands::rms(&self.window);

        let (min, max) = self.window.min_max();
        debug!(
            "seq={} rms={:.5} min={:.5} max={:.5} peak={:.2} Hz",
            self.seq, rms, min, max, peak_hz
        );

        let diagnostics = self.diagnostics(now);
        let result = self.publisher.publish(AnalysisResult {
            fs: self.config.sample_frequency,
            n: self.config.fft_samples,
            bin_hz: spectrum.bin_hz,
            rms,
            peak_hz,
            bands,
            diagnostics: Some(diagnostics),
        });
        self.seq += 1;

        let elapsed = started.elapsed();
        self.governor.record_cycle_duration(now + elapsed, elapsed);
        self.buffer.advance(self.config.effective_hop());

        result
    }

    fn diagnostics(&self, now: Instant) -> Diagnostics {
        let win_ms = self.config.window_ms();
        let half_window = Duration::from_micros((win_ms * 500.0).round() as u64);

        let since_start = self
            .origin
            .map(|origin| now.saturating_duration_since(origin))
            .unwrap_or_default();
        let ts_ms = since_start.saturating_sub(half_window).as_millis() as u64;

        let epoch_ms = self
            .clock
            .as_ref()
            .and_then(|clock| clock.now())
            .map(|wall| wall.timestamp_millis() - half_window.as_millis() as i64);

        Diagnostics {
            fft_bands: self.config.fft_bands,
            window_shift: self.config.window_shift,
            max_analysis_hz: self.config.max_analysis_hz,
            seq: self.seq,
            ts_ms,
            win_ms,
            hop_ms: self.config.hop_ms(),
            epoch_ms,
            schema_version: SCHEMA_VERSION,
            band_center: self.edges.center.clone(),
            band_low: self.edges.low.clone(),
            band_high: self.edges.high.clone(),
        }
    }

    /// Read one sample from `source` and feed it in
    ///
    /// A transient read failure skips the tick without touching the filter or
    /// the window. Any other error ends the stream.
    pub fn tick<S>(&mut self, source: &mut S, now: Instant) -> Result<TickOutcome>
    where
        S: SampleSource + ?Sized,
    {
        match source.read_sample() {
            Ok(Some(sample)) => Ok(TickOutcome::Sampled(self.push_sample(sample, now))),
            Ok(None) => Ok(TickOutcome::Exhausted),
            Err(e) if e.is_transient() => {
                self.skipped += 1;
                warn!("Sample read failed, skipping tick: {}", e);
                Ok(TickOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// Sample `source` in real time at `sample_frequency`
    ///
    /// The callback sees every tick and may stop the stream.
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of records published before stopping
    pub fn run<S, F>(&mut self, source: &mut S, callback: F) -> Result<u64>
    where
        S: SampleSource + ?Sized,
        F: FnMut(&TickOutcome) -> StreamControl,
    {
        self.drive(source, callback, true)
    }

    /// Feed a finite recording as fast as possible
    ///
    /// Sample instants follow a virtual clock advancing `1 / sample_frequency`
    /// per tick, so rate limiting and timestamps behave as if sampled live.
    pub fn replay<S, F>(&mut self, source: &mut S, callback: F) -> Result<u64>
    where
        S: SampleSource + ?Sized,
        F: FnMut(&TickOutcome) -> StreamControl,
    {
        self.drive(source, callback, false)
    }

    fn drive<S, F>(&mut self, source: &mut S, mut callback: F, paced: bool) -> Result<u64>
    where
        S: SampleSource + ?Sized,
        F: FnMut(&TickOutcome) -> StreamControl,
    {
        let interval = Duration::from_secs_f64(1.0 / self.config.sample_frequency);
        let start = Instant::now();
        let mut next_sample_time = start;
        let mut published = 0u64;
        let mut virtual_now = start;

        loop {
            let now = if paced { Instant::now() } else { virtual_now };
            virtual_now += interval;

            let outcome = self.tick(source, now)?;
            if matches!(outcome, TickOutcome::Exhausted) {
                break;
            }
            if outcome.result().is_some() {
                published += 1;
            }
            if callback(&outcome) == StreamControl::Break {
                break;
            }

            if paced {
                // Wait until next sample time
                next_sample_time += interval;
                let now = Instant::now();
                if next_sample_time > now {
                    std::thread::sleep(next_sample_time - now);
                }
                // If we're running behind, don't sleep and continue immediately
            }
        }

        info!(
            "Stream ended: {} samples, {} skipped, {} records",
            self.samples, self.skipped, published
        );
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::NumericField;
    use crate::source::{ReplaySource, ToneSource};
    use crate::spectrum::Spectrum;
    use chrono::DateTime;
    use std::sync::Mutex;

    fn config(n: usize, shift: usize, max_hz: f64) -> AnalyzerConfig {
        AnalyzerConfig {
            fft_samples: n,
            window_shift: shift,
            max_analysis_hz: max_hz,
            ..AnalyzerConfig::default()
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Feed `count` samples at 1 ms spacing, returning (sample index, record)
    fn feed(
        pipeline: &mut Pipeline,
        source: &mut dyn SampleSource,
        count: u64,
    ) -> Vec<(u64, Arc<AnalysisResult>)> {
        let t0 = Instant::now();
        let mut out = Vec::new();
        for i in 0..count {
            if let TickOutcome::Sampled(Some(r)) = pipeline.tick(source, t0 + ms(i)).unwrap() {
                out.push((i, r));
            }
        }
        out
    }

    #[test]
    fn test_tone_end_to_end() {
        let mut pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let mut source = ToneSource::new(1000.0, 50.0, 0.5);

        let records = feed(&mut pipeline, &mut source, 512);
        assert_eq!(records.len(), 1);
        let (index, result) = &records[0];
        assert_eq!(*index, 511);

        assert!((result.bin_hz - 1.953125).abs() < 1e-9);
        assert_eq!(result.n, 512);
        assert_eq!(result.bands.len(), 16);
        assert!((result.peak_hz - 50.0).abs() <= result.bin_hz);
        assert!(result.bands.iter().all(|b| b.is_finite() && *b >= 0.0));

        // 50 Hz lands in band 1 (31.25 - 62.5 Hz)
        let loudest = result
            .bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(1));

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["fs"], 1000.0);
        assert_eq!(json["n"], 512);
        assert_eq!(json["bands"].as_array().unwrap().len(), 16);
    }

    #[test]
    fn test_no_record_before_window_full() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let mut source = ToneSource::new(1000.0, 50.0, 1.0);
        assert!(feed(&mut pipeline, &mut source, 127).is_empty());
        assert!(pipeline.reader().latest().is_none());
    }

    #[test]
    fn test_silence_yields_zero_features() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let mut source = ReplaySource::new(vec![0.0; 128]);
        let records = feed(&mut pipeline, &mut source, 128);
        let result = &records[0].1;
        assert_eq!(result.rms, 0.0);
        assert_eq!(result.peak_hz, 0.0);
        assert!(result.bands.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_overlap_increases_cycle_rate() {
        let count = 4096;
        let mut plain = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let without = feed(&mut plain, &mut ToneSource::new(1000.0, 50.0, 1.0), count);

        let mut overlapped = Pipeline::new(config(128, 32, 300.0)).unwrap();
        let with = feed(&mut overlapped, &mut ToneSource::new(1000.0, 50.0, 1.0), count);

        assert_eq!(without.len(), 32);
        assert_eq!(with.len(), (4096 - 128) / 32 + 1);

        // Consecutive overlapped windows start exactly one hop apart
        assert!(with.windows(2).all(|w| w[1].0 - w[0].0 == 32));
    }

    #[test]
    fn test_rate_ceiling_spaces_cycles() {
        // Hop of 8 ms, ceiling of 100 Hz: cycles at least 10 ms apart
        let mut pipeline = Pipeline::new(config(128, 8, 100.0)).unwrap();
        let records = feed(&mut pipeline, &mut ToneSource::new(1000.0, 50.0, 1.0), 2000);

        assert!(records.len() > 10);
        assert!(records.windows(2).all(|w| w[1].0 - w[0].0 >= 10));
    }

    #[test]
    fn test_diagnostics_track_sequence_and_time() {
        let mut pipeline = Pipeline::new(config(128, 64, 300.0)).unwrap();
        let records = feed(&mut pipeline, &mut ToneSource::new(1000.0, 50.0, 1.0), 512);

        for (i, (index, result)) in records.iter().enumerate() {
            let diag = result.diagnostics.as_ref().unwrap();
            assert_eq!(diag.seq, i as u64);
            assert_eq!(diag.window_shift, 64);
            assert_eq!(diag.win_ms, 128.0);
            assert_eq!(diag.hop_ms, 64.0);
            assert_eq!(diag.schema_version, SCHEMA_VERSION);
            assert!(diag.epoch_ms.is_none());
            // Window centre: last sample time minus half a window
            assert_eq!(diag.ts_ms, index.saturating_sub(64));
        }
    }

    #[test]
    fn test_wall_clock_sets_epoch() {
        let clock = || DateTime::from_timestamp(1_700_000_000, 0);
        let mut pipeline = Pipeline::new(config(128, 0, 300.0))
            .unwrap()
            .with_wall_clock(Box::new(clock));
        let records = feed(&mut pipeline, &mut ToneSource::new(1000.0, 50.0, 1.0), 128);
        let diag = records[0].1.diagnostics.as_ref().unwrap();
        assert_eq!(diag.epoch_ms, Some(1_700_000_000_000 - 64));
        assert!(records[0].1.to_json_with_diagnostics().unwrap().contains("epoch_ms"));
    }

    struct FlakySource {
        inner: ToneSource,
        reads: u64,
    }

    impl SampleSource for FlakySource {
        fn read_sample(&mut self) -> Result<Option<f32>> {
            self.reads += 1;
            if self.reads % 2 == 0 {
                return Err(AnalyzerError::Communication("NACK".to_string()));
            }
            self.inner.read_sample()
        }
    }

    #[test]
    fn test_transient_failures_skip_ticks() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let mut source = FlakySource {
            inner: ToneSource::new(1000.0, 50.0, 1.0),
            reads: 0,
        };
        let records = feed(&mut pipeline, &mut source, 300);

        assert_eq!(pipeline.samples(), 150);
        assert_eq!(pipeline.skipped(), 150);
        // 150 good samples fill exactly one 128-sample window
        assert_eq!(records.len(), 1);
    }

    struct BrokenSource;

    impl SampleSource for BrokenSource {
        fn read_sample(&mut self) -> Result<Option<f32>> {
            Err(AnalyzerError::InvalidDeviceId(0))
        }
    }

    #[test]
    fn test_fatal_failure_propagates() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        assert!(pipeline.tick(&mut BrokenSource, Instant::now()).is_err());
        assert_eq!(pipeline.skipped(), 0);
    }

    #[test]
    fn test_invalid_config_refuses_start() {
        assert!(matches!(
            Pipeline::new(config(100, 0, 300.0)),
            Err(AnalyzerError::InvalidConfig(_))
        ));
        assert!(Pipeline::new(config(128, 256, 300.0)).is_err());
        assert!(Pipeline::new(config(128, 0, 0.0)).is_err());
    }

    #[test]
    fn test_tiny_rates_refused_not_panicking() {
        assert!(matches!(
            Pipeline::new(config(128, 0, 1e-20)),
            Err(AnalyzerError::InvalidConfig(_))
        ));
        let mut cfg = config(128, 0, 300.0);
        cfg.sample_frequency = 1e-20;
        assert!(matches!(Pipeline::new(cfg), Err(AnalyzerError::InvalidConfig(_))));
    }

    #[test]
    fn test_gravity_offset_first_record_clean() {
        // Default config, 50 mg tone riding on 1 g as seen on the magnitude axis
        let mut pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let mut source = ToneSource::new(1000.0, 50.0, 0.05).with_offset(1.0);

        let records = feed(&mut pipeline, &mut source, 2048);
        assert_eq!(records.len(), 4);
        let expected_rms = 0.05 / 2f64.sqrt();
        for (_, result) in &records {
            assert!((result.peak_hz - 50.0).abs() <= result.bin_hz, "peak {}", result.peak_hz);
            assert!(
                (result.rms - expected_rms).abs() < 0.05 * expected_rms,
                "rms {}",
                result.rms
            );
        }
    }

    #[test]
    fn test_band_edges_in_diagnostics() {
        let mut cfg = config(128, 0, 300.0);
        cfg.fft_bands = 5;
        let mut pipeline = Pipeline::new(cfg).unwrap();
        let records = feed(&mut pipeline, &mut ToneSource::new(1000.0, 50.0, 1.0), 128);

        let json = records[0].1.to_json_with_diagnostics().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["band_low"][4], 375.0);
        assert_eq!(value["band_high"][4], 500.0);
        assert_eq!(value["band_center"][0], 46.875);
        assert_eq!(value["band_high"].as_array().unwrap().len(), 5);
        assert!(!records[0].1.to_json().unwrap().contains("band_low"));
    }

    #[test]
    fn test_replay_clock_advances_per_sample() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let mut stamps = Vec::new();
        let mut source = ToneSource::new(1000.0, 50.0, 1.0).with_limit(512);
        pipeline
            .replay(&mut source, |outcome| {
                if let Some(r) = outcome.result() {
                    stamps.push(r.diagnostics.as_ref().unwrap().ts_ms);
                }
                StreamControl::Continue
            })
            .unwrap();
        // Windows end at samples 127, 255, 383, 511; stamped at their centres
        assert_eq!(stamps, vec![63, 191, 319, 447]);
    }

    struct FixedAnalyzer(usize);

    impl SpectralAnalyzer for FixedAnalyzer {
        fn size(&self) -> usize {
            self.0
        }

        fn analyze(&mut self, _window: &Window) -> Spectrum {
            let mut magnitudes = vec![0.0; self.0 / 2];
            magnitudes[10] = 1.0;
            Spectrum {
                magnitudes,
                bin_hz: 1000.0 / self.0 as f64,
            }
        }
    }

    #[test]
    fn test_custom_analyzer() {
        let pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        assert!(pipeline.with_analyzer(Box::new(FixedAnalyzer(256))).is_err());

        let mut pipeline = Pipeline::new(config(128, 0, 300.0))
            .unwrap()
            .with_analyzer(Box::new(FixedAnalyzer(128)))
            .unwrap();
        let records = feed(&mut pipeline, &mut ReplaySource::new(vec![0.0; 128]), 128);
        assert_eq!(records[0].1.peak_hz, 10.0 * 1000.0 / 128.0);
    }

    #[test]
    fn test_observers_and_cpu_load() {
        let mut cfg = config(128, 0, 300.0);
        cfg.load_window_us = 50_000;
        let mut pipeline = Pipeline::new(cfg).unwrap();

        let seen = Arc::new(Mutex::new((0usize, 0usize)));
        let sink = Arc::clone(&seen);
        pipeline
            .publisher_mut()
            .observe(NumericField::Rms, move |_| sink.lock().unwrap().0 += 1);
        let sink = Arc::clone(&seen);
        pipeline.publisher_mut().observe(NumericField::CpuLoad, move |v| {
            assert!((0.0..=100.0).contains(&v));
            sink.lock().unwrap().1 += 1;
        });

        feed(&mut pipeline, &mut ToneSource::new(1000.0, 50.0, 1.0), 1000);

        let (rms_updates, load_updates) = *seen.lock().unwrap();
        assert_eq!(rms_updates, 7);
        // One load report per 50 ms accounting window
        assert!((19..=20).contains(&load_updates));
    }

    #[test]
    fn test_replay_runs_to_exhaustion() {
        let mut pipeline = Pipeline::new(config(128, 0, 300.0)).unwrap();
        let reader = pipeline.reader();
        let mut source = ToneSource::new(1000.0, 100.0, 1.0).with_limit(1024);

        let mut ticks = 0;
        let published = pipeline
            .replay(&mut source, |_| {
                ticks += 1;
                StreamControl::Continue
            })
            .unwrap();

        assert_eq!(ticks, 1024);
        assert_eq!(published, 8);
        let latest = reader.latest().unwrap();
        assert_eq!(latest.diagnostics.as_ref().unwrap().seq, 7);
        assert!((latest.peak_hz - 100.0).abs() <= latest.bin_hz);
    }

    #[test]
    fn test_run_stops_on_break() {
        let mut cfg = config(128, 0, 300.0);
        cfg.sample_frequency = 5_000.0;
        let mut pipeline = Pipeline::new(cfg).unwrap();
        let mut source = ToneSource::new(5_000.0, 500.0, 1.0);

        let published = pipeline
            .run(&mut source, |outcome| {
                if outcome.result().is_some() {
                    StreamControl::Break
                } else {
                    StreamControl::Continue
                }
            })
            .unwrap();
        assert_eq!(published, 1);
        assert_eq!(pipeline.samples(), 128);
    }
}
