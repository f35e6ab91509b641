//! Offline vibration analyzer
//!
//! Replays a recorded acceleration series through the same pipeline as the
//! live monitor and writes one JSON record per completed analysis cycle.
//!
//! Usage:
//!   analyzer --input capture.csv --sample-frequency 1000 --window-shift 256
//!   analyzer --input capture.txt --config analyzer.toml --output records.jsonl --summary

use clap::Parser;
use log::info;
use mpu_fft_analyzer::{
    AnalysisResult, ConfigArgs, NumericField, Pipeline, ReplaySource, StreamControl,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(about = "Run vibration spectrum analysis over a recorded sample file", long_about = None)]
struct Args {
    /// Input file: one value per line, or CSV with the value in the last column
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Include sequence, timestamps and layout in JSON records
    #[arg(long)]
    diagnostics: bool,

    /// Print a summary of the run to stderr
    #[arg(long)]
    summary: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

/// Running totals over every published record
#[derive(Debug, Default)]
struct Summary {
    records: u64,
    max_rms: f64,
    band_totals: Vec<f64>,
    peak_counts: Vec<(f64, u64)>,
}

impl Summary {
    fn add(&mut self, result: &AnalysisResult) {
        self.records += 1;
        self.max_rms = self.max_rms.max(result.rms);

        if self.band_totals.len() < result.bands.len() {
            self.band_totals.resize(result.bands.len(), 0.0);
        }
        for (total, energy) in self.band_totals.iter_mut().zip(&result.bands) {
            *total += energy;
        }

        match self.peak_counts.iter_mut().find(|(hz, _)| *hz == result.peak_hz) {
            Some((_, count)) => *count += 1,
            None => self.peak_counts.push((result.peak_hz, 1)),
        }
    }

    fn write(&self, output: &mut dyn Write, cpu_load: &[f64]) -> io::Result<()> {
        writeln!(output, "{}", "=".repeat(60))?;
        writeln!(output, "REPLAY SUMMARY")?;
        writeln!(output, "{}", "=".repeat(60))?;
        writeln!(output, "  Records: {}", self.records)?;
        writeln!(output, "  Max RMS: {:.6} g", self.max_rms)?;

        let mut peaks = self.peak_counts.clone();
        peaks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.total_cmp(&b.0)));
        writeln!(output, "\n  Most frequent peaks:")?;
        for (hz, count) in peaks.iter().take(5) {
            writeln!(output, "    {:8.2} Hz  x{}", hz, count)?;
        }

        if self.records > 0 {
            writeln!(output, "\n  Mean band energy:")?;
            for (i, total) in self.band_totals.iter().enumerate() {
                writeln!(output, "    band {:2}: {:.6e}", i, total / self.records as f64)?;
            }
        }

        if !cpu_load.is_empty() {
            let mean = cpu_load.iter().sum::<f64>() / cpu_load.len() as f64;
            writeln!(
                output,
                "\n  Analysis CPU load: mean {:.2}% over {} windows",
                mean,
                cpu_load.len()
            )?;
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config.resolve()?;

    info!("Loading samples from {}...", args.input.display());
    let mut source = ReplaySource::from_file(&args.input)?;
    if source.len() < config.fft_samples {
        eprintln!(
            "Warning: {} samples is less than one {}-sample window, no records will be produced",
            source.len(),
            config.fft_samples
        );
    }
    info!(
        "Loaded {} samples ({:.2}s at {} Hz)",
        source.len(),
        source.len() as f64 / config.sample_frequency,
        config.sample_frequency
    );

    // Open output
    let mut output: Box<dyn Write> = if let Some(path) = &args.output {
        Box::new(BufWriter::new(File::create(path)?))
    } else {
        Box::new(io::stdout().lock())
    };

    let mut pipeline = Pipeline::new(config)?;

    let cpu_load = Arc::new(Mutex::new(Vec::new()));
    let load_sink = Arc::clone(&cpu_load);
    pipeline.publisher_mut().observe(NumericField::CpuLoad, move |load| {
        if let Ok(mut loads) = load_sink.lock() {
            loads.push(load);
        }
    });

    let mut summary = Summary::default();
    let mut write_error = None;

    pipeline.replay(&mut source, |outcome| {
        let Some(result) = outcome.result() else {
            return StreamControl::Continue;
        };
        summary.add(result);

        let line = if args.diagnostics {
            result.to_json_with_diagnostics()
        } else {
            result.to_json()
        };
        let written = line
            .map_err(Box::<dyn std::error::Error>::from)
            .and_then(|line| writeln!(output, "{}", line).map_err(Into::into));
        match written {
            Ok(()) => StreamControl::Continue,
            Err(e) => {
                write_error = Some(e);
                StreamControl::Break
            }
        }
    })?;

    if let Some(e) = write_error {
        return Err(e);
    }
    output.flush()?;

    if args.summary {
        let loads = cpu_load.lock().map(|l| l.clone()).unwrap_or_default();
        summary.write(&mut io::stderr(), &loads)?;
    }

    Ok(())
}
