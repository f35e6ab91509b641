//! MPU6050 vibration monitor - live spectrum analysis
//!
//! Samples the accelerometer at the configured rate, runs the analysis
//! pipeline and prints each record as one JSON line, or as a live band
//! display.
//!
//! Usage:
//!   mpu-fft-monitor --i2c-bus 1 --fft-samples 512 --window-shift 256
//!   mpu-fft-monitor --source tone --tone-hz 120 --display bars

use clap::{Parser, ValueEnum};
use log::{error, info};
use mpu_fft_analyzer::{
    create_level_bar, AnalysisResult, AnalyzerError, Axis, BandLayout, ConfigArgs, NumericField,
    Pipeline, SampleSource, StreamControl, SystemClock, TimeKeeper, ToneSource,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// MPU6050 on a Linux I2C bus
    Mpu,
    /// Synthetic sine tone
    Tone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Display {
    /// One JSON record per line
    Json,
    /// Live band energy bars
    Bars,
}

#[derive(Parser, Debug)]
#[command(name = "mpu-fft-monitor")]
#[command(about = "Live vibration spectrum analysis from an MPU6050", long_about = None)]
struct Args {
    /// Sample source
    #[arg(long, value_enum, default_value = "mpu")]
    source: SourceKind,

    /// I2C bus number (/dev/i2c-N)
    #[arg(long, default_value = "1")]
    i2c_bus: u32,

    /// 7-bit sensor address
    #[arg(long, default_value = "104", value_parser = parse_address)]
    address: u8,

    /// Accelerometer signal to analyze
    #[arg(long, value_enum, default_value = "magnitude")]
    axis: Axis,

    /// Tone frequency in Hz (tone source)
    #[arg(long, default_value = "50.0")]
    tone_hz: f64,

    /// Tone amplitude in g (tone source)
    #[arg(long, default_value = "0.1")]
    tone_amplitude: f64,

    /// Duration in seconds (optional, runs until Ctrl+C if omitted)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    display: Display,

    /// Include sequence, timestamps and layout in JSON records
    #[arg(long)]
    diagnostics: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

/// Accepts decimal or 0x-prefixed hex
fn parse_address(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        _ => Err(format!("'{}' is not a 7-bit I2C address", value)),
    }
}

fn open_source(args: &Args, sample_frequency: f64) -> Result<Box<dyn SampleSource>, AnalyzerError> {
    match args.source {
        SourceKind::Tone => {
            info!("Tone source: {} Hz, {} g on 1 g offset", args.tone_hz, args.tone_amplitude);
            let tone = ToneSource::new(sample_frequency, args.tone_hz, args.tone_amplitude);
            Ok(Box::new(tone.with_offset(1.0)))
        }
        SourceKind::Mpu => open_sensor(args),
    }
}

#[cfg(target_os = "linux")]
fn open_sensor(args: &Args) -> Result<Box<dyn SampleSource>, AnalyzerError> {
    use mpu_fft_analyzer::{LinuxI2c, Mpu6050, Mpu6050Source};

    info!("Opening /dev/i2c-{} at 0x{:02X}", args.i2c_bus, args.address);
    let bus = LinuxI2c::open(args.i2c_bus)?;
    let sensor = match Mpu6050::new(bus, args.address) {
        Ok(s) => s,
        Err(AnalyzerError::InvalidDeviceId(id)) => {
            eprintln!("Error: Invalid MPU6050 device ID: 0x{:02X}", id);
            eprintln!("Please check:");
            eprintln!("  1. MPU6050 is properly connected to the I2C pins");
            eprintln!("  2. Power supply to MPU6050 is correct (3.3V)");
            eprintln!("  3. Pull-up resistors are present on SDA/SCL lines");
            return Err(AnalyzerError::InvalidDeviceId(id));
        }
        Err(e) => return Err(e),
    };
    info!("Sensor initialized, axis {:?}", args.axis);
    Ok(Box::new(Mpu6050Source::new(sensor, args.axis)))
}

#[cfg(not(target_os = "linux"))]
fn open_sensor(_args: &Args) -> Result<Box<dyn SampleSource>, AnalyzerError> {
    Err(AnalyzerError::Communication(
        "I2C sensor access is only available on Linux; use --source tone".to_string(),
    ))
}

fn print_json(result: &AnalysisResult, diagnostics: bool) -> Result<(), AnalyzerError> {
    let line = if diagnostics {
        result.to_json_with_diagnostics()?
    } else {
        result.to_json()?
    };
    println!("{}", line);
    Ok(())
}

fn print_bars(
    result: &AnalysisResult,
    layout: &BandLayout,
    timer: &TimeKeeper,
    cpu_load: f64,
) -> io::Result<()> {
    let full_scale = result.bands.iter().cloned().fold(0.0f64, f64::max);

    let mut out = io::stdout().lock();

    // Move cursor to top without clearing (reduces flicker)
    write!(out, "\x1B[H")?;
    writeln!(out, "MPU6050 Vibration Monitor - Live Spectrum                      ")?;
    writeln!(out, "=========================================                      ")?;
    writeln!(
        out,
        "Time: {:.2}s | fs: {:.0} Hz | N: {} | bin: {:.2} Hz | CPU: {:5.2}%        ",
        timer.elapsed_secs(),
        result.fs,
        result.n,
        result.bin_hz,
        cpu_load
    )?;
    writeln!(
        out,
        "RMS: {:8.5} g | Peak: {:7.2} Hz                                ",
        result.rms, result.peak_hz
    )?;
    writeln!(out)?;

    for (i, energy) in result.bands.iter().enumerate() {
        let (low, high) = layout.band_range_hz(i, result.bin_hz).unwrap_or_default();
        writeln!(
            out,
            "  {:6.1}-{:6.1} Hz [{}] {:10.3e}",
            low,
            high,
            create_level_bar(*energy, full_scale, 40),
            energy
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Press Ctrl+C to exit                                           ")?;
    out.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config.resolve()?;
    let mut source = open_source(&args, config.sample_frequency)?;

    let mut pipeline = Pipeline::new(config)?.with_wall_clock(Box::new(SystemClock));

    // Latest CPU load, shared with the bar display
    let cpu_load = Arc::new(std::sync::Mutex::new(0.0f64));
    let load_sink = Arc::clone(&cpu_load);
    pipeline.publisher_mut().observe(NumericField::CpuLoad, move |load| {
        info!("Analysis CPU load: {:.2}%", load);
        if let Ok(mut slot) = load_sink.lock() {
            *slot = load;
        }
    });

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let layout = pipeline.layout().clone();
    let end_time = args.duration.map(|d| Instant::now() + Duration::from_secs(d));
    let timer = TimeKeeper::new();

    if args.display == Display::Bars {
        // Clear screen once at start
        print!("\x1B[2J\x1B[H");
        io::stdout().flush()?;
    }

    let published = pipeline.run(&mut source, |outcome| {
        if !running.load(Ordering::SeqCst) {
            return StreamControl::Break;
        }
        if end_time.is_some_and(|end| Instant::now() >= end) {
            return StreamControl::Break;
        }

        if let Some(result) = outcome.result() {
            let shown = match args.display {
                Display::Json => print_json(result, args.diagnostics),
                Display::Bars => {
                    let load = cpu_load.lock().map(|v| *v).unwrap_or(0.0);
                    print_bars(result, &layout, &timer, load).map_err(AnalyzerError::from)
                }
            };
            if let Err(e) = shown {
                error!("Output failed: {}", e);
                return StreamControl::Break;
            }
        }
        StreamControl::Continue
    })?;

    info!(
        "Stopped after {:.2}s: {} records, {} samples, {} skipped reads",
        timer.elapsed_secs(),
        published,
        pipeline.samples(),
        pipeline.skipped()
    );
    Ok(())
}
