//! Analysis cycle throttling and CPU load accounting
//!
//! The governor gates cycle *starts*: a cycle may begin only when none is
//! running, at least `1 / max_analysis_hz` has passed since the previous
//! start, and (optionally) the load spent so far in the current
//! `load_window_us` accounting window is below the configured ceiling.
//! Completed cycles go into a fixed-size ring of `(end, duration)` records
//! from which both the window load and the sliding load are derived.

use log::warn;
use std::time::{Duration, Instant};

/// Upper bound on the cycle history ring
const MAX_HISTORY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct CycleRecord {
    end: Instant,
    duration: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadGovernor {
    min_spacing: Duration,
    load_window: Duration,
    max_load_percent: Option<f32>,
    state: GovernorState,
    last_start: Option<Instant>,
    origin: Option<Instant>,
    last_report: Option<Instant>,
    history: Vec<Option<CycleRecord>>,
    history_head: usize,
    load_percent: f32,
    saturated: bool,
}

impl LoadGovernor {
    /// Create a governor
    ///
    /// # Arguments
    /// * `max_analysis_hz` - Ceiling on cycle starts per second (> 0)
    /// * `load_window_us` - Length of the load accounting window
    /// * `max_load_percent` - Optional load ceiling that withholds cycles
    pub fn new(max_analysis_hz: f64, load_window_us: u64, max_load_percent: Option<f32>) -> Self {
        let min_spacing = Duration::from_secs_f64(1.0 / max_analysis_hz);
        let load_window = Duration::from_micros(load_window_us.max(1));

        // Enough slots for every cycle the rate ceiling admits in one window
        let slots = (load_window.as_secs_f64() * max_analysis_hz).ceil() as usize + 1;
        let slots = slots.clamp(2, MAX_HISTORY);

        Self {
            min_spacing,
            load_window,
            max_load_percent,
            state: GovernorState::Idle,
            last_start: None,
            origin: None,
            last_report: None,
            history: vec![None; slots],
            history_head: 0,
            load_percent: 0.0,
            saturated: false,
        }
    }

    pub fn state(&self) -> GovernorState {
        self.state
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Load reported at the end of the last accounting window, in percent
    pub fn load_percent(&self) -> f32 {
        self.load_percent
    }

    fn touch(&mut self, now: Instant) {
        if self.origin.is_none() {
            self.origin = Some(now);
            self.last_report = Some(now);
        }
    }

    /// Whether a new cycle may start at `now`
    pub fn may_run_now(&mut self, now: Instant) -> bool {
        self.touch(now);

        if self.state == GovernorState::Running {
            return false;
        }

        if let Some(last) = self.last_start {
            if now.saturating_duration_since(last) < self.min_spacing {
                return false;
            }
        }

        if let Some(ceiling) = self.max_load_percent {
            let load = self.window_load_percent(now);
            if load >= ceiling {
                if !self.saturated {
                    warn!(
                        "Analysis load {:.1}% at ceiling {:.1}%, withholding cycles",
                        load, ceiling
                    );
                    self.saturated = true;
                }
                return false;
            }
            self.saturated = false;
        }

        true
    }

    /// Mark the start of a cycle (Idle → Running)
    pub fn begin_cycle(&mut self, now: Instant) {
        self.touch(now);
        self.state = GovernorState::Running;
        self.last_start = Some(now);
    }

    /// Record a completed cycle (Running → Idle)
    ///
    /// `end` is the instant the cycle finished and `elapsed` its duration.
    pub fn record_cycle_duration(&mut self, end: Instant, elapsed: Duration) {
        self.touch(end);
        self.state = GovernorState::Idle;

        self.history[self.history_head] = Some(CycleRecord {
            end,
            duration: elapsed,
        });
        self.history_head = (self.history_head + 1) % self.history.len();
    }

    /// Close the accounting window if it has elapsed
    ///
    /// Returns the load percentage for the window that just closed.
    pub fn poll(&mut self, now: Instant) -> Option<f32> {
        self.touch(now);
        let last = self.last_report?;
        if now.saturating_duration_since(last) < self.load_window {
            return None;
        }
        self.load_percent = self.sliding_load_percent(now);
        self.last_report = Some(now);
        Some(self.load_percent)
    }

    /// Start of the accounting window containing `now`
    ///
    /// Counts a window as rolled over even before `poll` reports it.
    fn current_window_start(&self, now: Instant) -> Option<Instant> {
        let last = self.last_report?;
        let elapsed = now.saturating_duration_since(last).as_nanos();
        let offset = elapsed % self.load_window.as_nanos();
        Some(now - Duration::from_nanos(offset as u64))
    }

    /// Share of the current accounting window already spent inside cycles, in percent
    ///
    /// Measured against the full window length; drops back to zero when the
    /// window rolls over.
    pub fn window_load_percent(&self, now: Instant) -> f32 {
        let Some(start) = self.current_window_start(now) else {
            return 0.0;
        };
        let busy = self.busy_between(start, now);
        (busy.as_secs_f64() / self.load_window.as_secs_f64() * 100.0).min(100.0) as f32
    }

    /// Share of the last `load_window` spent inside cycles, in percent
    pub fn sliding_load_percent(&self, now: Instant) -> f32 {
        let Some(origin) = self.origin else {
            return 0.0;
        };

        let span = now.saturating_duration_since(origin).min(self.load_window);
        if span.is_zero() {
            return 0.0;
        }
        let busy = self.busy_between(now - span, now);
        (busy.as_secs_f64() / span.as_secs_f64() * 100.0).min(100.0) as f32
    }

    /// Time inside recorded cycles that overlaps `[from, to]`
    fn busy_between(&self, from: Instant, to: Instant) -> Duration {
        self.history
            .iter()
            .flatten()
            .filter_map(|record| {
                let start = record.end.checked_sub(record.duration).unwrap_or(record.end);
                let lo = start.max(from);
                let hi = record.end.min(to);
                hi.checked_duration_since(lo)
            })
            .sum()
    }
}
