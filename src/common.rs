//! Common utilities shared across programs

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Tracks elapsed time since creation
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    /// Create a new TimeKeeper starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of wall-clock time for record timestamps
///
/// Returns `None` while the time is not yet known (e.g. before NTP sync).
pub trait WallClock: Send {
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// System real-time clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

impl<F> WallClock for F
where
    F: Fn() -> Option<DateTime<Utc>> + Send,
{
    fn now(&self) -> Option<DateTime<Utc>> {
        self()
    }
}

/// Create a horizontal level bar for a non-negative value
///
/// # Arguments
/// * `value` - The value to display
/// * `max_value` - Value that fills the whole bar
/// * `width` - Total width of the bar in characters
///
/// # Example
/// ```
/// use mpu_fft_analyzer::create_level_bar;
///
/// // Band energy 0.75 on a 1.0 full scale, 20 characters wide
/// let bar = create_level_bar(0.75, 1.0, 20);
/// println!("[{}]", bar);
/// ```
pub fn create_level_bar(value: f64, max_value: f64, width: usize) -> String {
    let normalized = if max_value > 0.0 && value.is_finite() {
        (value / max_value).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = ((normalized * width as f64).round() as usize).min(width);

    let mut bar = String::with_capacity(width * 3);
    bar.push_str(&"█".repeat(filled));
    bar.push_str(&" ".repeat(width - filled));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bar_empty() {
        let bar = create_level_bar(0.0, 2.0, 40);
        assert_eq!(bar.chars().count(), 40);
        assert!(!bar.contains('█'));
    }

    #[test]
    fn test_level_bar_half() {
        let bar = create_level_bar(1.0, 2.0, 40);
        assert_eq!(bar.chars().count(), 40);
        assert_eq!(bar.chars().filter(|&c| c == '█').count(), 20);
    }

    #[test]
    fn test_level_bar_clamps() {
        let bar = create_level_bar(5.0, 2.0, 10);
        assert_eq!(bar.chars().filter(|&c| c == '█').count(), 10);
        let bar = create_level_bar(1.0, 0.0, 10);
        assert_eq!(bar.chars().filter(|&c| c == '█').count(), 0);
    }

    #[test]
    fn test_timekeeper() {
        let keeper = TimeKeeper::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = keeper.elapsed_secs();
        assert!(elapsed >= 0.01); // At least 10ms
        assert!(elapsed < 1.0);
    }

    #[test]
    fn test_closure_wall_clock() {
        let clock = || DateTime::from_timestamp(1_700_000_000, 0);
        assert_eq!(clock.now().unwrap().timestamp(), 1_700_000_000);
        assert!(SystemClock.now().is_some());
    }
}
