//! Transfer timer: brackets an artifact's transmission.
//!
//! Elapsed time comes from the monotonic clock, so wall-clock steps during a
//! run do not skew throughput figures. The wall-clock start is kept for
//! reports only. Timing never fails a transfer: an unusable reading is
//! reported as zero.

use std::time::Instant;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Microseconds since `start`, or 0 if the reading is unusable.
    pub fn elapsed_us(&self) -> i64 {
        elapsed_between(self.started, Instant::now())
    }
}

/// Signed microseconds from `begin` to `end`; 0 when `end` precedes `begin`
/// or the span does not fit.
pub fn elapsed_between(begin: Instant, end: Instant) -> i64 {
    end.checked_duration_since(begin)
        .and_then(|d| i64::try_from(d.as_micros()).ok())
        .unwrap_or(0)
}

/// Run `operation` and return its output with the elapsed microseconds.
pub fn bracket<T>(operation: impl FnOnce() -> T) -> (T, i64) {
    let watch = Stopwatch::start();
    let out = operation();
    (out, watch.elapsed_us())
}

/// Bits per second for `bytes` sent in `elapsed_us`.
pub fn throughput_bps(bytes: u64, elapsed_us: i64) -> Option<f64> {
    if elapsed_us <= 0 {
        return None;
    }
    Some(bytes as f64 * 8.0 * 1_000_000.0 / elapsed_us as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bracket_measures_operation() {
        let (value, us) = bracket(|| {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(value, 42);
        assert!(us >= 5_000);
    }

    #[test]
    fn test_reversed_instants_degrade_to_zero() {
        let a = Instant::now();
        let b = a + Duration::from_micros(1500);
        assert_eq!(elapsed_between(a, b), 1500);
        assert_eq!(elapsed_between(b, a), 0);
    }

    #[test]
    fn test_throughput() {
        // 16 MiB in 13.51 s is just under 10 Mbps.
        let bps = throughput_bps(16_777_216, 13_510_000).unwrap();
        assert!((9_900_000.0..10_000_000.0).contains(&bps));
        assert_eq!(throughput_bps(10, 0), None);
    }
}
