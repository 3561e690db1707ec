//! Throttled progress and windowed speed for one transfer.

use std::time::{Duration, Instant};

use crate::task::{Progress, MAX_STREAMING_FRACTION};

/// Progress values ready to be applied to a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Progress,
    pub bytes_done: u64,
    pub total_bytes: Option<u64>,
    pub bytes_per_sec: Option<f64>,
}

/// Counts streamed bytes and decides when observers should hear about them.
///
/// Updates are emitted at most once per `interval`; the rate is recomputed once
/// per `window` from the bytes seen in that window.
#[derive(Debug)]
pub struct ProgressMeter {
    interval: Duration,
    window: Duration,
    last_emit: Instant,
    window_start: Instant,
    window_bytes: u64,
    bytes_done: u64,
    rate: Option<f64>,
}

impl ProgressMeter {
    pub fn new(interval: Duration, window: Duration, now: Instant) -> Self {
        Self {
            interval,
            window,
            last_emit: now,
            window_start: now,
            window_bytes: 0,
            bytes_done: 0,
            rate: None,
        }
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    /// Records `n` new bytes; returns an update when one is due.
    pub fn record(&mut self, n: u64, total: Option<u64>, now: Instant) -> Option<ProgressUpdate> {
        self.bytes_done += n;
        self.window_bytes += n;

        let window_elapsed = now.saturating_duration_since(self.window_start);
        if window_elapsed >= self.window {
            self.rate = Some(self.window_bytes as f64 / window_elapsed.as_secs_f64());
            self.window_start = now;
            self.window_bytes = 0;
        }

        if now.saturating_duration_since(self.last_emit) < self.interval {
            return None;
        }
        self.last_emit = now;
        Some(self.current(total))
    }

    /// Current values regardless of throttling.
    pub fn current(&self, total: Option<u64>) -> ProgressUpdate {
        let progress = match total {
            Some(t) if t > 0 => Progress::Fraction(
                (self.bytes_done as f64 / t as f64).min(MAX_STREAMING_FRACTION),
            ),
            _ => Progress::Indeterminate,
        };
        ProgressUpdate {
            progress,
            bytes_done: self.bytes_done,
            total_bytes: total.filter(|t| *t > 0),
            bytes_per_sec: self.rate,
        }
    }
}
