//! Shared run counters and latency statistics.
//!
//! `RunState` is the only mutable state shared between concurrent operation
//! loops: three monotonically-increasing atomic counters plus a latency
//! histogram. Counters are never reset for the lifetime of a client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use tracing::info;

pub struct RunState {
    /// Configured total operation count (0 = unbounded).
    count: u64,
    /// Progress-log interval in attempts (0 = disabled).
    progress: u64,

    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    progress_marks: AtomicU64,

    // Success latencies, nanosecond precision.
    latency_hist: Mutex<Histogram<u64>>,
}

impl RunState {
    pub fn new(count: u64, progress: u64) -> Self {
        Self {
            count,
            progress,
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            progress_marks: AtomicU64::new(0),
            // 1ns to 60s range, 3 significant digits
            latency_hist: Mutex::new(Histogram::new_with_bounds(1, 60_000_000_000, 3).unwrap()),
        }
    }

    /// Claim one attempt. Emits a progress line on every `progress`-th
    /// attempt. Returns whether the caller may proceed: always true for an
    /// unbounded run, otherwise true while the counter is within the cap.
    pub fn attempt(&self) -> bool {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.progress > 0 && n % self.progress == 0 {
            self.progress_marks.fetch_add(1, Ordering::Relaxed);
            info!(attempts = n, "progress");
        }
        self.count == 0 || n <= self.count
    }

    /// Record one successful operation. No other side effects.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed operation. No other side effects.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of a successful operation. Uses try_lock so a
    /// contended histogram drops a sample rather than stalling a loop.
    pub fn record_latency(&self, latency: Duration) {
        if let Ok(mut hist) = self.latency_hist.try_lock() {
            let _ = hist.record(latency.as_nanos() as u64);
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of progress lines emitted so far.
    pub fn progress_marks(&self) -> u64 {
        self.progress_marks.load(Ordering::Relaxed)
    }

    /// Status line combining the current counters. Approximate under
    /// concurrent updates, not a linearizable snapshot across both. The
    /// format is load-bearing: existing log scrapers match it literally.
    pub fn status(&self) -> String {
        format!(
            "success {} failure {}",
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed)
        )
    }

    /// Point-in-time view of counters and latency percentiles.
    pub fn snapshot(&self) -> RunSnapshot {
        let hist = self.latency_hist.lock().unwrap();
        RunSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            latency_ns_p50: hist.value_at_quantile(0.5),
            latency_ns_p95: hist.value_at_quantile(0.95),
            latency_ns_p99: hist.value_at_quantile(0.99),
            latency_ns_min: hist.min(),
            latency_ns_max: hist.max(),
            latency_ns_mean: hist.mean(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub latency_ns_p50: u64,
    pub latency_ns_p95: u64,
    pub latency_ns_p99: u64,
    pub latency_ns_min: u64,
    pub latency_ns_max: u64,
    pub latency_ns_mean: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_gates_at_configured_count() {
        let state = RunState::new(3, 0);
        assert!(state.attempt());
        assert!(state.attempt());
        assert!(state.attempt());
        // Counter now exceeds the cap; every further call must refuse.
        assert!(!state.attempt());
        assert!(!state.attempt());
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn attempt_unbounded_never_refuses() {
        let state = RunState::new(0, 0);
        for _ in 0..10_000 {
            assert!(state.attempt());
        }
    }

    #[test]
    fn status_format_is_literal() {
        let state = RunState::new(0, 0);
        for _ in 0..3 {
            state.record_success();
        }
        state.record_failure();
        assert_eq!(state.status(), "success 3 failure 1");
    }

    #[test]
    fn progress_marks_only_on_multiples() {
        let state = RunState::new(0, 5);
        for _ in 0..12 {
            state.attempt();
        }
        assert_eq!(state.progress_marks(), 2);
    }

    #[test]
    fn progress_disabled_when_interval_zero() {
        let state = RunState::new(0, 0);
        for _ in 0..100 {
            state.attempt();
        }
        assert_eq!(state.progress_marks(), 0);
    }

    #[test]
    fn latency_feeds_snapshot() {
        let state = RunState::new(0, 0);
        state.record_success();
        state.record_latency(Duration::from_millis(2));
        let snap = state.snapshot();
        assert_eq!(snap.successes, 1);
        assert!(snap.latency_ns_max >= 1_000_000);
    }
}
