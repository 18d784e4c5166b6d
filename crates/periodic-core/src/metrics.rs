//! Per-callable metrics and the read-only [`Watcher`] view over them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutable, atomically-updated counters for one registered callable.
///
/// All counters are monotonically non-decreasing except across [`reset`]
/// (`reset` zeroes them in place, which is why [`Watcher`] must share
/// identity with this record rather than holding a snapshot).
///
/// [`reset`]: CallableMetrics::reset
#[derive(Debug, Default)]
pub struct CallableMetrics {
    runs: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    elapsed_nanos: AtomicU64,
    elapsed_waiting_nanos: AtomicU64,
}

impl CallableMetrics {
    /// Creates a fresh, zeroed metrics record.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Folds one completed run into the counters.
    ///
    /// `elapsed` (`finished - started`) and `elapsed_waiting`
    /// (`started - submitted`) are clamped at zero before accumulating, so a
    /// non-monotonic clock can never drive a counter negative.
    pub fn record_run(&self, success: bool, elapsed_secs: f64, elapsed_waiting_secs: f64) {
        self.runs.fetch_add(1, Ordering::AcqRel);
        if success {
            self.successes.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failures.fetch_add(1, Ordering::AcqRel);
        }
        self.elapsed_nanos
            .fetch_add(secs_to_nanos_clamped(elapsed_secs), Ordering::AcqRel);
        self.elapsed_waiting_nanos.fetch_add(
            secs_to_nanos_clamped(elapsed_waiting_secs),
            Ordering::AcqRel,
        );
    }

    /// Zeroes every counter in place. Any [`Watcher`] previously obtained
    /// over this record observes the zeroed values immediately, since it
    /// shares this same allocation rather than holding a copy.
    pub fn reset(&self) {
        self.runs.store(0, Ordering::Release);
        self.successes.store(0, Ordering::Release);
        self.failures.store(0, Ordering::Release);
        self.elapsed_nanos.store(0, Ordering::Release);
        self.elapsed_waiting_nanos.store(0, Ordering::Release);
    }

    /// Takes a point-in-time, internally-consistent-per-field snapshot.
    /// (Fields are independent atomics, so a snapshot taken concurrently
    /// with a `record_run` may observe a partial update across fields —
    /// acceptable here since each field is itself a valid running total.)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.load(Ordering::Acquire),
            successes: self.successes.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            elapsed_nanos: self.elapsed_nanos.load(Ordering::Acquire),
            elapsed_waiting_nanos: self.elapsed_waiting_nanos.load(Ordering::Acquire),
        }
    }
}

fn secs_to_nanos_clamped(secs: f64) -> u64 {
    if secs <= 0.0 {
        0
    } else {
        (secs * 1e9) as u64
    }
}

/// An immutable point-in-time view of a [`CallableMetrics`] record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total number of completed runs (successes + failures).
    pub runs: u64,
    /// Number of runs that completed without a failure.
    pub successes: u64,
    /// Number of runs that completed with a captured failure.
    pub failures: u64,
    elapsed_nanos: u64,
    elapsed_waiting_nanos: u64,
}

impl MetricsSnapshot {
    /// Total accumulated execution time (`finished - started`, summed).
    pub fn elapsed(&self) -> f64 {
        self.elapsed_nanos as f64 / 1e9
    }

    /// Total accumulated queue/dispatch wait time (`started - submitted`,
    /// summed).
    pub fn elapsed_waiting(&self) -> f64 {
        self.elapsed_waiting_nanos as f64 / 1e9
    }
}

/// A read-only, live view over one callable's metrics record.
///
/// `Watcher` shares identity with the underlying [`CallableMetrics`]
/// allocation (it wraps the same `Arc`), so mutations made by the worker's
/// completion path or by [`CallableMetrics::reset`] are observed
/// immediately — a `Watcher` is never a stale snapshot.
#[derive(Debug, Clone)]
pub struct Watcher {
    name: Arc<str>,
    metrics: Arc<CallableMetrics>,
}

impl Watcher {
    pub(crate) fn new(name: Arc<str>, metrics: Arc<CallableMetrics>) -> Self {
        Self { name, metrics }
    }

    /// The name the callable was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes a snapshot of the live metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
