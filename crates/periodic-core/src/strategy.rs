//! Next-run-time strategies.
//!
//! A [`Strategy`] computes the next run time for a callable from the
//! timestamps of its most recent run. Four named strategies plus their
//! jittered variants are registered by name so
//! [`WorkerConfig`](crate::worker::WorkerConfig) can select one from a
//! string (e.g. from a config file) and reject unknown names with
//! [`ConfigError::UnknownStrategy`].

use rand::Rng;

use crate::error::ConfigError;

/// Default jitter fraction applied by the `*_jitter` strategy variants.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.05;

/// A source of jitter randomness, injected rather than read from a process
/// global so that scheduling stays testable.
///
/// The default implementation is backed by `rand::rng()`, which reseeds
/// from the OS per thread — sufficient to avoid a thundering herd without
/// pulling in a separate RNG dependency.
pub trait JitterSource: Send + Sync {
    /// Returns a random fraction in `[0.0, 1.0)`, representing how far into
    /// the jitter window to land. Jitter is always non-negative: it is
    /// added on top of the base strategy, never subtracted, so a jittered
    /// deadline never lands earlier than its non-jittered counterpart.
    fn sample_unit(&self) -> f64;
}

/// The default [`JitterSource`], backed by the thread-local `rand::rng()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample_unit(&self) -> f64 {
        rand::rng().random_range(0.0..1.0)
    }
}

/// The timestamps available to a strategy when computing the next run.
#[derive(Debug, Clone, Copy)]
pub struct RunTimestamps {
    /// When the previous run was dispatched (or "now", for the initial
    /// schedule before any run has happened).
    pub started_at: f64,
    /// When the previous run finished (or `started_at`, before any run has
    /// happened).
    pub finished_at: f64,
}

/// Validates a jitter fraction, which must lie in `[0, 1]`.
fn validate_jitter(fraction: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(ConfigError::InvalidJitter { fraction })
    }
}

fn apply_jitter(base: f64, spacing: f64, fraction: f64, jitter: &dyn JitterSource) -> f64 {
    base + jitter.sample_unit() * fraction * spacing
}

/// A next-run-time strategy: pure functions of the previous run's
/// timestamps, the callable's spacing, and (for the jittered variants) a
/// jitter source.
///
/// Built via [`Strategy::by_name`] or [`Strategy::by_name_with_jitter`]; the
/// worker calls [`Strategy::next_run`] once per completed run and
/// [`Strategy::initial_run`] once at registration time.
pub struct Strategy {
    name: String,
    jitter_fraction: f64,
    compute: fn(RunTimestamps, f64) -> f64,
}

impl Strategy {
    /// Looks up a built-in strategy by name, using the default jitter
    /// fraction for the jittered variants.
    ///
    /// Recognized names: `last_started`, `last_finished`,
    /// `aligned_last_finished`, `last_started_jitter`,
    /// `last_finished_jitter`, `aligned_last_finished_jitter`.
    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        Self::by_name_with_jitter(name, DEFAULT_JITTER_FRACTION)
    }

    /// As [`Strategy::by_name`], but with an explicit jitter fraction for
    /// the jittered variants (ignored by the non-jittered ones). Must lie
    /// in `[0, 1]`.
    pub fn by_name_with_jitter(name: &str, jitter_fraction: f64) -> Result<Self, ConfigError> {
        validate_jitter(jitter_fraction)?;
        let compute: fn(RunTimestamps, f64) -> f64 = match name {
            "last_started" => last_started,
            "last_finished" => last_finished,
            "aligned_last_finished" => aligned_last_finished,
            "last_started_jitter" => last_started,
            "last_finished_jitter" => last_finished,
            "aligned_last_finished_jitter" => aligned_last_finished,
            other => {
                return Err(ConfigError::UnknownStrategy {
                    name: other.to_string(),
                });
            }
        };
        Ok(Self {
            name: name.to_string(),
            jitter_fraction,
            compute,
        })
    }

    fn is_jittered(&self) -> bool {
        self.name.ends_with("_jitter")
    }

    /// The next run time after a completed run, given the previous run's
    /// timestamps and the callable's spacing.
    pub fn next_run(&self, timestamps: RunTimestamps, spacing: f64, jitter: &dyn JitterSource) -> f64 {
        let base = (self.compute)(timestamps, spacing);
        if self.is_jittered() {
            apply_jitter(base, spacing, self.jitter_fraction, jitter)
        } else {
            base
        }
    }

    /// The initial run time at registration, given `now` and the
    /// callable's spacing. Every strategy, aligned or jittered, schedules
    /// its first run unaligned and unjittered at exactly `now + spacing`;
    /// alignment and jitter only take effect from the second run onward.
    pub fn initial_run(&self, now: f64, spacing: f64, _jitter: &dyn JitterSource) -> f64 {
        now + spacing
    }
}

fn last_started(timestamps: RunTimestamps, spacing: f64) -> f64 {
    timestamps.started_at + spacing
}

fn last_finished(timestamps: RunTimestamps, spacing: f64) -> f64 {
    timestamps.finished_at + spacing
}

/// `finished_at` rounded down to the nearest `spacing` boundary, plus one
/// spacing — keeps runs aligned to a fixed grid (e.g. "every hour, on the
/// hour") rather than drifting with each run's actual finish time.
fn aligned_last_finished(timestamps: RunTimestamps, spacing: f64) -> f64 {
    let aligned = timestamps.finished_at - timestamps.finished_at.rem_euclid(spacing);
    aligned + spacing
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedJitter(f64);
    impl JitterSource for FixedJitter {
        fn sample_unit(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn unknown_strategy_name_is_rejected() {
        assert!(matches!(
            Strategy::by_name("nonexistent"),
            Err(ConfigError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn jitter_fraction_out_of_range_is_rejected() {
        assert!(matches!(
            Strategy::by_name_with_jitter("last_started", 1.5),
            Err(ConfigError::InvalidJitter { .. })
        ));
        assert!(matches!(
            Strategy::by_name_with_jitter("last_started", -0.1),
            Err(ConfigError::InvalidJitter { .. })
        ));
    }

    #[test]
    fn last_started_ignores_finish_time() {
        let strategy = Strategy::by_name("last_started").unwrap();
        let timestamps = RunTimestamps {
            started_at: 10.0,
            finished_at: 50.0,
        };
        let jitter = FixedJitter(0.0);
        assert_eq!(strategy.next_run(timestamps, 5.0, &jitter), 15.0);
    }

    #[test]
    fn last_finished_ignores_start_time() {
        let strategy = Strategy::by_name("last_finished").unwrap();
        let timestamps = RunTimestamps {
            started_at: 10.0,
            finished_at: 50.0,
        };
        let jitter = FixedJitter(0.0);
        assert_eq!(strategy.next_run(timestamps, 5.0, &jitter), 55.0);
    }

    #[test]
    fn aligned_last_finished_snaps_to_grid() {
        let strategy = Strategy::by_name("aligned_last_finished").unwrap();
        let timestamps = RunTimestamps {
            started_at: 0.0,
            finished_at: 23.0,
        };
        let jitter = FixedJitter(0.0);
        // finished_at=23, spacing=10 -> aligned to 20, plus spacing = 30.
        assert_eq!(strategy.next_run(timestamps, 10.0, &jitter), 30.0);
    }

    #[test]
    fn jittered_variant_applies_offset_within_window() {
        let strategy = Strategy::by_name_with_jitter("last_started_jitter", 0.1).unwrap();
        let timestamps = RunTimestamps {
            started_at: 0.0,
            finished_at: 0.0,
        };
        let max_jitter = FixedJitter(0.999_999_999);
        let min_jitter = FixedJitter(0.0);
        assert!((strategy.next_run(timestamps, 10.0, &max_jitter) - 11.0).abs() < 1e-6);
        assert_eq!(strategy.next_run(timestamps, 10.0, &min_jitter), 10.0);
    }

    #[test]
    fn jittered_next_run_never_precedes_finish_time() {
        let strategy = Strategy::by_name("last_finished_jitter").unwrap();
        let timestamps = RunTimestamps {
            started_at: 0.0,
            finished_at: 100.0,
        };
        for sample in [0.0, 0.25, 0.5, 0.75, 0.999] {
            let jitter = FixedJitter(sample);
            assert!(strategy.next_run(timestamps, 4.0, &jitter) >= 104.0);
        }
    }

    #[test]
    fn initial_run_is_unaligned_and_unjittered_for_every_strategy() {
        let max_jitter = FixedJitter(0.999_999_999);
        for name in [
            "last_started",
            "last_finished",
            "aligned_last_finished",
            "last_started_jitter",
            "last_finished_jitter",
            "aligned_last_finished_jitter",
        ] {
            let strategy = Strategy::by_name(name).unwrap();
            // now=23, spacing=10 would snap to a grid boundary under
            // aligned_last_finished, and would pick up jitter under the
            // `_jitter` variants, if initial_run delegated to next_run.
            assert_eq!(strategy.initial_run(23.0, 10.0, &max_jitter), 33.0);
        }
    }

    #[test]
    fn non_jittered_variant_ignores_jitter_source() {
        let strategy = Strategy::by_name("last_started").unwrap();
        let timestamps = RunTimestamps {
            started_at: 0.0,
            finished_at: 0.0,
        };
        let max_jitter = FixedJitter(1.0);
        assert_eq!(strategy.next_run(timestamps, 10.0, &max_jitter), 10.0);
    }
}
