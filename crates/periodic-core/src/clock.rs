//! Monotonic time source used for scheduling, elapsed times, and jitter.

use std::sync::Mutex;
use std::time::Instant;

/// A source of monotonic "now", in fractional seconds.
///
/// Scheduling, elapsed-time accounting, and jitter anchoring all go through
/// this trait rather than calling `Instant::now()` directly, so tests can
/// drive the worker with a scripted sequence of `now()` values.
pub trait Clock: Send + Sync {
    /// Returns the current time, in seconds, on a monotonic but otherwise
    /// arbitrary origin (only differences between calls are meaningful).
    fn now(&self) -> f64;
}

/// The default [`Clock`], backed by [`std::time::Instant`].
#[derive(Debug, Default)]
pub struct MonotonicClock {
    origin: std::sync::OnceLock<Instant>,
}

impl MonotonicClock {
    /// Creates a new monotonic clock. The origin instant is fixed on first
    /// use so that `now()` values stay small and precise.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        let origin = self.origin.get_or_init(Instant::now);
        origin.elapsed().as_secs_f64()
    }
}

/// A deterministic clock that replays a fixed, caller-supplied sequence of
/// `now()` values, used to drive the scripted end-to-end scenarios in the
/// engine's test suite.
///
/// Calling `now()` past the end of the script repeats the last value
/// indefinitely, so a test doesn't need to account for every incidental
/// `now()` call (e.g. ones made purely for logging).
pub struct FakeClock {
    remaining: Mutex<Vec<f64>>,
    last: Mutex<f64>,
}

impl FakeClock {
    /// Creates a fake clock that yields `script[0]`, `script[1]`, ... on
    /// successive calls to `now()`, then repeats the final value.
    pub fn new(script: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = script.into_iter().collect();
        values.reverse(); // so we can `pop()` in original order
        Self {
            remaining: Mutex::new(values),
            last: Mutex::new(0.0),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> f64 {
        let mut remaining = self.remaining.lock().unwrap();
        match remaining.pop() {
            Some(value) => {
                *self.last.lock().unwrap() = value;
                value
            }
            None => {
                // Repeat the last scripted value forever rather than
                // panicking: most tests only care about the scripted
                // prefix and don't want to enumerate every background
                // `now()` call made by, e.g., logging.
                *self.last.lock().unwrap()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_is_nondecreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn fake_clock_replays_script_then_repeats() {
        let clock = FakeClock::new([0.0, 2.0, 2.0, 3.0]);
        assert_eq!(clock.now(), 0.0);
        assert_eq!(clock.now(), 2.0);
        assert_eq!(clock.now(), 2.0);
        assert_eq!(clock.now(), 3.0);
        assert_eq!(clock.now(), 3.0);
        assert_eq!(clock.now(), 3.0);
    }
}
