//! Run wrappers: invoke a callable once, timing it and capturing any
//! failure.
//!
//! Two variants, selected per executor by its `RUN_WRAPPER` associated
//! constant (see [`crate::executor::RunWrapperKind`]): `retain` keeps the
//! live error object for in-process executors (sync, thread-pool, green);
//! `no_retain` only keeps the rendered string, for executors where the
//! error crossed a process boundary and can't carry a live object back
//! (the process-pool executor).

use crate::callable::CallableFn;
use crate::clock::Clock;
use crate::failure::Failure;

/// The outcome of one wrapped run.
#[derive(Clone)]
pub struct RunOutcome {
    pub started_at: f64,
    pub finished_at: f64,
    pub failure: Option<Failure>,
}

/// Runs `callable` once, retaining the live error object on failure.
pub fn retain(callable: &CallableFn, clock: &dyn Clock) -> RunOutcome {
    let started_at = clock.now();
    let failure = match callable() {
        Ok(()) => None,
        Err(error) => Some(Failure::retaining(BoxedError(error))),
    };
    let finished_at = clock.now();
    RunOutcome {
        started_at,
        finished_at,
        failure,
    }
}

/// Runs `callable` once, keeping only the rendered form of any failure.
///
/// Used when the run happened somewhere a live error object can't survive
/// (e.g. it was deserialized back from a worker process as plain text).
pub fn no_retain(callable: &CallableFn, clock: &dyn Clock) -> RunOutcome {
    let started_at = clock.now();
    let failure = callable()
        .err()
        .map(|error| Failure::rendered_only(error.to_string()));
    let finished_at = clock.now();
    RunOutcome {
        started_at,
        finished_at,
        failure,
    }
}

/// Builds a [`RunOutcome`] directly from a rendered string, for the
/// process-pool executor's deserialize path, where no callable is invoked
/// locally at all.
pub fn outcome_from_rendered(started_at: f64, finished_at: f64, rendered: Option<String>) -> RunOutcome {
    RunOutcome {
        started_at,
        finished_at,
        failure: rendered.map(Failure::rendered_only),
    }
}

/// Adapts a `Box<dyn Error + Send + Sync>` into a concrete `Error` impl so
/// it can be wrapped in [`Failure::retaining`], which takes the error by
/// value rather than already boxed.
struct BoxedError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Debug for BoxedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for BoxedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for BoxedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn retain_records_timestamps_and_keeps_live_error() {
        #[derive(Debug, thiserror::Error)]
        #[error("disk full")]
        struct DiskFull;

        let clock = FakeClock::new([1.0, 3.0]);
        let callable: &CallableFn = &|| Err(Box::new(DiskFull) as Box<dyn std::error::Error + Send + Sync>);
        let outcome = retain(callable, &clock);

        assert_eq!(outcome.started_at, 1.0);
        assert_eq!(outcome.finished_at, 3.0);
        let failure = outcome.failure.expect("callable failed");
        assert_eq!(failure.rendered(), "disk full");
        assert!(failure.error().is_some());
    }

    #[test]
    fn retain_records_no_failure_on_success() {
        let clock = FakeClock::new([0.0, 1.0]);
        let callable: &CallableFn = &|| Ok(());
        let outcome = retain(callable, &clock);
        assert!(outcome.failure.is_none());
    }

    #[test]
    fn no_retain_drops_the_live_error_but_keeps_the_message() {
        #[derive(Debug, thiserror::Error)]
        #[error("timeout")]
        struct Timeout;

        let clock = FakeClock::new([0.0, 2.0]);
        let callable: &CallableFn = &|| Err(Box::new(Timeout) as Box<dyn std::error::Error + Send + Sync>);
        let outcome = no_retain(callable, &clock);

        let failure = outcome.failure.expect("callable failed");
        assert_eq!(failure.rendered(), "timeout");
        assert!(failure.error().is_none());
    }
}
