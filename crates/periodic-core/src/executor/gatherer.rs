//! Wraps any [`Executor`] with statistics accounting.
//!
//! A short lock around a read-modify-replace of one immutable stats
//! value, so readers of [`Executor::statistics`] never observe a torn
//! update.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::PeriodicError;

use super::{Executor, ExecutorStats, Handle, Job, RunWrapperKind};

/// Wraps an inner executor `E`, folding one [`ExecutorStats`] update into a
/// lock-guarded running total on every completion.
///
/// `start_before_submit` controls whether the submission timestamp used for
/// `runtime` is taken just before or just after the inner `submit` call —
/// the synchronous executor uses *before* (its `submit` already runs the
/// job inline, so "after" would measure nothing), every other executor
/// uses *after*.
pub struct GatheringExecutor<E> {
    inner: E,
    clock: Arc<dyn Clock>,
    start_before_submit: bool,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl<E: Executor> GatheringExecutor<E> {
    pub fn new(inner: E, clock: Arc<dyn Clock>, start_before_submit: bool) -> Self {
        Self {
            inner,
            clock,
            start_before_submit,
            stats: Arc::new(Mutex::new(ExecutorStats::default())),
        }
    }

    fn fold_completion(stats: &Mutex<ExecutorStats>, started_at: f64, now: f64, handle: &dyn Handle) {
        let mut guard = stats.lock();
        let mut snapshot = *guard;
        if handle.cancelled() {
            snapshot.cancelled += 1;
        } else {
            snapshot.executed += 1;
            if let Some(outcome) = handle.result() {
                if outcome.failure.is_some() {
                    snapshot.failures += 1;
                }
            }
            snapshot.runtime += (now - started_at).max(0.0);
        }
        *guard = snapshot;
    }
}

impl<E: Executor> Executor for GatheringExecutor<E> {
    const RUN_WRAPPER: RunWrapperKind = E::RUN_WRAPPER;

    fn build_job(
        &self,
        name: Arc<str>,
        callable: Arc<crate::callable::CallableFn>,
        clock: Arc<dyn Clock>,
    ) -> Box<Job> {
        self.inner.build_job(name, callable, clock)
    }

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        let started_at = if self.start_before_submit {
            Some(self.clock.now())
        } else {
            None
        };
        let handle = self.inner.submit(job)?;
        let started_at = started_at.unwrap_or_else(|| self.clock.now());

        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        handle.add_done_callback(Box::new(move |handle| {
            let now = clock.now();
            Self::fold_completion(&stats, started_at, now, handle);
        }));
        Ok(handle)
    }

    fn shutdown(&self, wait: bool) {
        self.inner.shutdown(wait);
    }

    fn alive(&self) -> bool {
        self.inner.alive()
    }

    fn statistics(&self) -> ExecutorStats {
        *self.stats.lock()
    }
}

impl GatheringExecutor<super::sync::SyncExecutor> {
    /// Revives a shut-down synchronous executor and clears the gathered
    /// statistics — the one executor/statistics pair in this crate where
    /// `restart` clears history, matching the asymmetry documented on
    /// [`super::sync::SyncExecutor::restart`].
    pub fn restart(&self) {
        self.inner.restart();
        *self.stats.lock() = ExecutorStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::executor::sync::SyncExecutor;
    use crate::run_wrapper::RunOutcome;

    #[test]
    fn gathers_executed_and_failure_counts() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new([0.0, 1.0, 1.0, 2.0]));
        let gathered = GatheringExecutor::new(SyncExecutor::new(), clock, true);

        gathered
            .submit(Box::new(|| RunOutcome {
                started_at: 0.0,
                finished_at: 1.0,
                failure: None,
            }))
            .unwrap();
        gathered
            .submit(Box::new(|| RunOutcome {
                started_at: 1.0,
                finished_at: 2.0,
                failure: Some(crate::failure::Failure::rendered_only("boom")),
            }))
            .unwrap();

        let stats = gathered.statistics();
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.cancelled, 0);
    }

    #[test]
    fn restart_clears_statistics() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new([0.0, 1.0]));
        let gathered = GatheringExecutor::new(SyncExecutor::new(), clock, true);
        gathered
            .submit(Box::new(|| RunOutcome {
                started_at: 0.0,
                finished_at: 1.0,
                failure: None,
            }))
            .unwrap();
        assert_eq!(gathered.statistics().executed, 1);

        gathered.shutdown(true);
        gathered.restart();
        assert_eq!(gathered.statistics(), ExecutorStats::default());
    }
}
