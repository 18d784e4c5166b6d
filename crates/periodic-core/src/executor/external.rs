//! Wraps an executor the host application owns the lifecycle of.
//!
//! Grounded on `_futures.py`'s `ExistingExecutor`: when a
//! [`crate::worker::PeriodicWorker`] is handed an executor it doesn't own
//! (e.g. one shared with other subsystems of the host application),
//! wrapping it in [`External`] makes the worker's own `shutdown(wait)`
//! calls no-ops, leaving the executor's lifecycle entirely to its owner.

use std::sync::Arc;

use crate::error::PeriodicError;

use super::{Executor, ExecutorStats, Handle, Job, RunWrapperKind};

/// Wraps `E` so that [`Executor::shutdown`] never actually shuts the inner
/// executor down — `submit`, `alive`, and `statistics` all pass straight
/// through.
pub struct External<E> {
    inner: Arc<E>,
}

impl<E> External<E> {
    pub fn new(inner: Arc<E>) -> Self {
        Self { inner }
    }
}

impl<E: Executor> Executor for External<E> {
    const RUN_WRAPPER: RunWrapperKind = E::RUN_WRAPPER;

    fn build_job(
        &self,
        name: Arc<str>,
        callable: Arc<crate::callable::CallableFn>,
        clock: Arc<dyn crate::clock::Clock>,
    ) -> Box<Job> {
        self.inner.build_job(name, callable, clock)
    }

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        self.inner.submit(job)
    }

    /// A no-op: this executor's lifecycle belongs to whoever handed it to
    /// the worker, not to the worker itself.
    fn shutdown(&self, _wait: bool) {}

    fn alive(&self) -> bool {
        self.inner.alive()
    }

    fn statistics(&self) -> ExecutorStats {
        self.inner.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::sync::SyncExecutor;
    use crate::run_wrapper::RunOutcome;

    #[test]
    fn shutdown_does_not_affect_the_inner_executor() {
        let inner = Arc::new(SyncExecutor::new());
        let external = External::new(Arc::clone(&inner));

        external.shutdown(true);
        assert!(external.alive());
        assert!(inner.alive());

        let outcome = external
            .submit(Box::new(|| RunOutcome {
                started_at: 0.0,
                finished_at: 0.0,
                failure: None,
            }))
            .unwrap()
            .result();
        assert!(outcome.is_some());
    }
}
