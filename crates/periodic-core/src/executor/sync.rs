//! The synchronous executor: runs submitted work inline, on the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PeriodicError, ShutdownError};
use crate::run_wrapper::RunOutcome;

use super::{Executor, ExecutorStats, Handle, Job, RunWrapperKind};

/// Runs each submitted job on the calling thread and returns an
/// already-terminal handle.
///
/// The `green` flag has no effect on `submit` itself (the job still runs
/// inline either way) — it only changes what kind of wait primitive a
/// caller should use against the returned handle's `result()` in a
/// cooperative-scheduler context, which in this port is left to the caller
/// since this crate has no cooperative runtime of its own to integrate
/// with.
pub struct SyncExecutor {
    alive: AtomicBool,
    green: bool,
}

impl SyncExecutor {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            green: false,
        }
    }

    #[must_use]
    pub fn green(mut self) -> Self {
        self.green = true;
        self
    }

    pub fn is_green(&self) -> bool {
        self.green
    }

    /// Revives a shut-down synchronous executor. Does *not* clear
    /// statistics itself — when wrapped in a
    /// [`super::gatherer::GatheringExecutor`], use that type's own
    /// `restart`, which clears the gathered statistics too.
    pub fn restart(&self) {
        self.alive.store(true, Ordering::Release);
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for SyncExecutor {
    const RUN_WRAPPER: RunWrapperKind = RunWrapperKind::Retain;

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(ShutdownError::ExecutorShutDown.into());
        }
        let outcome = job();
        Ok(Arc::new(SyncHandle { outcome }))
    }

    fn shutdown(&self, _wait: bool) {
        self.alive.store(false, Ordering::Release);
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn statistics(&self) -> ExecutorStats {
        ExecutorStats::default()
    }
}

/// A handle that's already terminal the moment it's constructed, since the
/// job it refers to already ran inline during `submit`.
struct SyncHandle {
    outcome: RunOutcome,
}

impl Handle for SyncHandle {
    fn cancelled(&self) -> bool {
        false
    }

    fn result(&self) -> Option<RunOutcome> {
        Some(self.outcome.clone())
    }

    fn add_done_callback(&self, callback: Box<dyn FnOnce(&dyn Handle) + Send>) {
        callback(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_runs_job_inline_and_returns_terminal_handle() {
        let executor = SyncExecutor::new();
        let handle = executor
            .submit(Box::new(|| RunOutcome {
                started_at: 0.0,
                finished_at: 1.0,
                failure: None,
            }))
            .unwrap();
        assert!(!handle.cancelled());
        let outcome = handle.result().unwrap();
        assert_eq!(outcome.finished_at, 1.0);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let executor = SyncExecutor::new();
        executor.shutdown(true);
        assert!(!executor.alive());
        let result = executor.submit(Box::new(|| RunOutcome {
            started_at: 0.0,
            finished_at: 0.0,
            failure: None,
        }));
        assert!(matches!(
            result,
            Err(PeriodicError::Shutdown(ShutdownError::ExecutorShutDown))
        ));
    }

    #[test]
    fn restart_revives_a_shut_down_executor() {
        let executor = SyncExecutor::new();
        executor.shutdown(true);
        executor.restart();
        assert!(executor.alive());
    }
}
