//! The executor contract and its implementations.
//!
//! One trait covers "submit-and-forget work, uniformly, across four
//! different concurrency models."
//! [`PeriodicWorker`](crate::worker::PeriodicWorker) is generic over
//! `E: Executor` so it never matches on the concrete executor type;
//! [`Executor::RUN_WRAPPER`] tells it which run wrapper
//! ([`crate::run_wrapper`]) to bake into each submitted job.

pub mod external;
pub mod gatherer;
pub mod green;
pub mod sync;
pub mod thread_pool;

#[cfg(feature = "process-pool")]
pub mod process_pool;

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::PeriodicError;
use crate::run_wrapper::RunOutcome;

/// Which run wrapper an executor's jobs must use.
///
/// `NoRetain` is for executors whose completion crosses a boundary that
/// can't carry a live error object back (currently only the process-pool
/// executor); every other executor uses `Retain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunWrapperKind {
    Retain,
    NoRetain,
}

/// A unit of submitted work: already wrapped (timed, failure-captured) by
/// the caller via [`crate::run_wrapper::retain`] or
/// [`crate::run_wrapper::no_retain`], so the executor only has to run it
/// and deliver the outcome.
pub type Job = dyn FnOnce() -> RunOutcome + Send + 'static;

/// Immutable, point-in-time executor statistics, replaced wholesale on each
/// completion so readers never observe a torn state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutorStats {
    pub failures: u64,
    pub executed: u64,
    pub runtime: f64,
    pub cancelled: u64,
}

/// A handle to a submitted job, eventually resolving to a terminal state:
/// completed with an outcome, or cancelled.
pub trait Handle: Send + Sync {
    /// True iff the job was cancelled rather than run to completion.
    fn cancelled(&self) -> bool;

    /// Blocks until the job reaches a terminal state and returns its
    /// outcome, or `None` if it was cancelled.
    fn result(&self) -> Option<RunOutcome>;

    /// Registers `callback` to run exactly once, after the handle reaches a
    /// terminal state, on whichever carrier (worker thread, reader thread,
    /// cooperative scheduler, or the calling thread itself) completed it.
    ///
    /// If the handle is already terminal when this is called, `callback`
    /// runs immediately, inline.
    fn add_done_callback(&self, callback: Box<dyn FnOnce(&dyn Handle) + Send>);
}

/// The common executor contract: submit-and-forget work with statistics
/// and submission-time admission control.
pub trait Executor: Send + Sync {
    /// Which run wrapper this executor's callers must bake into submitted
    /// jobs built the default way (via [`Executor::build_job`]).
    const RUN_WRAPPER: RunWrapperKind;

    /// Builds the job [`crate::worker::PeriodicWorker`] will hand to
    /// [`Executor::submit`] for one run of `callable`.
    ///
    /// Every in-process executor (sync, thread-pool, green) uses the
    /// default: wrap `callable` with the run wrapper named by
    /// [`Executor::RUN_WRAPPER`] and run it wherever `submit` decides to.
    /// [`process_pool::ProcessPoolExecutor`] overrides this, ignoring
    /// `callable` entirely (it never crosses the process boundary) and
    /// instead building a job that dispatches to a worker process by
    /// `name`.
    fn build_job(&self, name: Arc<str>, callable: Arc<crate::callable::CallableFn>, clock: Arc<dyn crate::clock::Clock>) -> Box<Job> {
        let _ = name;
        match Self::RUN_WRAPPER {
            RunWrapperKind::Retain => {
                Box::new(move || crate::run_wrapper::retain(callable.as_ref(), clock.as_ref()))
            }
            RunWrapperKind::NoRetain => {
                Box::new(move || crate::run_wrapper::no_retain(callable.as_ref(), clock.as_ref()))
            }
        }
    }

    /// Submits `job`. Fails with [`crate::error::ShutdownError::ExecutorShutDown`]
    /// if this executor has already been shut down, or with
    /// [`crate::error::RejectedSubmission`] if this executor's admission
    /// hook (thread-pool and green only) declined the submission.
    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError>;

    /// Forbids further submissions. If `wait`, blocks until all accepted
    /// work — including any overflow/delayed work — has drained.
    fn shutdown(&self, wait: bool);

    /// True iff this executor has not been shut down.
    fn alive(&self) -> bool;

    /// A current, immutable snapshot of this executor's statistics.
    fn statistics(&self) -> ExecutorStats;
}

enum OutcomeState {
    Pending(Vec<Box<dyn FnOnce(&dyn Handle) + Send>>),
    /// `None` means the job was cancelled rather than completed.
    Done(Option<RunOutcome>),
}

/// A [`Handle`] shared between a worker (thread-pool, green, or the
/// process-pool's result-reader thread) and whoever submitted the job.
///
/// Used by every executor whose completion doesn't happen synchronously
/// inside `submit` (i.e. every executor except [`sync::SyncExecutor`],
/// which constructs an already-terminal handle directly).
pub(crate) struct OutcomeHandle {
    state: Mutex<OutcomeState>,
    condvar: Condvar,
}

impl OutcomeHandle {
    pub(crate) fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OutcomeState::Pending(Vec::new())),
            condvar: Condvar::new(),
        })
    }

    /// Marks this handle terminal with `outcome` (`None` for cancelled),
    /// waking any blocked `result()` callers and running every callback
    /// registered via `add_done_callback` before this point.
    pub(crate) fn complete(self: &Arc<Self>, outcome: Option<RunOutcome>) {
        let callbacks = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, OutcomeState::Done(outcome)) {
                OutcomeState::Pending(callbacks) => callbacks,
                OutcomeState::Done(_) => Vec::new(),
            }
        };
        self.condvar.notify_all();
        for callback in callbacks {
            callback(self.as_ref());
        }
    }
}

impl Handle for OutcomeHandle {
    fn cancelled(&self) -> bool {
        matches!(&*self.state.lock(), OutcomeState::Done(None))
    }

    fn result(&self) -> Option<RunOutcome> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                OutcomeState::Done(outcome) => return outcome.clone(),
                OutcomeState::Pending(_) => self.condvar.wait(&mut state),
            }
        }
    }

    fn add_done_callback(&self, callback: Box<dyn FnOnce(&dyn Handle) + Send>) {
        let mut state = self.state.lock();
        match &mut *state {
            OutcomeState::Done(_) => {
                drop(state);
                callback(self);
            }
            OutcomeState::Pending(callbacks) => callbacks.push(callback),
        }
    }
}
