//! The cooperative ("green") executor.
//!
//! The corpus has no stackful-coroutine runtime to build on, so this is an
//! elastic pool of OS threads bounded by `max_workers`, with an overflow
//! queue for work submitted once the pool is saturated — matching the
//! submit/overflow/drain contract exactly, just with OS threads standing
//! in for cooperative tasks. Each spawned worker runs its assigned job,
//! then keeps draining the overflow queue until it's empty before exiting,
//! so a burst of submissions is absorbed by however many workers happened
//! to be spawned for it rather than spawning one thread per queued item.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{ConfigError, PeriodicError, RejectedSubmission, ShutdownError};

use super::{Executor, ExecutorStats, Handle, Job, OutcomeHandle, RunWrapperKind};

/// Default pool size.
pub const DEFAULT_MAX_WORKERS: usize = 1000;

pub type AdmissionHook = dyn Fn(usize) -> Result<(), RejectedSubmission> + Send + Sync;

pub struct GreenConfig {
    pub max_workers: usize,
    pub admission: Option<Arc<AdmissionHook>>,
}

impl GreenConfig {
    pub fn new() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            admission: None,
        }
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn with_admission(mut self, hook: Arc<AdmissionHook>) -> Self {
        self.admission = Some(hook);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidExecutor {
                reason: "max_workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for GreenConfig {
    fn default() -> Self {
        Self::new()
    }
}

type QueueItem = (Box<Job>, Arc<OutcomeHandle>);

pub struct GreenExecutor {
    alive: AtomicBool,
    max_workers: usize,
    running: Arc<AtomicUsize>,
    overflow: Arc<Mutex<VecDeque<QueueItem>>>,
    admission: Option<Arc<AdmissionHook>>,
    shutdown_lock: ReentrantMutex<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl GreenExecutor {
    pub fn new(config: GreenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            alive: AtomicBool::new(true),
            max_workers: config.max_workers,
            running: Arc::new(AtomicUsize::new(0)),
            overflow: Arc::new(Mutex::new(VecDeque::new())),
            admission: config.admission,
            shutdown_lock: ReentrantMutex::new(()),
            workers: Mutex::new(Vec::new()),
        })
    }

    fn spawn_worker(&self, job: Box<Job>, handle: Arc<OutcomeHandle>) {
        let overflow = Arc::clone(&self.overflow);
        let running = Arc::clone(&self.running);
        let worker = std::thread::Builder::new()
            .name("periodic-green-worker".to_string())
            .spawn(move || {
                let outcome = job();
                handle.complete(Some(outcome));
                while let Some((job, handle)) = overflow.lock().pop_front() {
                    let outcome = job();
                    handle.complete(Some(outcome));
                }
                running.fetch_sub(1, Ordering::AcqRel);
            })
            .expect("failed to spawn green worker");
        self.workers.lock().push(worker);
    }
}

impl Executor for GreenExecutor {
    const RUN_WRAPPER: RunWrapperKind = RunWrapperKind::Retain;

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        let _guard = self.shutdown_lock.lock();
        if !self.alive.load(Ordering::Acquire) {
            return Err(ShutdownError::ExecutorShutDown.into());
        }
        if let Some(admission) = &self.admission {
            admission(self.overflow.lock().len())?;
        }

        let handle = OutcomeHandle::pending();

        // Spawn a fresh worker iff doing so wouldn't exceed max_workers;
        // otherwise the job waits in the overflow queue for whichever
        // worker finishes its current job (and any overflow ahead of it)
        // first.
        let spawned = self
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |running| {
                (running < self.max_workers).then_some(running + 1)
            })
            .is_ok();

        if spawned {
            self.spawn_worker(job, Arc::clone(&handle));
        } else {
            self.overflow.lock().push_back((job, Arc::clone(&handle)));
        }

        Ok(handle as Arc<dyn Handle>)
    }

    fn shutdown(&self, wait: bool) {
        let _guard = self.shutdown_lock.lock();
        self.alive.store(false, Ordering::Release);
        if wait {
            let mut workers = self.workers.lock();
            for worker in workers.drain(..) {
                let _ = worker.join();
            }
        }
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn statistics(&self) -> ExecutorStats {
        ExecutorStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_wrapper::RunOutcome;
    use std::sync::mpsc;

    fn noop_outcome() -> RunOutcome {
        RunOutcome {
            started_at: 0.0,
            finished_at: 0.0,
            failure: None,
        }
    }

    #[test]
    fn runs_job_immediately_when_under_capacity() {
        let executor = GreenExecutor::new(GreenConfig::new().with_max_workers(4)).unwrap();
        let handle = executor.submit(Box::new(noop_outcome)).unwrap();
        let outcome = handle.result().unwrap();
        assert_eq!(outcome.finished_at, 0.0);
        executor.shutdown(true);
    }

    #[test]
    fn overflow_work_eventually_drains() {
        let executor = GreenExecutor::new(GreenConfig::new().with_max_workers(1)).unwrap();

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let blocking_job = {
            let release_rx = Arc::clone(&release_rx);
            Box::new(move || {
                release_rx.lock().recv().ok();
                noop_outcome()
            }) as Box<Job>
        };

        let blocking_handle = executor.submit(blocking_job).unwrap();
        // With max_workers == 1, this second submission overflows rather
        // than spawning a second worker.
        let overflowed_handle = executor.submit(Box::new(noop_outcome)).unwrap();

        release_tx.send(()).unwrap();
        assert!(blocking_handle.result().is_some());
        assert!(overflowed_handle.result().is_some());

        executor.shutdown(true);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let executor = GreenExecutor::new(GreenConfig::new()).unwrap();
        executor.shutdown(true);
        let result = executor.submit(Box::new(noop_outcome));
        assert!(matches!(
            result,
            Err(PeriodicError::Shutdown(ShutdownError::ExecutorShutDown))
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(matches!(
            GreenExecutor::new(GreenConfig::new().with_max_workers(0)),
            Err(ConfigError::InvalidExecutor { .. })
        ));
    }
}
