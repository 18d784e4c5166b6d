//! A bounded worker pool of OS threads.
//!
//! A `crossbeam_channel::bounded` queue fed to a fixed set of
//! `thread::Builder`-spawned workers, with a re-entrant lock serializing
//! the shutdown check, the admission callback, and the enqueue so a
//! concurrent `shutdown` can never interleave between admission and
//! enqueue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{ConfigError, PeriodicError, RejectedSubmission, ShutdownError};

use super::{Executor, ExecutorStats, Handle, Job, OutcomeHandle, RunWrapperKind};

/// An admission hook given the current backlog depth (queued-but-not-yet-started
/// jobs), which may decline a submission.
pub type AdmissionHook = dyn Fn(usize) -> Result<(), RejectedSubmission> + Send + Sync;

/// Configuration for a [`ThreadPoolExecutor`].
pub struct ThreadPoolConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub admission: Option<Arc<AdmissionHook>>,
}

impl ThreadPoolConfig {
    pub fn new() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            queue_capacity: 4096,
            admission: None,
        }
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
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

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

type QueueItem = (Box<Job>, Arc<OutcomeHandle>);

pub struct ThreadPoolExecutor {
    alive: AtomicBool,
    sender: Mutex<Option<Sender<QueueItem>>>,
    shutdown_lock: ReentrantMutex<()>,
    admission: Option<Arc<AdmissionHook>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity);
        let workers = (0..config.max_workers)
            .map(|index| spawn_worker(index, receiver.clone()))
            .collect();

        Ok(Self {
            alive: AtomicBool::new(true),
            sender: Mutex::new(Some(sender)),
            shutdown_lock: ReentrantMutex::new(()),
            admission: config.admission,
            workers: Mutex::new(workers),
        })
    }
}

fn spawn_worker(index: usize, receiver: Receiver<QueueItem>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("periodic-worker-{index}"))
        .spawn(move || {
            while let Ok((job, handle)) = receiver.recv() {
                let outcome = job();
                handle.complete(Some(outcome));
            }
        })
        .expect("failed to spawn thread-pool worker")
}

impl Executor for ThreadPoolExecutor {
    const RUN_WRAPPER: RunWrapperKind = RunWrapperKind::Retain;

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        let _guard = self.shutdown_lock.lock();
        if !self.alive.load(Ordering::Acquire) {
            return Err(ShutdownError::ExecutorShutDown.into());
        }
        let sender_slot = self.sender.lock();
        let sender = sender_slot.as_ref().expect("sender present while alive");
        if let Some(admission) = &self.admission {
            admission(sender.len())?;
        }
        let handle = OutcomeHandle::pending();
        sender
            .send((job, Arc::clone(&handle)))
            .expect("worker threads outlive the executor while alive");
        Ok(handle as Arc<dyn Handle>)
    }

    fn shutdown(&self, wait: bool) {
        let _guard = self.shutdown_lock.lock();
        self.alive.store(false, Ordering::Release);
        // Dropping every sender closes the channel once drained, letting
        // workers exit their `recv` loop after finishing queued work.
        self.sender.lock().take();
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
