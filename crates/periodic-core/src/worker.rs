//! The periodic worker: owns a set of tagged callables and dispatches each
//! one through an [`Executor`] on its own cadence.
//!
//! `submit` is always called with the worker's own state lock released,
//! since `parking_lot::Mutex` is not reentrant and a synchronous executor
//! completes inline on the submitting thread. The completion path
//! re-acquires the lock fresh instead — simpler than threading completion
//! events through a side channel, and sufficient since the lock is never
//! held across a user callable or an executor call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::callable::{CallableFn, Registration};
use crate::clock::{Clock, MonotonicClock};
use crate::discovery::PeriodicSource;
use crate::error::{ConfigError, PeriodicError, ShutdownError};
use crate::executor::{Executor, ExecutorStats, Handle};
use crate::failure::Failure;
use crate::metrics::{CallableMetrics, Watcher};
use crate::schedule::ScheduleHeap;
use crate::strategy::{JitterSource, RunTimestamps, Strategy, ThreadRngJitter};

/// Safety-net wakeup interval: the dispatch loop never sleeps longer than
/// this, so a missed notification or non-monotonic clock can never wedge
/// it indefinitely.
const MAX_LOOP_IDLE: f64 = 30.0;

/// Which phase produced a run, passed through to [`FailureReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Ran once at worker start (or on `add()` to an already-running
    /// worker) ahead of its normal spacing, because it was registered with
    /// [`Registration::run_immediately`].
    Immediate,
    /// Ran on its normal, strategy-computed cadence.
    Periodic,
}

/// Bundles the context handed to the failure-reporting hook.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub name: Arc<str>,
    pub kind: RunKind,
    pub spacing: f64,
    pub failure: Failure,
}

fn default_on_failure(report: &FailureReport) {
    tracing::error!(
        callable = %report.name,
        kind = ?report.kind,
        spacing = report.spacing,
        failure = %report.failure,
        "periodic callable failed"
    );
}

/// Configuration for a [`PeriodicWorker`].
///
/// `E` is fixed here (not just at `PeriodicWorker::new`) because the
/// executor factory needs a concrete return type.
pub struct WorkerConfig<E> {
    executor_factory: Arc<dyn Fn() -> E + Send + Sync>,
    strategy: Strategy,
    jitter: Arc<dyn JitterSource>,
    clock: Arc<dyn Clock>,
    on_failure: Arc<dyn Fn(&FailureReport) + Send + Sync>,
}

impl<E: Executor> WorkerConfig<E> {
    /// Builds a config with the `last_started` strategy, a thread-local RNG
    /// jitter source, a real monotonic clock, and a default failure hook
    /// that logs at error level.
    pub fn new(executor_factory: impl Fn() -> E + Send + Sync + 'static) -> Result<Self, ConfigError> {
        Ok(Self {
            executor_factory: Arc::new(executor_factory),
            strategy: Strategy::by_name("last_started")?,
            jitter: Arc::new(ThreadRngJitter),
            clock: Arc::new(MonotonicClock::new()),
            on_failure: Arc::new(default_on_failure),
        })
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_on_failure(mut self, on_failure: Arc<dyn Fn(&FailureReport) + Send + Sync>) -> Self {
        self.on_failure = on_failure;
        self
    }
}

struct Slot {
    name: Arc<str>,
    callable: Arc<CallableFn>,
    spacing: f64,
    run_immediately: bool,
    metrics: Arc<CallableMetrics>,
}

struct State {
    tombstone: bool,
    active: bool,
    dead: bool,
    schedule: ScheduleHeap,
    immediates: VecDeque<usize>,
    slots: Vec<Arc<Slot>>,
    watchers: Vec<Watcher>,
}

enum ScheduledOutcome {
    Stop,
    YieldToImmediate,
    Submitted,
}

/// Owns a set of tagged callables and drives each one's cadence through an
/// executor.
///
/// `start()` blocks the calling thread running the dispatch loop until
/// `stop()` is called from elsewhere (typically another thread, or a
/// completion/failure hook) — callers usually run `start()` on a
/// dedicated background thread.
pub struct PeriodicWorker<E: Executor> {
    state: Mutex<State>,
    waiter: Condvar,
    clock: Arc<dyn Clock>,
    strategy: Strategy,
    jitter: Arc<dyn JitterSource>,
    on_failure: Arc<dyn Fn(&FailureReport) + Send + Sync>,
    executor_factory: Arc<dyn Fn() -> E + Send + Sync>,
    executor: Mutex<Option<Arc<E>>>,
}

impl<E: Executor + 'static> PeriodicWorker<E> {
    /// Builds a worker from `registrations` plus `config`. Disabled
    /// registrations are silently dropped. Fails with
    /// [`ConfigError::NonPositiveSpacing`] if any enabled registration has
    /// non-positive spacing.
    pub fn new(registrations: Vec<Registration>, config: WorkerConfig<E>) -> Result<Self, PeriodicError> {
        let now = config.clock.now();
        let mut slots = Vec::new();
        let mut watchers = Vec::new();
        let mut schedule = ScheduleHeap::new();
        let mut immediates = VecDeque::new();

        for registration in registrations {
            if !registration.enabled {
                continue;
            }
            registration.validate()?;
            let index = slots.len();
            let metrics = CallableMetrics::new();
            watchers.push(Watcher::new(Arc::clone(&registration.name), Arc::clone(&metrics)));
            if registration.run_immediately {
                immediates.push_back(index);
            } else {
                let next_run = config.strategy.initial_run(now, registration.spacing, config.jitter.as_ref());
                schedule.push(next_run, index);
            }
            slots.push(Arc::new(Slot {
                name: registration.name,
                callable: registration.callable,
                spacing: registration.spacing,
                run_immediately: registration.run_immediately,
                metrics,
            }));
        }

        Ok(Self {
            state: Mutex::new(State {
                tombstone: false,
                active: false,
                dead: true,
                schedule,
                immediates,
                slots,
                watchers,
            }),
            waiter: Condvar::new(),
            clock: config.clock,
            strategy: config.strategy,
            jitter: config.jitter,
            on_failure: config.on_failure,
            executor_factory: config.executor_factory,
            executor: Mutex::new(None),
        })
    }

    /// Builds a worker from every periodic method `source` discovers, via
    /// [`PeriodicSource::periodic_methods`].
    pub fn from_source<S: PeriodicSource>(source: Arc<S>, config: WorkerConfig<E>) -> Result<Self, PeriodicError> {
        Self::new(source.periodic_methods(), config)
    }

    /// The number of enabled, registered callables.
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// True iff no callables are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live, read-only views over every registered callable's metrics, in
    /// insertion order.
    pub fn iter_watchers(&self) -> Vec<Watcher> {
        self.state.lock().watchers.clone()
    }

    /// A snapshot of the current executor's statistics, or `None` if the
    /// worker has never been started.
    pub fn executor_statistics(&self) -> Option<ExecutorStats> {
        self.executor.lock().as_ref().map(|executor| executor.statistics())
    }

    /// Registers a new callable while the worker may already be running.
    ///
    /// Returns `Ok(None)` if `registration` is disabled (matching
    /// [`PeriodicWorker::new`]'s silent drop). Notifies the dispatch loop
    /// so a sleeping worker wakes promptly if the new callable's deadline
    /// is sooner than whatever it was waiting on.
    pub fn add(&self, registration: Registration) -> Result<Option<Watcher>, PeriodicError> {
        if !registration.enabled {
            return Ok(None);
        }
        registration.validate()?;

        let now = self.clock.now();
        let mut state = self.state.lock();
        let index = state.slots.len();
        let metrics = CallableMetrics::new();
        let watcher = Watcher::new(Arc::clone(&registration.name), Arc::clone(&metrics));
        state.watchers.push(watcher.clone());

        if registration.run_immediately {
            state.immediates.push_back(index);
        } else {
            let next_run = self.strategy.initial_run(now, registration.spacing, self.jitter.as_ref());
            state.schedule.push(next_run, index);
        }

        state.slots.push(Arc::new(Slot {
            name: registration.name,
            callable: registration.callable,
            spacing: registration.spacing,
            run_immediately: registration.run_immediately,
            metrics,
        }));

        self.waiter.notify_all();
        Ok(Some(watcher))
    }

    /// Starts the dispatch loop, blocking the calling thread until `stop()`
    /// is called. Fails with [`ShutdownError::EmptyCallableSet`] if there
    /// are no registered callables and `allow_empty` is false, with
    /// [`ShutdownError::AlreadyActive`] on a double-start, and with
    /// [`ShutdownError::StoppedWithoutReset`] if `stop()` was called and
    /// `reset()` has not been called since.
    pub fn start(self: &Arc<Self>, allow_empty: bool) -> Result<(), PeriodicError> {
        {
            let mut state = self.state.lock();
            if state.active {
                return Err(ShutdownError::AlreadyActive.into());
            }
            if state.tombstone {
                return Err(ShutdownError::StoppedWithoutReset.into());
            }
            if state.slots.is_empty() && !allow_empty {
                return Err(ShutdownError::EmptyCallableSet.into());
            }
            state.dead = false;
            state.active = true;
        }

        let executor = Arc::new((self.executor_factory)());
        *self.executor.lock() = Some(Arc::clone(&executor));

        self.run(&executor);

        executor.shutdown(true);
        {
            let mut state = self.state.lock();
            state.dead = true;
            state.active = false;
        }
        self.waiter.notify_all();
        self.emit_shutdown_summary();
        Ok(())
    }

    /// Sets the tombstone, waking the dispatch loop so it exits at the next
    /// opportunity. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.tombstone = true;
        self.waiter.notify_all();
    }

    /// Clears the tombstone and dead-run metrics, and rebuilds the schedule
    /// and immediates queue from the registered callables, exactly as they
    /// were built at construction. The caller must ensure the worker is
    /// stopped (not active) first.
    pub fn reset(&self) -> Result<(), PeriodicError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.active {
            return Err(ShutdownError::AlreadyActive.into());
        }
        state.tombstone = false;
        state.dead = true;

        for slot in &state.slots {
            slot.metrics.reset();
        }

        let mut schedule = ScheduleHeap::new();
        let mut immediates = VecDeque::new();
        for (index, slot) in state.slots.iter().enumerate() {
            if slot.run_immediately {
                immediates.push_back(index);
            } else {
                let next_run = self.strategy.initial_run(now, slot.spacing, self.jitter.as_ref());
                schedule.push(next_run, index);
            }
        }
        state.schedule = schedule;
        state.immediates = immediates;
        Ok(())
    }

    /// Blocks until the worker has fully exited `start()`, or `timeout`
    /// elapses. Returns whether the worker is in fact dead.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while !state.dead {
                    self.waiter.wait(&mut state);
                }
            }
            Some(timeout) => {
                let deadline = std::time::Instant::now() + timeout;
                while !state.dead {
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    self.waiter.wait_for(&mut state, remaining);
                }
            }
        }
        state.dead
    }

    fn run(self: &Arc<Self>, executor: &Arc<E>) {
        loop {
            if self.state.lock().tombstone {
                return;
            }
            self.process_immediates(executor);
            match self.process_scheduled(executor) {
                ScheduledOutcome::Stop => return,
                ScheduledOutcome::YieldToImmediate | ScheduledOutcome::Submitted => continue,
            }
        }
    }

    fn process_immediates(self: &Arc<Self>, executor: &Arc<E>) {
        let slot = {
            let mut state = self.state.lock();
            state.immediates.pop_front().map(|index| (index, Arc::clone(&state.slots[index])))
        };
        if let Some((index, slot)) = slot {
            let submitted_at = self.clock.now();
            tracing::debug!(callable = %slot.name, "submitting immediate periodic callable");
            self.dispatch(executor, slot, index, RunKind::Immediate, submitted_at);
        }
    }

    fn process_scheduled(self: &Arc<Self>, executor: &Arc<E>) -> ScheduledOutcome {
        loop {
            let mut state = self.state.lock();
            loop {
                if state.tombstone {
                    return ScheduledOutcome::Stop;
                }
                if !state.immediates.is_empty() {
                    return ScheduledOutcome::YieldToImmediate;
                }
                if !state.schedule.is_empty() {
                    break;
                }
                self.waiter.wait_for(&mut state, Duration::from_secs_f64(MAX_LOOP_IDLE));
            }

            let submitted_at = self.clock.now();
            let (next_run, index) = state.schedule.pop().expect("checked non-empty above");
            let when_next = next_run - submitted_at;
            if when_next <= 0.0 {
                let slot = Arc::clone(&state.slots[index]);
                drop(state);
                tracing::debug!(callable = %slot.name, "submitting periodic callable");
                self.dispatch(executor, slot, index, RunKind::Periodic, submitted_at);
                return ScheduledOutcome::Submitted;
            }

            state.schedule.push(next_run, index);
            let wait_for = when_next.min(MAX_LOOP_IDLE);
            self.waiter.wait_for(&mut state, Duration::from_secs_f64(wait_for.max(0.0)));
        }
    }

    fn dispatch(self: &Arc<Self>, executor: &Arc<E>, slot: Arc<Slot>, index: usize, kind: RunKind, submitted_at: f64) {
        let job = executor.build_job(Arc::clone(&slot.name), Arc::clone(&slot.callable), Arc::clone(&self.clock));
        let handle = match executor.submit(job) {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(callable = %slot.name, %error, "failed to submit periodic callable; rescheduling at its normal spacing");
                self.requeue_after_submit_failure(&slot, index, submitted_at);
                return;
            }
        };

        let worker = Arc::clone(self);
        handle.add_done_callback(Box::new(move |handle| {
            worker.on_completion(index, kind, submitted_at, handle);
        }));
    }

    fn requeue_after_submit_failure(&self, slot: &Slot, index: usize, submitted_at: f64) {
        let next_run = submitted_at + slot.spacing;
        let mut state = self.state.lock();
        state.schedule.push(next_run, index);
        drop(state);
        self.waiter.notify_all();
    }

    fn on_completion(self: &Arc<Self>, index: usize, kind: RunKind, submitted_at: f64, handle: &dyn Handle) {
        let slot = {
            let state = self.state.lock();
            Arc::clone(&state.slots[index])
        };

        let Some(outcome) = handle.result() else {
            // Cancelled: individual runs cannot be cancelled by this
            // worker, but a foreign executor might still surface one.
            // Reschedule at the normal cadence without touching metrics.
            tracing::warn!(callable = %slot.name, "periodic run was cancelled; rescheduling without recording metrics");
            self.requeue_after_submit_failure(&slot, index, submitted_at);
            return;
        };

        let success = outcome.failure.is_none();
        let elapsed = (outcome.finished_at - outcome.started_at).max(0.0);
        let elapsed_waiting = (outcome.started_at - submitted_at).max(0.0);
        slot.metrics.record_run(success, elapsed, elapsed_waiting);

        if let Some(failure) = &outcome.failure {
            (self.on_failure)(&FailureReport {
                name: Arc::clone(&slot.name),
                kind,
                spacing: slot.spacing,
                failure: failure.clone(),
            });
        }

        let timestamps = RunTimestamps {
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
        };
        let next_run = self.strategy.next_run(timestamps, slot.spacing, self.jitter.as_ref());

        let mut state = self.state.lock();
        state.schedule.push(next_run, index);
        drop(state);
        self.waiter.notify_all();
    }

    fn emit_shutdown_summary(&self) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let state = self.state.lock();
        for (index, slot) in state.slots.iter().enumerate() {
            let snapshot = slot.metrics.snapshot();
            tracing::debug!(
                index,
                callable = %slot.name,
                spacing = slot.spacing,
                runs = snapshot.runs,
                successes = snapshot.successes,
                failures = snapshot.failures,
                average_elapsed = if snapshot.runs > 0 { snapshot.elapsed() / snapshot.runs as f64 } else { 0.0 },
                average_elapsed_waiting = if snapshot.runs > 0 { snapshot.elapsed_waiting() / snapshot.runs as f64 } else { 0.0 },
                "stopped running periodic callable"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::executor::sync::SyncExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn config_with_clock(clock: Arc<dyn Clock>) -> WorkerConfig<SyncExecutor> {
        WorkerConfig::new(SyncExecutor::new).unwrap().with_clock(clock)
    }

    #[test]
    fn last_finished_deadline_matches_scripted_scenario() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new([0.0, 2.0, 2.0, 3.0]));
        let config = config_with_clock(Arc::clone(&clock)).with_strategy(Strategy::by_name("last_finished").unwrap());
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_for_cb = Arc::clone(&runs);
        let registration = Registration::new("sweep", 2.0, move || {
            runs_for_cb.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        let worker = Arc::new(PeriodicWorker::new(vec![registration], config).unwrap());
        // Run one scheduled cycle directly through the internal helpers
        // rather than the blocking start() loop, to keep the scripted
        // clock deterministic.
        let executor = Arc::new(SyncExecutor::new());
        worker.process_scheduled(&executor);
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        let state = worker.state.lock();
        let (next_run, index) = state.schedule.peek().unwrap();
        assert_eq!(index, 0);
        assert!((next_run - 5.0).abs() < 1e-9);
    }

    #[test]
    fn last_started_deadline_matches_scripted_scenario() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new([0.0, 2.0, 2.0, 3.0]));
        let config = config_with_clock(Arc::clone(&clock)).with_strategy(Strategy::by_name("last_started").unwrap());
        let registration = Registration::new("sweep", 2.0, || Ok(()));
        let worker = Arc::new(PeriodicWorker::new(vec![registration], config).unwrap());
        let executor = Arc::new(SyncExecutor::new());
        worker.process_scheduled(&executor);

        let state = worker.state.lock();
        let (next_run, _) = state.schedule.peek().unwrap();
        assert!((next_run - 4.0).abs() < 1e-9);
    }

    #[test]
    fn aligned_last_finished_deadline_matches_scripted_scenario() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new([0.0, 2.0, 2.0, 5.0]));
        let config =
            config_with_clock(Arc::clone(&clock)).with_strategy(Strategy::by_name("aligned_last_finished").unwrap());
        let registration = Registration::new("sweep", 2.0, || Ok(()));
        let worker = Arc::new(PeriodicWorker::new(vec![registration], config).unwrap());
        let executor = Arc::new(SyncExecutor::new());
        worker.process_scheduled(&executor);

        let state = worker.state.lock();
        let (next_run, _) = state.schedule.peek().unwrap();
        assert!((next_run - 6.0).abs() < 1e-9);
    }

    #[test]
    fn double_start_is_rejected() {
        let registration = Registration::new("sweep", 0.01, || Ok(()));
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = Arc::new(PeriodicWorker::new(vec![registration], config).unwrap());

        worker.state.lock().active = true;
        let result = worker.start(false);
        assert!(matches!(
            result,
            Err(PeriodicError::Shutdown(ShutdownError::AlreadyActive))
        ));
    }

    #[test]
    fn disabled_registration_leaves_worker_empty() {
        let registration = Registration::new("sweep", 1.0, || Ok(())).disabled();
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = PeriodicWorker::new(vec![registration], config).unwrap();
        assert!(worker.is_empty());
        assert_eq!(worker.len(), 0);
    }

    #[test]
    fn start_without_callables_requires_allow_empty() {
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = Arc::new(PeriodicWorker::<SyncExecutor>::new(Vec::new(), config).unwrap());
        let result = worker.start(false);
        assert!(matches!(
            result,
            Err(PeriodicError::Shutdown(ShutdownError::EmptyCallableSet))
        ));
    }

    #[test]
    fn immediate_add_after_start_runs_quickly() {
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = Arc::new(PeriodicWorker::<SyncExecutor>::new(Vec::new(), config).unwrap());

        let ran = Arc::new(StdMutex::new(false));
        let ran_for_cb = Arc::clone(&ran);
        let worker_for_thread = Arc::clone(&worker);
        let handle = std::thread::spawn(move || {
            worker_for_thread.start(true).unwrap();
        });

        let registration = Registration::new("fast", 0.1, move || {
            *ran_for_cb.lock().unwrap() = true;
            Ok(())
        })
        .run_immediately();
        worker.add(registration).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !*ran.lock().unwrap() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(*ran.lock().unwrap());

        worker.stop();
        handle.join().unwrap();
    }

    #[test]
    fn reset_zeroes_metrics_observed_through_watcher() {
        let registration = Registration::new("sweep", 0.01, || Ok(()));
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = Arc::new(PeriodicWorker::new(vec![registration], config).unwrap());
        let watcher = worker.iter_watchers().into_iter().next().unwrap();

        {
            let state = worker.state.lock();
            state.slots[0].metrics.record_run(true, 1.0, 0.0);
        }
        assert_eq!(watcher.snapshot().runs, 1);

        worker.reset().unwrap();
        assert_eq!(watcher.snapshot().runs, 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let config = WorkerConfig::new(SyncExecutor::new).unwrap();
        let worker = Arc::new(PeriodicWorker::<SyncExecutor>::new(Vec::new(), config).unwrap());
        worker.stop();
        worker.stop();
        assert!(worker.state.lock().tombstone);
    }
}
