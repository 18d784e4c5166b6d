//! The process-pool executor.
//!
//! Built from `std::process::Command` re-executing the current binary plus
//! a length-prefixed `bincode` wire protocol. A Rust closure can't be
//! shipped across a process boundary at all, so pooled callables must be
//! registered by name (via [`register_callable`]) at a point both the
//! parent and any re-exec'd worker process will reach.
//!
//! `submit` blocks the calling thread for the request/response round trip
//! (the job it's handed must return a [`RunOutcome`] synchronously, same
//! as every other executor); true cross-process concurrency comes from
//! however many threads end up calling `submit` concurrently, same as it
//! would for any blocking RPC client.

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::callable::CallableFn;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{ConfigError, PeriodicError, ShutdownError};
use crate::failure::Failure;
use crate::run_wrapper::{self, outcome_from_rendered, RunOutcome};

use super::{Executor, ExecutorStats, Handle, Job, OutcomeHandle, RunWrapperKind};

/// Environment variable whose presence tells the current process to run
/// as a process-pool worker rather than continuing normal startup.
pub const WORKER_ENV_VAR: &str = "PERIODIC_PROCESS_WORKER";

type Registry = Mutex<HashMap<String, Arc<CallableFn>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers `callable` under `name` in the process-wide registry both
/// this process and any worker process it spawns consult.
///
/// Call this for every callable a [`ProcessPoolExecutor`] might dispatch
/// to, at a point both normal startup and [`maybe_run_worker`] will reach
/// — typically the first lines of `main`.
pub fn register_callable(name: impl Into<String>, callable: Arc<CallableFn>) {
    registry().lock().insert(name.into(), callable);
}

/// If this process was launched as a process-pool worker, runs the worker
/// loop and exits the process without returning. Otherwise returns
/// immediately. Call at the top of `main`, after every
/// [`register_callable`] call.
pub fn maybe_run_worker() {
    if std::env::var_os(WORKER_ENV_VAR).is_none() {
        return;
    }
    worker_main();
    std::process::exit(0);
}

#[derive(Serialize, Deserialize)]
struct Request {
    id: u64,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct Response {
    id: u64,
    started_at: f64,
    finished_at: f64,
    failure_rendered: Option<String>,
}

fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> std::io::Result<()> {
    let bytes = bincode::serialize(value).expect("frame serialization cannot fail");
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()
}

fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<Option<T>> {
    let mut len_bytes = [0u8; 4];
    if let Err(error) = reader.read_exact(&mut len_bytes) {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(error);
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(
        bincode::deserialize(&buf).expect("frame deserialization cannot fail"),
    ))
}

fn worker_main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();
    let clock = MonotonicClock::new();

    while let Ok(Some(request)) = read_frame::<_, Request>(&mut reader) {
        let callable = registry().lock().get(&request.name).cloned();
        let outcome = match callable {
            Some(callable) => run_wrapper::no_retain(callable.as_ref(), &clock),
            None => RunOutcome {
                started_at: clock.now(),
                finished_at: clock.now(),
                failure: Some(Failure::rendered_only(format!(
                    "no callable registered under {:?} in worker process",
                    request.name
                ))),
            },
        };
        let response = Response {
            id: request.id,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            failure_rendered: outcome.failure.as_ref().map(|f| f.rendered().to_string()),
        };
        if write_frame(&mut writer, &response).is_err() {
            break;
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, mpsc::Sender<Response>>>>;

struct WorkerProcess {
    #[allow(dead_code)]
    child: Child,
    stdin: Mutex<Option<ChildStdin>>,
}

/// Shared dispatch state, held behind an `Arc` so jobs built by
/// [`ProcessPoolExecutor::build_job`] can reach it without needing an
/// `Arc<ProcessPoolExecutor>` (the [`Executor`] trait only gives
/// `build_job` a `&self`), and so the reader threads spawned in
/// [`ProcessPoolExecutor::spawn`] can resolve pending requests without
/// reaching back into the executor itself.
struct Dispatch {
    workers: Vec<WorkerProcess>,
    next_worker: AtomicUsize,
    pending: PendingMap,
    next_request_id: AtomicU64,
}

impl Dispatch {
    fn dispatch(&self, name: &str) -> RunOutcome {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = &self.workers[index];
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(id, tx);

        let request = Request {
            id,
            name: name.to_string(),
        };
        let sent = {
            let mut stdin = worker.stdin.lock();
            match stdin.as_mut() {
                Some(stdin) => write_frame(stdin, &request).is_ok(),
                None => false,
            }
        };
        if !sent {
            self.pending.lock().remove(&id);
            return RunOutcome {
                started_at: 0.0,
                finished_at: 0.0,
                failure: Some(Failure::rendered_only(
                    "process-pool worker's stdin pipe is closed",
                )),
            };
        }

        match rx.recv() {
            Ok(response) => outcome_from_rendered(
                response.started_at,
                response.finished_at,
                response.failure_rendered,
            ),
            Err(_) => RunOutcome {
                started_at: 0.0,
                finished_at: 0.0,
                failure: Some(Failure::rendered_only(
                    "process-pool worker exited before responding",
                )),
            },
        }
    }
}

fn spawn_reader_thread(
    mut reader: BufReader<std::process::ChildStdout>,
    pending: PendingMap,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("periodic-process-pool-reader".to_string())
        .spawn(move || {
            while let Ok(Some(response)) = read_frame::<_, Response>(&mut reader) {
                if let Some(sender) = pending.lock().remove(&response.id) {
                    let _ = sender.send(response);
                }
            }
        })
        .expect("failed to spawn process-pool reader thread")
}

/// Configuration for a [`ProcessPoolExecutor`].
pub struct ProcessPoolConfig {
    pub worker_count: usize,
}

impl ProcessPoolConfig {
    pub fn new() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
        }
    }

    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidExecutor {
                reason: "worker_count must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ProcessPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A pool of re-exec'd worker processes, dispatched to by name. No
/// admission callback is offered.
pub struct ProcessPoolExecutor {
    alive: AtomicBool,
    inner: Arc<Dispatch>,
    reader_threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessPoolExecutor {
    pub fn spawn(config: ProcessPoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let current_exe = std::env::current_exe().map_err(|error| ConfigError::InvalidExecutor {
            reason: format!("could not resolve current executable: {error}"),
        })?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let mut workers = Vec::with_capacity(config.worker_count);
        let mut reader_threads = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            let mut child = Command::new(&current_exe)
                .env(WORKER_ENV_VAR, "1")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|error| ConfigError::InvalidExecutor {
                    reason: format!("failed to spawn process-pool worker: {error}"),
                })?;
            let stdin = child.stdin.take().expect("piped stdin");
            let stdout = child.stdout.take().expect("piped stdout");
            reader_threads.push(spawn_reader_thread(
                BufReader::new(stdout),
                Arc::clone(&pending),
            ));
            workers.push(WorkerProcess {
                child,
                stdin: Mutex::new(Some(stdin)),
            });
        }

        let inner = Arc::new(Dispatch {
            workers,
            next_worker: AtomicUsize::new(0),
            pending,
            next_request_id: AtomicU64::new(0),
        });

        Ok(Self {
            alive: AtomicBool::new(true),
            inner,
            reader_threads: Mutex::new(reader_threads),
        })
    }
}

impl Executor for ProcessPoolExecutor {
    const RUN_WRAPPER: RunWrapperKind = RunWrapperKind::NoRetain;

    fn build_job(&self, name: Arc<str>, _callable: Arc<CallableFn>, _clock: Arc<dyn Clock>) -> Box<Job> {
        // `_callable` never runs in this process; the worker process
        // resolves `name` through its own registry instead.
        let inner = Arc::clone(&self.inner);
        Box::new(move || inner.dispatch(&name))
    }

    fn submit(&self, job: Box<Job>) -> Result<Arc<dyn Handle>, PeriodicError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(ShutdownError::ExecutorShutDown.into());
        }
        let handle = OutcomeHandle::pending();
        let outcome = job();
        handle.complete(Some(outcome));
        Ok(handle as Arc<dyn Handle>)
    }

    fn shutdown(&self, wait: bool) {
        self.alive.store(false, Ordering::Release);
        for worker in &self.inner.workers {
            // Dropping the `ChildStdin` itself (not just its `MutexGuard`)
            // closes the pipe, so the worker process sees EOF on its
            // stdin, exits, and closes its stdout in turn.
            worker.stdin.lock().take();
        }
        if wait {
            for thread in self.reader_threads.lock().drain(..) {
                let _ = thread.join();
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

    #[test]
    fn frame_round_trips_through_serialization() {
        let mut buffer = Vec::new();
        let request = Request {
            id: 7,
            name: "sweep".to_string(),
        };
        write_frame(&mut buffer, &request).unwrap();
        let mut cursor = std::io::Cursor::new(buffer);
        let decoded: Request = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.name, "sweep");
    }

    #[test]
    fn read_frame_returns_none_on_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let decoded: Option<Request> = read_frame(&mut cursor).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn registry_round_trips_by_name() {
        register_callable("process_pool_test_echo", Arc::new(|| Ok(())));
        assert!(registry().lock().contains_key("process_pool_test_echo"));
    }
}
