//! A periodic task engine.
//!
//! This crate provides two tightly coupled pieces:
//!
//! - [`executor`]: a uniform abstraction over submit-and-forget asynchronous
//!   work, producing handles to pending results, with per-executor
//!   statistics and submission-time admission control.
//! - [`worker`]: a driver that owns a set of tagged callables, each with its
//!   own spacing, and decides when each one runs next, dispatching runs
//!   through an executor and maintaining per-callable metrics.
//!
//! ## Modules
//!
//! - [`clock`]: monotonic time source used for scheduling and jitter.
//! - [`error`]: the crate's error types.
//! - [`failure`]: captured failure records from a callable run.
//! - [`metrics`]: per-callable counters and the read-only [`metrics::Watcher`].
//! - [`schedule`]: the min-heap driving "what runs next".
//! - [`strategy`]: next-run-time formulas, with optional jitter.
//! - [`callable`]: registration metadata for a periodic callable.
//! - [`discovery`]: auto-discovery of an object's periodic methods.
//! - [`run_wrapper`]: the two wrappers used to execute a callable inside an
//!   executor (retain vs. no-retain of the live error).

pub mod callable;
pub mod clock;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod failure;
pub mod metrics;
pub mod run_wrapper;
pub mod schedule;
pub mod strategy;
pub mod worker;

pub use callable::Registration;
pub use clock::{Clock, MonotonicClock};
pub use error::{ConfigError, PeriodicError, RejectedSubmission, ShutdownError, ValidationError};
pub use failure::Failure;
pub use metrics::{CallableMetrics, MetricsSnapshot, Watcher};
pub use strategy::Strategy;
pub use worker::{FailureReport, PeriodicWorker, RunKind, WorkerConfig};
