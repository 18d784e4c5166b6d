//! Error types for the periodic task engine.
//!
//! Each failure domain gets its own `thiserror` enum, mirroring the rest of
//! this crate's `*Config`/`*Stats` per-concern grouping. [`PeriodicError`]
//! is the umbrella used where a caller needs to match across domains.

use thiserror::Error;

/// Raised at construction time: bad spacing, an unknown strategy name,
/// jitter outside `[0, 1]`, or an invalid executor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A callable's spacing was zero or negative.
    #[error("spacing must be a positive number of seconds, got {spacing}")]
    NonPositiveSpacing {
        /// The offending spacing value, in seconds.
        spacing: f64,
    },
    /// A strategy name was requested that isn't registered.
    #[error("unknown next-run strategy {name:?}")]
    UnknownStrategy {
        /// The requested, unrecognized strategy name.
        name: String,
    },
    /// A jitter fraction fell outside `[0, 1]`.
    #[error("jitter fraction must be within [0, 1], got {fraction}")]
    InvalidJitter {
        /// The offending jitter fraction.
        fraction: f64,
    },
    /// An executor was configured with a nonsensical size (e.g. 0 workers).
    #[error("invalid executor configuration: {reason}")]
    InvalidExecutor {
        /// Human-readable description of what was wrong.
        reason: String,
    },
}

/// Raised at registration time: missing decoration metadata, or a
/// non-callable argument passed where a callable was required.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The value passed to `add`/auto-discovery didn't carry the full
    /// `{enabled, spacing, run_immediately}` metadata triple.
    #[error("{what} is missing required periodic metadata")]
    MissingMetadata {
        /// What was being registered (a name or short description).
        what: String,
    },
}

/// Raised when submitting to a shut-down executor, or starting a worker
/// that was stopped without being reset.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// `submit` was called after `shutdown`.
    #[error("executor has been shut down")]
    ExecutorShutDown,
    /// `start` was called while the worker was already active.
    #[error("worker is already running")]
    AlreadyActive,
    /// `start` was called after `stop` without an intervening `reset`.
    #[error("worker was stopped; call reset() before starting again")]
    StoppedWithoutReset,
    /// `start` was called with no registered callables and `allow_empty` was
    /// false.
    #[error("worker has no registered callables; pass allow_empty=true to start anyway")]
    EmptyCallableSet,
}

/// Raised when an admission hook declines a submission. Recoverable by the
/// caller — typically by retrying later or shedding the work.
#[derive(Debug, Error)]
#[error("submission rejected: {reason}")]
pub struct RejectedSubmission {
    /// Human-readable reason the admission hook gave for rejecting.
    pub reason: String,
}

/// Umbrella error type for callers that need to match across domains (for
/// example, a `PeriodicWorker::add` call that can fail with either a
/// [`ValidationError`] or a [`ConfigError`]).
#[derive(Debug, Error)]
pub enum PeriodicError {
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`ShutdownError`].
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// See [`RejectedSubmission`].
    #[error(transparent)]
    Rejected(#[from] RejectedSubmission),
}
