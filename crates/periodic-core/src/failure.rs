//! Captured failure records from a periodic callable's run.

use std::fmt;
use std::sync::Arc;

/// A captured failure from a callable run.
///
/// The *no-retain* run wrapper (used for the process-pool executor, which
/// cannot carry a live error value across a process boundary) only ever
/// populates `rendered`. The *retain* wrapper keeps both the live error and
/// its rendered form.
#[derive(Clone)]
pub struct Failure {
    error: Option<Arc<dyn std::error::Error + Send + Sync>>,
    rendered: String,
}

impl Failure {
    /// Builds a failure that retains the live error value.
    pub fn retaining(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        let rendered = format!("{error}");
        Self {
            error: Some(Arc::new(error)),
            rendered,
        }
    }

    /// Builds a failure that keeps only the rendered string form, as used
    /// by executors that cannot pass live error objects across their
    /// boundary (e.g. the process-pool executor).
    pub fn rendered_only(rendered: impl Into<String>) -> Self {
        Self {
            error: None,
            rendered: rendered.into(),
        }
    }

    /// The live error object, if this failure retained one.
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.error.as_deref()
    }

    /// The rendered (`Display`) form of the error. Always present, even
    /// when the live error object was not retained.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("rendered", &self.rendered)
            .field("retained", &self.error.is_some())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn retaining_keeps_live_error() {
        let failure = Failure::retaining(Boom);
        assert!(failure.error().is_some());
        assert_eq!(failure.rendered(), "boom");
    }

    #[test]
    fn rendered_only_has_no_live_error() {
        let failure = Failure::rendered_only("boom (from subprocess)");
        assert!(failure.error().is_none());
        assert_eq!(failure.rendered(), "boom (from subprocess)");
    }
}
