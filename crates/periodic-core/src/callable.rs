//! Registration metadata for a periodic callable.
//!
//! A plain value, [`Registration`], built with the bound closure and
//! handed to [`crate::worker::PeriodicWorker::add`].

use std::sync::Arc;

use crate::error::ConfigError;

/// The callable signature a periodic job must implement: no arguments
/// (any arguments are captured by the closure at registration time),
/// returning `Ok(())` on success or a boxed error on failure.
pub type CallableFn = dyn Fn() -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync;

/// Registration metadata for one periodic callable, plus the callable
/// itself.
///
/// A `Registration` with `enabled: false` is accepted by
/// [`crate::worker::PeriodicWorker::add`] but silently dropped — it never
/// gets a slot, metrics record, or watcher.
#[derive(Clone)]
pub struct Registration {
    pub(crate) name: Arc<str>,
    pub(crate) callable: Arc<CallableFn>,
    pub(crate) enabled: bool,
    pub(crate) spacing: f64,
    pub(crate) run_immediately: bool,
}

impl Registration {
    /// Builds a new registration for `callable`, spaced every `spacing`
    /// seconds. Enabled and not run-immediately by default — use
    /// [`Registration::disabled`] / [`Registration::run_immediately`] to
    /// change that.
    pub fn new(
        name: impl Into<Arc<str>>,
        spacing: f64,
        callable: impl Fn() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            callable: Arc::new(callable),
            enabled: true,
            spacing,
            run_immediately: false,
        }
    }

    /// Marks this registration as disabled: [`PeriodicWorker::add`] will
    /// accept it but register nothing.
    ///
    /// [`PeriodicWorker::add`]: crate::worker::PeriodicWorker::add
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Marks this registration to run once immediately at worker start
    /// (or as soon as it's added to an already-running worker), before its
    /// normal spacing begins.
    #[must_use]
    pub fn run_immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    /// The name this callable was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the registration metadata: `spacing` must be strictly
    /// positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spacing <= 0.0 {
            Err(ConfigError::NonPositiveSpacing {
                spacing: self.spacing,
            })
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("spacing", &self.spacing)
            .field("run_immediately", &self.run_immediately)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_spacing() {
        let reg = Registration::new("job", 0.0, || Ok(()));
        assert!(matches!(
            reg.validate(),
            Err(ConfigError::NonPositiveSpacing { spacing }) if spacing == 0.0
        ));

        let reg = Registration::new("job", -1.0, || Ok(()));
        assert!(reg.validate().is_err());
    }

    #[test]
    fn accepts_positive_spacing() {
        let reg = Registration::new("job", 1.0, || Ok(()));
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn disabled_and_run_immediately_are_independent_flags() {
        let reg = Registration::new("job", 1.0, || Ok(())).run_immediately();
        assert!(reg.enabled);
        assert!(reg.run_immediately);

        let reg = reg.disabled();
        assert!(!reg.enabled);
        assert!(reg.run_immediately);
    }
}
