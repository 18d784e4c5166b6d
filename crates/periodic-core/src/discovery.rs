//! Auto-discovery of an object's periodic methods.
//!
//! A type that wants its periodic methods auto-discovered implements
//! [`PeriodicSource`] and enumerates them itself.
//!
//! Enumeration order is implementation-defined (it's just whatever order
//! `periodic_methods` builds its `Vec` in); callers must not depend on
//! it.

use std::sync::Arc;

use crate::callable::Registration;

/// A type whose periodic methods can be auto-discovered and registered
/// with a [`crate::worker::PeriodicWorker`] in one call.
///
/// Implementors typically wrap `self` in an `Arc` and build one
/// [`Registration`] per periodic method, each closure capturing a clone of
/// that `Arc`.
pub trait PeriodicSource {
    /// Returns one [`Registration`] per periodic method this source wants
    /// auto-discovered. Discovered callables carry no pre-bound
    /// positional/keyword arguments beyond what the implementor's closures
    /// capture.
    fn periodic_methods(self: Arc<Self>) -> Vec<Registration>;
}
