//! Diagnostic observers for container events.
//!
//! Observers receive instance creation, disposal and failure events. The
//! container always logs the same events through `tracing`; observers are
//! for callers that want to react to them programmatically.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{DisposeError, ResolveError};
use crate::identifier::Identifier;
use crate::multiplicity::MultiplicityConfig;

/// Observer trait for container events.
///
/// All methods default to no-ops. Calls are made synchronously from the
/// resolving or disposing task, so implementations should stay cheap.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, ContainerObserver, Identifier, MultiplicityConfig};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct CreationCounter(AtomicUsize);
///
/// impl ContainerObserver for CreationCounter {
///     fn instance_created(&self, _: &Identifier, _: MultiplicityConfig, _: Duration) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let config = ContainerConfig::new().add_observer(Arc::new(CreationCounter::default()));
/// ```
pub trait ContainerObserver: Send + Sync {
    /// A builder produced a new instance.
    fn instance_created(&self, identifier: &Identifier, multiplicity: MultiplicityConfig, duration: Duration) {
        let _ = (identifier, multiplicity, duration);
    }

    /// An instance finished its teardown and released its dependencies.
    fn instance_disposed(&self, identifier: &Identifier, multiplicity: MultiplicityConfig) {
        let _ = (identifier, multiplicity);
    }

    /// A resolve failed.
    fn resolve_failed(&self, identifier: &Identifier, error: &ResolveError) {
        let _ = (identifier, error);
    }

    /// A disposal step failed. The disposal still completed.
    fn disposal_failed(&self, identifier: &Identifier, error: &DisposeError) {
        let _ = (identifier, error);
    }
}

/// Collection of observers attached to a container.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ContainerObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ContainerObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn instance_created(&self, identifier: &Identifier, multiplicity: MultiplicityConfig, duration: Duration) {
        for observer in &self.observers {
            observer.instance_created(identifier, multiplicity, duration);
        }
    }

    #[inline]
    pub(crate) fn instance_disposed(&self, identifier: &Identifier, multiplicity: MultiplicityConfig) {
        for observer in &self.observers {
            observer.instance_disposed(identifier, multiplicity);
        }
    }

    #[inline]
    pub(crate) fn resolve_failed(&self, identifier: &Identifier, error: &ResolveError) {
        for observer in &self.observers {
            observer.resolve_failed(identifier, error);
        }
    }

    #[inline]
    pub(crate) fn disposal_failed(&self, identifier: &Identifier, error: &DisposeError) {
        for observer in &self.observers {
            observer.disposal_failed(identifier, error);
        }
    }
}

/// Observer forwarding every event to `tracing` at debug level.
///
/// Failures are logged at `warn`. The container already logs lifecycle
/// events at trace level; attach this to see them without lowering the
/// crate's filter.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    prefix: String,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "indirectx".to_string(),
        }
    }

    /// Observer tagging every event with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerObserver for TracingObserver {
    fn instance_created(&self, identifier: &Identifier, multiplicity: MultiplicityConfig, duration: Duration) {
        tracing::debug!(prefix = %self.prefix, %identifier, %multiplicity, ?duration, "instance created");
    }

    fn instance_disposed(&self, identifier: &Identifier, multiplicity: MultiplicityConfig) {
        tracing::debug!(prefix = %self.prefix, %identifier, %multiplicity, "instance disposed");
    }

    fn resolve_failed(&self, identifier: &Identifier, error: &ResolveError) {
        tracing::warn!(prefix = %self.prefix, %identifier, %error, "resolve failed");
    }

    fn disposal_failed(&self, identifier: &Identifier, error: &DisposeError) {
        tracing::warn!(prefix = %self.prefix, %identifier, %error, "disposal failed");
    }
}
