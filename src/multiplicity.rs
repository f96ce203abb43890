//! Multiplicity (lifetime) policies.

use std::fmt;

/// Multiplicity policy controlling how many live instances a node has
///
/// Every component node declares one. The policy decides whether an acquire
/// reuses a live instance or builds a new one, and when an instance with no
/// outstanding locks is disposed.
///
/// # Policy Characteristics
///
/// - **Singleton**: one instance for the container lifetime, pinned until
///   container teardown or self disposal
/// - **PerResolve**: a new instance per resolve, disposed when its lock is released
/// - **PerScope**: one instance per scope instance, disposed when its last lock
///   is released or after its scope ended and its last lock is released
///
/// # Examples
///
/// ```rust
/// use indirectx::MultiplicityConfig;
///
/// assert!(MultiplicityConfig::Singleton.is_shared());
/// assert!(MultiplicityConfig::PerScope.is_shared());
/// assert!(!MultiplicityConfig::PerResolve.is_shared());
/// assert!(MultiplicityConfig::PerScope.requires_scope());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiplicityConfig {
    /// Single instance per container, created lazily on first resolve
    ///
    /// Concurrent first resolves wait for the one creation in flight and
    /// share its result. The instance is never disposed while the container
    /// is active.
    Singleton,
    /// New instance per resolve call
    ///
    /// Each lock owns its own instance; releasing it disposes the instance.
    PerResolve,
    /// Single instance per enclosing scope instance
    ///
    /// Resolves through the same scope share the live instance. Once its
    /// lock count reaches zero it is disposed and the next resolve builds a
    /// fresh one.
    PerScope,
}

impl MultiplicityConfig {
    /// True when resolves may share a live instance.
    pub fn is_shared(self) -> bool {
        !matches!(self, MultiplicityConfig::PerResolve)
    }

    /// True when the node needs an enclosing scope boundary.
    pub fn requires_scope(self) -> bool {
        matches!(self, MultiplicityConfig::PerScope)
    }

    /// Singletons stay alive without outstanding locks.
    pub(crate) fn pins(self) -> bool {
        matches!(self, MultiplicityConfig::Singleton)
    }
}

impl fmt::Display for MultiplicityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MultiplicityConfig::Singleton => "singleton",
            MultiplicityConfig::PerResolve => "per-resolve",
            MultiplicityConfig::PerScope => "per-scope",
        };
        f.write_str(name)
    }
}
