//! Error types for the component container.

use std::fmt;

use thiserror::Error;

use crate::identifier::Identifier;

/// Boxed error returned by builders and teardown hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Build-time configuration errors
///
/// Raised only by [`ContainerConfig::build`](crate::ContainerConfig::build).
/// A configuration error is fatal: no container exists afterwards, so no
/// resolve is possible.
///
/// # Examples
///
/// ```rust
/// use indirectx::{ConfigurationError, Identifier};
///
/// let err = ConfigurationError::DuplicateIdentifier {
///     identifier: Identifier::of::<u32>(),
///     parent: "<root>".to_string(),
/// };
/// assert_eq!(err.to_string(), "duplicate identifier u32 under <root>");
/// ```
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// A component node was declared with the reserved empty identifier
    #[error("component node under {parent} has an empty identifier")]
    EmptyIdentifier { parent: String },

    /// Two siblings share an identifier
    #[error("duplicate identifier {identifier} under {parent}")]
    DuplicateIdentifier { identifier: Identifier, parent: String },

    /// Two scope boundaries with the same name under the same enclosing boundary
    #[error("duplicate scope boundary `{name}` under {parent}")]
    DuplicateScope { name: String, parent: String },

    /// The builder produces a type other than the declared contract
    #[error("builder for {identifier} produces {produced}")]
    ContractMismatch {
        identifier: Identifier,
        produced: &'static str,
    },

    /// A dependency is not visible from the node's position in the tree
    #[error("{identifier} depends on {dependency}, which is not visible from its position")]
    UnresolvableDependency {
        identifier: Identifier,
        dependency: Identifier,
    },

    /// No constructor of a class builder has only visible dependencies
    #[error("no constructor of {identifier} has resolvable dependencies")]
    NoUsableConstructor { identifier: Identifier },

    /// A per-scope node without an enclosing scope boundary
    #[error("per-scope node {identifier} has no enclosing scope boundary")]
    MissingScopeBoundary { identifier: Identifier },

    /// A singleton would hold a per-scope instance for the container lifetime
    #[error("singleton {identifier} captures per-scope dependency {dependency}")]
    CaptiveDependency {
        identifier: Identifier,
        dependency: Identifier,
    },

    /// Dependency cycle (includes path)
    #[error("cyclic dependency: {}", PathDisplay(.path))]
    CyclicDependency { path: Vec<Identifier> },

    /// Several issues found in one pass
    #[error("{} configuration errors, first: {}", .0.len(), FirstDisplay(.0))]
    Multiple(Vec<ConfigurationError>),
}

impl ConfigurationError {
    /// All individual issues, flattening [`ConfigurationError::Multiple`].
    pub fn issues(&self) -> Vec<&ConfigurationError> {
        match self {
            ConfigurationError::Multiple(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }

    pub(crate) fn from_issues(mut issues: Vec<ConfigurationError>) -> Option<Self> {
        match issues.len() {
            0 => None,
            1 => issues.pop(),
            _ => Some(ConfigurationError::Multiple(issues)),
        }
    }
}

struct PathDisplay<'a>(&'a [Identifier]);

impl fmt::Display for PathDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", id)?;
        }
        Ok(())
    }
}

struct FirstDisplay<'a>(&'a [ConfigurationError]);

impl fmt::Display for FirstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.first() {
            Some(first) => write!(f, "{}", first),
            None => Ok(()),
        }
    }
}

/// Why a resolve target could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No node carries the identifier
    Unregistered,
    /// Several nodes in different subtrees carry the identifier
    Ambiguous { candidates: usize },
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::Unregistered => f.write_str("not registered"),
            NotFoundReason::Ambiguous { candidates } => {
                write!(f, "ambiguous between {} nodes", candidates)
            }
        }
    }
}

/// No node matches the requested identifier.
///
/// Carries the offending identifier so callers can report or fall back.
#[derive(Debug, Clone, Error)]
#[error("resolve target {identifier} not found: {reason}")]
pub struct ResolveTargetNotFound {
    pub identifier: Identifier,
    pub reason: NotFoundReason,
}

/// Resolution failures during normal operation
///
/// All variants are recoverable by the caller (retry, fallback). Builder
/// failures leave the provider ready for a retry on the next resolve.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No node matches, or the match is ambiguous
    #[error(transparent)]
    TargetNotFound(#[from] ResolveTargetNotFound),

    /// The empty identifier was passed to resolve
    #[error("the empty identifier cannot be resolved")]
    EmptyIdentifier,

    /// The builder returned an error
    #[error("builder for {identifier} failed: {source}")]
    BuildFailed {
        identifier: Identifier,
        #[source]
        source: BoxError,
    },

    /// The builder panicked
    #[error("builder for {identifier} panicked: {message}")]
    BuilderPanicked { identifier: Identifier, message: String },

    /// The instance has a different type than the one requested
    #[error("{identifier} does not resolve to {requested}")]
    ContractMismatch {
        identifier: Identifier,
        requested: &'static str,
    },

    /// The lease behind a lock was already released
    #[error("lock {lease} on {identifier} was already released")]
    DoubleRelease { identifier: Identifier, lease: u64 },

    /// A per-scope node was resolved without a matching active scope
    #[error("{identifier} needs an active `{scope}` scope")]
    ScopeNotActive { identifier: Identifier, scope: String },

    /// The scope resolved through has ended
    #[error("scope `{scope}` ({key}) has ended")]
    ScopeEnded { scope: String, key: String },

    /// A scope with the same boundary, parent and key is still active
    #[error("scope `{scope}` ({key}) is already active")]
    ScopeAlreadyActive { scope: String, key: String },

    /// No scope boundary with that name can be entered from here
    #[error("no scope boundary `{scope}` can be entered here")]
    UnknownScope { scope: String },

    /// The container was torn down
    #[error("container has been disposed")]
    ContainerDisposed,
}

impl ResolveError {
    /// The missing identifier, when this is a not-found error.
    pub fn not_found(&self) -> Option<&ResolveTargetNotFound> {
        match self {
            ResolveError::TargetNotFound(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Teardown failures
///
/// Reported to observers and the log; never propagated past the disposer, and
/// never prevents the provider from finishing its bookkeeping.
#[derive(Debug, Error)]
pub enum DisposeError {
    /// A disposal hook or the instance teardown returned an error
    #[error("teardown of {identifier} failed: {source}")]
    Teardown {
        identifier: Identifier,
        #[source]
        source: BoxError,
    },

    /// A disposal hook or the instance teardown panicked
    #[error("teardown of {identifier} panicked: {message}")]
    Panicked { identifier: Identifier, message: String },

    /// The disposal was dropped before it completed; remaining steps were skipped
    #[error("disposal of {identifier} was interrupted")]
    Interrupted { identifier: Identifier },

    /// Releasing one of the instance's dependency locks failed
    #[error("releasing dependency {dependency} of {identifier} failed: {source}")]
    DependencyRelease {
        identifier: Identifier,
        dependency: Identifier,
        #[source]
        source: ResolveError,
    },
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
