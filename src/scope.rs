//! Scope instances.
//!
//! A scope instance is entered for a scope boundary node and keyed by an
//! external context key such as a request id. Per-scope nodes below the
//! boundary get one instance per scope instance.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::builder::ResolveArgs;
use crate::container::ContainerInner;
use crate::error::{ResolveError, ResolveResult};
use crate::identifier::Identifier;
use crate::lock::{spawn_disposal, ErasedLock};
use crate::provider::ScopeId;
use crate::traits::ResolverCore;
use crate::tree::NodeId;

/// Registry key of an active scope: boundary, parent scope and context key.
pub(crate) type ScopeRegistryKey = (NodeId, Option<ScopeId>, String);

pub(crate) struct ScopeState {
    pub(crate) id: ScopeId,
    pub(crate) boundary: NodeId,
    pub(crate) name: String,
    pub(crate) key: String,
    pub(crate) parent: Option<Arc<ScopeState>>,
    ended: AtomicBool,
    children: Mutex<Vec<Weak<ScopeState>>>,
}

impl ScopeState {
    pub(crate) fn new(
        id: ScopeId,
        boundary: NodeId,
        name: String,
        key: String,
        parent: Option<Arc<ScopeState>>,
    ) -> Self {
        Self {
            id,
            boundary,
            name,
            key,
            parent,
            ended: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn registry_key(&self) -> ScopeRegistryKey {
        (
            self.boundary,
            self.parent.as_ref().map(|parent| parent.id),
            self.key.clone(),
        )
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Marks the scope ended; false if it already was.
    pub(crate) fn mark_ended(&self) -> bool {
        let _children = self.children.lock();
        !self.ended.swap(true, Ordering::AcqRel)
    }

    /// Registers a nested scope; false once this scope has ended.
    pub(crate) fn adopt(&self, child: &Arc<ScopeState>) -> bool {
        let mut children = self.children.lock();
        if self.is_ended() {
            return false;
        }
        children.retain(|existing| existing.strong_count() > 0);
        children.push(Arc::downgrade(child));
        true
    }

    pub(crate) fn take_children(&self) -> Vec<Arc<ScopeState>> {
        self.children
            .lock()
            .drain(..)
            .filter_map(|child| child.upgrade())
            .collect()
    }

    /// Nearest scope in this chain entered for `boundary`.
    pub(crate) fn find(self: &Arc<Self>, boundary: NodeId) -> Option<Arc<ScopeState>> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.boundary == boundary {
                return Some(scope.clone());
            }
            current = scope.parent.as_ref();
        }
        None
    }

    /// Boundaries of this scope and its ancestors, innermost first.
    pub(crate) fn boundary_chain(&self) -> Vec<NodeId> {
        let mut chain = vec![self.boundary];
        let mut current = self.parent.as_ref();
        while let Some(scope) = current {
            chain.push(scope.boundary);
            current = scope.parent.as_ref();
        }
        chain
    }

    pub(crate) fn ended_error(&self) -> ResolveError {
        ResolveError::ScopeEnded {
            scope: self.name.clone(),
            key: self.key.clone(),
        }
    }
}

/// Handle on an active scope instance.
///
/// Resolving through a scope shares per-scope instances of its boundary (and
/// of every enclosing scope it was created from). Ending the scope, or
/// dropping the handle, makes those instances unresolvable; instances still
/// locked are disposed when their last lock is released.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, DelegateBuilder, ProviderNodeConfig, Resolver};
///
/// struct RequestState;
///
/// # #[tokio::main]
/// # async fn main() {
/// let container = ContainerConfig::new()
///     .add(ProviderNodeConfig::scope("request").child(
///         ProviderNodeConfig::per_scope(DelegateBuilder::new(|_| Ok(RequestState))),
///     ))
///     .build()
///     .unwrap();
///
/// let scope = container.create_scope("request", "req-1").unwrap();
/// let first = scope.resolve::<RequestState>().await.unwrap();
/// let second = scope.resolve::<RequestState>().await.unwrap();
/// assert!(std::sync::Arc::ptr_eq(first.target(), second.target()));
///
/// scope.end();
/// assert!(scope.resolve::<RequestState>().await.is_err());
/// # }
/// ```
pub struct Scope {
    state: Arc<ScopeState>,
    container: Arc<ContainerInner>,
}

impl Scope {
    pub(crate) fn new(state: Arc<ScopeState>, container: Arc<ContainerInner>) -> Self {
        Self { state, container }
    }

    /// Name of the scope boundary this scope was entered for.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// External context key.
    pub fn key(&self) -> &str {
        &self.state.key
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_ended()
    }

    /// Enters a scope boundary nested in this scope's boundary.
    pub fn create_scope(&self, boundary: &str, key: impl Into<String>) -> ResolveResult<Scope> {
        self.container
            .create_scope(Some(&self.state), boundary, key.into())
    }

    /// Ends this scope and every scope created from it.
    pub fn end(&self) {
        for job in self.container.end_scope(&self.state) {
            spawn_disposal(job);
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.end();
    }
}

#[async_trait]
impl ResolverCore for Scope {
    async fn resolve_erased(
        &self,
        identifier: &Identifier,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock> {
        let span = tracing::debug_span!(
            "resolve",
            container = %self.container.name(),
            scope = %self.state.name,
            key = %self.state.key,
            %identifier
        );
        self.container
            .resolve_from(identifier, Some(self.state.clone()), args)
            .instrument(span)
            .await
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.state.name)
            .field("key", &self.state.key)
            .field("active", &self.is_active())
            .finish()
    }
}
