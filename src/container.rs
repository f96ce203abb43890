//! The container: validated tree, node runtimes and the scope registry.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::builder::{BuildContext, ResolveArgs};
use crate::error::{panic_message, NotFoundReason, ResolveError, ResolveResult, ResolveTargetNotFound};
use crate::identifier::Identifier;
use crate::internal::DisposeBag;
use crate::lock::{ErasedLock, SelfHandle};
use crate::multiplicity::MultiplicityConfig;
use crate::observer::Observers;
use crate::options::ContainerOptions;
use crate::provider::{CreationGuard, DisposalJob, NodeRuntime, Reservation, RuntimeShared, ScopeId, SlotKey};
use crate::scope::{Scope, ScopeRegistryKey, ScopeState};
use crate::traits::ResolverCore;
use crate::tree::{ComponentNode, NodeId, NodeTree};

/// Component container built from a [`ContainerConfig`](crate::ContainerConfig).
///
/// Resolves instances through the [`Resolver`](crate::Resolver) trait and
/// enters scopes with [`create_scope`](Container::create_scope). Cloning is
/// cheap and every clone addresses the same instances.
///
/// # Thread Safety
///
/// Resolution is re-entrant and may run concurrently from any number of
/// tasks. Shared instances are built once even when their first resolves
/// race; the other resolvers wait for the creation in flight.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, DelegateBuilder, Identifier, ProviderNodeConfig, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// # #[tokio::main]
/// # async fn main() {
/// let container = ContainerConfig::new()
///     .add(ProviderNodeConfig::singleton(DelegateBuilder::new(|_| {
///         Ok(Database { url: "postgres://localhost".to_string() })
///     })))
///     .add(ProviderNodeConfig::per_resolve(
///         DelegateBuilder::new(|ctx| Ok(UserService { db: ctx.get::<Database>()? }))
///             .depends_on(Identifier::of::<Database>()),
///     ))
///     .build()
///     .unwrap();
///
/// let service = container.resolve::<UserService>().await.unwrap();
/// assert_eq!(service.db.url, "postgres://localhost");
///
/// service.release().await.unwrap();
/// container.dispose_all().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    tree: NodeTree,
    runtimes: Vec<Option<Arc<NodeRuntime>>>,
    shared: Arc<RuntimeShared>,
    scopes: DashMap<ScopeRegistryKey, Arc<ScopeState>>,
    next_scope: AtomicU64,
}

impl Container {
    pub(crate) fn new(tree: NodeTree, options: ContainerOptions, observers: Observers) -> Self {
        let shared = Arc::new(RuntimeShared::new(options, observers));
        let mut runtimes: Vec<Option<Arc<NodeRuntime>>> = (0..tree.len()).map(|_| None).collect();
        for node in tree.component_ids() {
            if let Some(component) = tree.component(node) {
                runtimes[node.index()] = Some(Arc::new(NodeRuntime::new(
                    component.identifier.clone(),
                    component.multiplicity,
                    shared.clone(),
                )));
            }
        }
        Self {
            inner: Arc::new(ContainerInner {
                tree,
                runtimes,
                shared,
                scopes: DashMap::new(),
                next_scope: AtomicU64::new(0),
            }),
        }
    }

    /// The validated node tree.
    pub fn tree(&self) -> &NodeTree {
        &self.inner.tree
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.shared.options
    }

    /// Enters a top-level scope boundary for the context `key`.
    ///
    /// Fails with [`ResolveError::ScopeAlreadyActive`] while a scope of the
    /// same boundary and key is active, and with [`ResolveError::UnknownScope`]
    /// when no top-level boundary has that name.
    pub fn create_scope(&self, boundary: &str, key: impl Into<String>) -> ResolveResult<Scope> {
        self.inner.create_scope(None, boundary, key.into())
    }

    /// Instances of the node addressed by `identifier` that are not yet
    /// fully disposed.
    pub fn instance_count(&self, identifier: &Identifier) -> usize {
        self.inner
            .tree
            .lookup(identifier)
            .ok()
            .and_then(|node| self.inner.runtime(node))
            .map_or(0, |runtime| runtime.instance_count())
    }

    /// Boundary name and key of every active scope.
    pub fn active_scopes(&self) -> Vec<(String, String)> {
        let mut scopes: Vec<(String, String)> = self
            .inner
            .scopes
            .iter()
            .map(|entry| (entry.value().name.clone(), entry.value().key.clone()))
            .collect();
        scopes.sort();
        scopes
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.shared.is_disposed()
    }

    /// Tears the container down.
    ///
    /// Ends every scope, unpins singletons and disposes every instance with
    /// no outstanding lock. Instances still locked dispose when their last
    /// lock is released. Later resolves fail with
    /// [`ResolveError::ContainerDisposed`]. Calling this again is a no-op.
    pub async fn dispose_all(&self) {
        let inner = &self.inner;
        if inner.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let scopes: Vec<Arc<ScopeState>> = inner.scopes.iter().map(|entry| entry.value().clone()).collect();
        let mut jobs: Vec<DisposalJob> = Vec::new();
        for scope in scopes {
            jobs.extend(inner.end_scope(&scope));
        }
        for runtime in inner.runtimes.iter().flatten() {
            jobs.extend(runtime.drain());
        }

        tracing::debug!(container = %inner.name(), disposals = jobs.len(), "disposing container");
        let pending: Vec<_> = jobs.into_iter().map(DisposalJob::start).collect();
        for disposal in pending {
            disposal.await;
        }
    }

    /// Dump of the node tree and live instance counts.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        use std::fmt::Write;

        let mut out = format!("container `{}`\n", self.inner.name());
        out.push_str(&self.inner.tree.to_debug_string());
        for runtime in self.inner.runtimes.iter().flatten() {
            let _ = writeln!(out, "live {} = {}", runtime.identifier(), runtime.instance_count());
        }
        for (name, key) in self.active_scopes() {
            let _ = writeln!(out, "scope `{}` ({})", name, key);
        }
        out
    }
}

#[async_trait]
impl ResolverCore for Container {
    async fn resolve_erased(
        &self,
        identifier: &Identifier,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock> {
        let span = tracing::debug_span!("resolve", container = %self.inner.name(), %identifier);
        self.inner.resolve_from(identifier, None, args).instrument(span).await
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.inner.name())
            .field("tree", &self.inner.tree)
            .field("active_scopes", &self.inner.scopes.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl ContainerInner {
    pub(crate) fn name(&self) -> &str {
        &self.shared.options.name
    }

    fn runtime(&self, node: NodeId) -> Option<&Arc<NodeRuntime>> {
        self.runtimes.get(node.index()).and_then(Option::as_ref)
    }

    pub(crate) async fn resolve_from(
        self: &Arc<Self>,
        identifier: &Identifier,
        scope: Option<Arc<ScopeState>>,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock> {
        let result = self.locate_and_acquire(identifier, scope, args).await;
        if let Err(error) = &result {
            tracing::debug!(container = %self.name(), %identifier, %error, "resolve failed");
            self.shared.observers.resolve_failed(identifier, error);
        }
        result
    }

    async fn locate_and_acquire(
        self: &Arc<Self>,
        identifier: &Identifier,
        scope: Option<Arc<ScopeState>>,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock> {
        if identifier.is_empty() {
            return Err(ResolveError::EmptyIdentifier);
        }
        if self.shared.is_disposed() {
            return Err(ResolveError::ContainerDisposed);
        }
        if let Some(scope) = &scope {
            if scope.is_ended() {
                return Err(scope.ended_error());
            }
        }
        let enclosing = scope.as_ref().map(|scope| scope.boundary_chain()).unwrap_or_default();
        let node = self.tree.lookup_from(identifier, &enclosing)?;
        self.acquire(node, scope, args).await
    }

    /// Acquires a lock on an instance of `node`, creating it if needed.
    ///
    /// Dependencies are acquired first; their locks belong to the new
    /// instance until it disposes.
    fn acquire(
        self: &Arc<Self>,
        node: NodeId,
        scope: Option<Arc<ScopeState>>,
        args: Option<ResolveArgs>,
    ) -> BoxFuture<'static, ResolveResult<ErasedLock>> {
        let inner = self.clone();
        Box::pin(async move {
            if inner.shared.is_disposed() {
                return Err(ResolveError::ContainerDisposed);
            }
            let (Some(runtime), Some(component)) = (inner.runtime(node), inner.tree.component(node)) else {
                return Err(ResolveTargetNotFound {
                    identifier: Identifier::empty(),
                    reason: NotFoundReason::Unregistered,
                }
                .into());
            };

            let (key, owner) = match component.multiplicity {
                MultiplicityConfig::Singleton => (Some(SlotKey::Container), None),
                MultiplicityConfig::PerResolve => (None, scope),
                MultiplicityConfig::PerScope => {
                    let boundary = inner.tree.node(node).boundary;
                    let owner = match (scope, boundary) {
                        (Some(scope), Some(boundary)) => scope.find(boundary),
                        _ => None,
                    };
                    let Some(owner) = owner else {
                        return Err(ResolveError::ScopeNotActive {
                            identifier: component.identifier.clone(),
                            scope: boundary
                                .map(|boundary| inner.tree.scope_name(boundary).to_string())
                                .unwrap_or_default(),
                        });
                    };
                    if owner.is_ended() {
                        return Err(owner.ended_error());
                    }
                    (Some(SlotKey::Scope(owner.id)), Some(owner))
                }
            };

            loop {
                match runtime.reserve(key) {
                    Reservation::Reused(lock) => return Ok(lock),
                    Reservation::Wait(mut signal) => {
                        // Err only means the creator finished or gave up
                        let _ = signal.changed().await;
                    }
                    Reservation::Create(guard) => {
                        return inner.create(component, guard, owner, args).await;
                    }
                }
            }
        })
    }

    async fn create(
        self: &Arc<Self>,
        component: &ComponentNode,
        mut guard: CreationGuard,
        scope: Option<Arc<ScopeState>>,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock> {
        let started = Instant::now();
        let identifier = &component.identifier;

        let mut dependencies = Vec::with_capacity(component.plan.dependencies.len());
        for (_, dependency) in &component.plan.dependencies {
            match self.acquire(*dependency, scope.clone(), None).await {
                Ok(lock) => dependencies.push(lock),
                Err(error) => {
                    release_all(dependencies).await;
                    return Err(error);
                }
            }
        }

        let runtime = guard.runtime().clone();
        let slot = guard.slot();
        let disposers = Arc::new(Mutex::new(DisposeBag::default()));
        let ctx = BuildContext::new(
            identifier.clone(),
            dependencies
                .iter()
                .map(|lock| (lock.identifier().clone(), lock.instance().clone()))
                .collect(),
            args,
            SelfHandle::new(&runtime, slot),
            disposers.clone(),
        );

        let builder = component.plan.builder.clone();
        let building = async move { builder.build(ctx).await };
        let outcome = if self.shared.options.catch_builder_panics {
            AssertUnwindSafe(building).catch_unwind().await
        } else {
            Ok(building.await)
        };

        let instance = match outcome {
            Ok(Ok(instance)) => instance,
            Ok(Err(source)) => {
                release_all(dependencies).await;
                return Err(ResolveError::BuildFailed {
                    identifier: identifier.clone(),
                    source,
                });
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                drop(payload);
                release_all(dependencies).await;
                return Err(ResolveError::BuilderPanicked {
                    identifier: identifier.clone(),
                    message,
                });
            }
        };

        let elapsed = started.elapsed();
        let lock = guard.publish(
            instance,
            dependencies,
            disposers,
            component.plan.builder.teardown(),
            || scope.as_ref().map_or(true, |scope| !scope.is_ended()),
        );
        tracing::debug!(
            container = %self.name(),
            %identifier,
            multiplicity = %component.multiplicity,
            ?elapsed,
            "instance created"
        );
        self.shared
            .observers
            .instance_created(identifier, component.multiplicity, elapsed);
        Ok(lock)
    }

    pub(crate) fn create_scope(
        self: &Arc<Self>,
        parent: Option<&Arc<ScopeState>>,
        name: &str,
        key: String,
    ) -> ResolveResult<Scope> {
        if self.shared.is_disposed() {
            return Err(ResolveError::ContainerDisposed);
        }
        let enclosing = parent.map(|parent| parent.boundary);
        let boundary = self
            .tree
            .boundary(enclosing, name)
            .ok_or_else(|| ResolveError::UnknownScope {
                scope: name.to_string(),
            })?;
        if let Some(parent) = parent {
            if parent.is_ended() {
                return Err(parent.ended_error());
            }
        }

        let id = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed) + 1);
        let state = Arc::new(ScopeState::new(
            id,
            boundary,
            name.to_string(),
            key,
            parent.cloned(),
        ));
        let registry_key = state.registry_key();
        match self.scopes.entry(registry_key.clone()) {
            Entry::Occupied(_) => {
                return Err(ResolveError::ScopeAlreadyActive {
                    scope: state.name.clone(),
                    key: state.key.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state.clone());
            }
        }
        if let Some(parent) = parent {
            if !parent.adopt(&state) {
                self.scopes.remove(&registry_key);
                return Err(parent.ended_error());
            }
        }

        tracing::debug!(container = %self.name(), scope = %state.name, key = %state.key, "scope entered");
        Ok(Scope::new(state, self.clone()))
    }

    /// Ends `state` and its nested scopes; returns disposals that can start now.
    pub(crate) fn end_scope(&self, state: &Arc<ScopeState>) -> Vec<DisposalJob> {
        if !state.mark_ended() {
            return Vec::new();
        }
        let mut jobs = Vec::new();
        for child in state.take_children() {
            jobs.extend(self.end_scope(&child));
        }
        self.scopes
            .remove_if(&state.registry_key(), |_, registered| Arc::ptr_eq(registered, state));
        for runtime in self.runtimes.iter().flatten() {
            if runtime.multiplicity() == MultiplicityConfig::PerScope {
                jobs.extend(runtime.detach_scope(state.id));
            }
        }
        tracing::debug!(container = %self.name(), scope = %state.name, key = %state.key, "scope ended");
        jobs
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if self.shared.is_disposed() || !self.shared.options.warn_on_undisposed {
            return;
        }
        let live: usize = self
            .runtimes
            .iter()
            .flatten()
            .map(|runtime| runtime.instance_count())
            .sum();
        if live > 0 {
            tracing::warn!(container = %self.name(), live, "container dropped without dispose_all");
        }
    }
}

async fn release_all(locks: Vec<ErasedLock>) {
    for lock in locks.into_iter().rev() {
        let identifier = lock.identifier().clone();
        if let Err(error) = lock.release().await {
            tracing::error!(%identifier, %error, "failed to release dependency of a failed build");
        }
    }
}
