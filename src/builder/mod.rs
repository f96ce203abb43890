//! Instance builder strategies.
//!
//! A builder turns a fully resolved dependency set into exactly one instance.
//! Two strategies exist: [`ClassBuilder`] for types that statically register
//! their constructors through [`Component`], and [`DelegateBuilder`] wrapping
//! a factory closure. Builders never memoize; caching and reuse belong to the
//! multiplicity providers.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::{BoxError, NotFoundReason, ResolveError, ResolveResult, ResolveTargetNotFound};
use crate::identifier::{Contract, Identifier};
use crate::internal::{BoxDisposeFuture, DisposeBag};
use crate::lock::SelfHandle;
use crate::traits::AsyncDispose;

pub mod class;
pub mod delegate;

pub use class::{ClassBuilder, Component, Constructor};
pub use delegate::DelegateBuilder;

// Type-erased Arc for instance storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Construction arguments passed through `resolve_with`.
pub type ResolveArgs = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory =
    Arc<dyn Fn(BuildContext) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync>;

/// Teardown of a type-erased instance.
pub(crate) type TeardownFn = fn(AnyArc) -> BoxDisposeFuture;

/// Strategy invoked by a multiplicity provider once per instance creation.
pub(crate) trait InstanceBuilder: Send + Sync {
    fn build(&self, ctx: BuildContext) -> BoxFuture<'static, Result<AnyArc, BoxError>>;

    fn teardown(&self) -> Option<TeardownFn>;
}

/// Instance builder configuration of a component node.
///
/// # Examples
///
/// ```
/// use indirectx::{BuilderConfig, Component, Constructor, Contract, DelegateBuilder};
///
/// struct Clock;
/// impl Component for Clock {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new(|_| Ok(Clock))]
///     }
/// }
///
/// let class = BuilderConfig::class::<Clock>();
/// let delegate = BuilderConfig::from(DelegateBuilder::new(|_| Ok(42u32)));
///
/// assert_eq!(class.contract(), Contract::of::<Clock>());
/// assert_eq!(delegate.contract(), Contract::of::<u32>());
/// ```
#[derive(Clone)]
pub enum BuilderConfig {
    /// Constructor chosen from the type's registered constructors
    Class(ClassBuilder),
    /// Factory closure with explicit dependencies
    Delegate(DelegateBuilder),
}

impl BuilderConfig {
    /// Class builder for the component type `T`.
    pub fn class<T: Component>() -> Self {
        BuilderConfig::Class(ClassBuilder::of::<T>())
    }

    /// Contract type of the instances this builder produces.
    pub fn contract(&self) -> Contract {
        match self {
            BuilderConfig::Class(class) => class.contract(),
            BuilderConfig::Delegate(delegate) => delegate.contract(),
        }
    }

    /// Dependency lists of every candidate constructor, in declaration order.
    pub(crate) fn candidates(&self) -> Vec<&[Identifier]> {
        match self {
            BuilderConfig::Class(class) => class.candidates(),
            BuilderConfig::Delegate(delegate) => vec![delegate.dependencies()],
        }
    }

    /// Contract the attached teardown expects, when it differs from the output.
    pub(crate) fn teardown_mismatch(&self) -> Option<Contract> {
        match self {
            BuilderConfig::Class(_) => None,
            BuilderConfig::Delegate(delegate) => delegate.teardown_mismatch(),
        }
    }

    pub(crate) fn select(&self, candidate: usize) -> Arc<dyn InstanceBuilder> {
        match self {
            BuilderConfig::Class(class) => class.select(candidate),
            BuilderConfig::Delegate(delegate) => Arc::new(delegate.clone()),
        }
    }
}

impl From<ClassBuilder> for BuilderConfig {
    fn from(builder: ClassBuilder) -> Self {
        BuilderConfig::Class(builder)
    }
}

impl From<DelegateBuilder> for BuilderConfig {
    fn from(builder: DelegateBuilder) -> Self {
        BuilderConfig::Delegate(builder)
    }
}

/// Context handed to a builder for one instance creation.
///
/// Holds the targets of the dependency locks acquired for the new instance
/// (the locks themselves stay with the container and are released when the
/// instance disposes), the optional construction arguments and the instance's
/// [`SelfHandle`].
///
/// # Examples
///
/// ```
/// use indirectx::{DelegateBuilder, Identifier};
/// use std::sync::Arc;
///
/// struct Settings { url: String }
/// struct Client { settings: Arc<Settings> }
///
/// let builder = DelegateBuilder::new(|ctx| {
///     Ok(Client { settings: ctx.get::<Settings>()? })
/// })
/// .depends_on(Identifier::of::<Settings>());
/// ```
pub struct BuildContext {
    identifier: Identifier,
    dependencies: Vec<(Identifier, AnyArc)>,
    args: Option<ResolveArgs>,
    self_handle: Mutex<Option<SelfHandle>>,
    disposers: Arc<Mutex<DisposeBag>>,
}

impl BuildContext {
    pub(crate) fn new(
        identifier: Identifier,
        dependencies: Vec<(Identifier, AnyArc)>,
        args: Option<ResolveArgs>,
        self_handle: SelfHandle,
        disposers: Arc<Mutex<DisposeBag>>,
    ) -> Self {
        Self {
            identifier,
            dependencies,
            args,
            self_handle: Mutex::new(Some(self_handle)),
            disposers,
        }
    }

    /// Identifier of the node being built.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Resolved dependency declared as `identifier`.
    pub fn dependency<T: Send + Sync + 'static>(&self, identifier: &Identifier) -> ResolveResult<Arc<T>> {
        let (id, instance) = self
            .dependencies
            .iter()
            .find(|(id, _)| id == identifier)
            .ok_or_else(|| {
                ResolveError::from(ResolveTargetNotFound {
                    identifier: identifier.clone(),
                    reason: NotFoundReason::Unregistered,
                })
            })?;
        downcast_dependency(id, instance)
    }

    /// Resolved dependency declared as the unnamed identifier of `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        self.dependency(&Identifier::of::<T>())
    }

    /// Resolved dependency at its declaration position.
    pub fn dependency_at<T: Send + Sync + 'static>(&self, index: usize) -> ResolveResult<Arc<T>> {
        match self.dependencies.get(index) {
            Some((id, instance)) => downcast_dependency(id, instance),
            None => Err(ResolveTargetNotFound {
                identifier: Identifier::of::<T>(),
                reason: NotFoundReason::Unregistered,
            }
            .into()),
        }
    }

    /// Construction arguments passed to `resolve_with`, if they have type `A`.
    pub fn args<A: Send + Sync + 'static>(&self) -> Option<&A> {
        self.args.as_deref().and_then(|args| args.downcast_ref::<A>())
    }

    /// Handle the new instance can keep to request its own disposal.
    ///
    /// Handed out once; later calls return `None`.
    pub fn self_handle(&self) -> Option<SelfHandle> {
        self.self_handle.lock().take()
    }

    /// Runs `service.dispose()` when the instance being built disposes.
    ///
    /// Hooks run in reverse registration order, before the instance's own
    /// teardown.
    pub fn register_async_disposer<T: AsyncDispose>(&self, service: Arc<T>) {
        self.disposers
            .lock()
            .push_async(move || async move { service.dispose().await });
    }

    /// Runs `f` when the instance being built disposes.
    pub fn register_disposer_fn<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.disposers.lock().push_async(f);
    }
}

fn downcast_dependency<T: Send + Sync + 'static>(id: &Identifier, instance: &AnyArc) -> ResolveResult<Arc<T>> {
    instance
        .clone()
        .downcast::<T>()
        .map_err(|_| ResolveError::ContractMismatch {
            identifier: id.clone(),
            requested: std::any::type_name::<T>(),
        })
}

/// Teardown through [`AsyncDispose`] for instances of type `T`.
pub(crate) fn async_dispose_teardown<T: AsyncDispose>(instance: AnyArc) -> BoxDisposeFuture {
    Box::pin(async move {
        match instance.downcast::<T>() {
            Ok(instance) => instance.dispose().await,
            Err(_) => Ok(()),
        }
    })
}
