//! Class builder: constructors registered statically on the component type.

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};

use super::{AnyArc, BuildContext, ErasedFactory, InstanceBuilder, TeardownFn};
use crate::error::BoxError;
use crate::identifier::{Contract, Identifier};
use crate::internal::BoxDisposeFuture;

type TypedFactory<T> = Arc<dyn Fn(BuildContext) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Type that can be built by a [`ClassBuilder`].
///
/// `constructors` plays the role of the type's constructor list: each entry
/// declares the identifiers it depends on. At container build time the
/// constructor with the most dependencies visible from the node's position is
/// chosen, earlier declarations winning ties.
///
/// # Examples
///
/// ```
/// use indirectx::{Component, Constructor};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Repository { config: Option<Arc<Config>> }
///
/// impl Component for Repository {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![
///             Constructor::new(|ctx| Ok(Repository { config: Some(ctx.get::<Config>()?) }))
///                 .depends_on_type::<Config>(),
///             Constructor::new(|_| Ok(Repository { config: None })),
///         ]
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Component: Send + Sync + Sized + 'static {
    /// Candidate constructors, in declaration order.
    fn constructors() -> Vec<Constructor<Self>>;

    /// Teardown run once when the instance disposes.
    async fn dispose(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// One candidate constructor of a [`Component`].
pub struct Constructor<T> {
    dependencies: Vec<Identifier>,
    build: TypedFactory<T>,
}

impl<T: Send + 'static> Constructor<T> {
    /// Synchronous constructor.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&BuildContext) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            build: Arc::new(move |ctx: BuildContext| -> BoxFuture<'static, Result<T, BoxError>> {
                Box::pin(future::ready(f(&ctx)))
            }),
        }
    }

    /// Asynchronous constructor.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            dependencies: Vec::new(),
            build: Arc::new(move |ctx: BuildContext| -> BoxFuture<'static, Result<T, BoxError>> {
                Box::pin(f(ctx))
            }),
        }
    }

    /// Declares a dependency on `identifier`.
    pub fn depends_on(mut self, identifier: Identifier) -> Self {
        self.dependencies.push(identifier);
        self
    }

    /// Declares a dependency on the unnamed identifier of `D`.
    pub fn depends_on_type<D: ?Sized + 'static>(self) -> Self {
        self.depends_on(Identifier::of::<D>())
    }

    pub fn dependencies(&self) -> &[Identifier] {
        &self.dependencies
    }
}

#[derive(Clone)]
struct ErasedConstructor {
    dependencies: Vec<Identifier>,
    factory: ErasedFactory,
}

/// Builder selecting one of the constructors a [`Component`] registers.
#[derive(Clone)]
pub struct ClassBuilder {
    contract: Contract,
    constructors: Vec<ErasedConstructor>,
    teardown: TeardownFn,
}

impl ClassBuilder {
    /// Class builder for the component type `T`.
    pub fn of<T: Component>() -> Self {
        let constructors = T::constructors()
            .into_iter()
            .map(|constructor| ErasedConstructor {
                dependencies: constructor.dependencies,
                factory: erase(constructor.build),
            })
            .collect();
        Self {
            contract: Contract::of::<T>(),
            constructors,
            teardown: component_teardown::<T>,
        }
    }

    pub fn contract(&self) -> Contract {
        self.contract
    }

    pub fn constructor_count(&self) -> usize {
        self.constructors.len()
    }

    pub(crate) fn candidates(&self) -> Vec<&[Identifier]> {
        self.constructors
            .iter()
            .map(|constructor| constructor.dependencies.as_slice())
            .collect()
    }

    pub(crate) fn select(&self, candidate: usize) -> Arc<dyn InstanceBuilder> {
        // Validation only hands out indices of existing constructors.
        let constructor = self.constructors[candidate].clone();
        Arc::new(ChosenConstructor {
            factory: constructor.factory,
            teardown: self.teardown,
        })
    }
}

struct ChosenConstructor {
    factory: ErasedFactory,
    teardown: TeardownFn,
}

impl InstanceBuilder for ChosenConstructor {
    fn build(&self, ctx: BuildContext) -> BoxFuture<'static, Result<AnyArc, BoxError>> {
        (self.factory)(ctx)
    }

    fn teardown(&self) -> Option<TeardownFn> {
        Some(self.teardown)
    }
}

pub(crate) fn erase<T: Send + Sync + 'static>(build: TypedFactory<T>) -> ErasedFactory {
    Arc::new(move |ctx: BuildContext| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
        let pending = build(ctx);
        Box::pin(async move { pending.await.map(|value| Arc::new(value) as AnyArc) })
    })
}

fn component_teardown<T: Component>(instance: AnyArc) -> BoxDisposeFuture {
    Box::pin(async move {
        match instance.downcast::<T>() {
            Ok(component) => component.dispose().await,
            Err(_) => Ok(()),
        }
    })
}
