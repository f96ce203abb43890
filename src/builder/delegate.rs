//! Delegate builder: a factory closure with explicit dependencies.

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};

use super::class::erase;
use super::{async_dispose_teardown, AnyArc, BuildContext, ErasedFactory, InstanceBuilder, TeardownFn};
use crate::error::BoxError;
use crate::identifier::{Contract, Identifier};
use crate::traits::AsyncDispose;

/// Builder wrapping a factory closure.
///
/// The closure receives a [`BuildContext`] holding the resolved dependencies
/// declared with [`depends_on`](DelegateBuilder::depends_on).
///
/// # Examples
///
/// ```
/// use indirectx::{DelegateBuilder, Identifier};
///
/// let greeting = DelegateBuilder::new(|ctx| {
///     let name = ctx.dependency::<String>(&Identifier::named::<String>("name"))?;
///     Ok(format!("hello {}", name))
/// })
/// .depends_on(Identifier::named::<String>("name"));
///
/// assert_eq!(greeting.dependencies().len(), 1);
/// ```
#[derive(Clone)]
pub struct DelegateBuilder {
    contract: Contract,
    dependencies: Vec<Identifier>,
    factory: ErasedFactory,
    teardown: Option<(Contract, TeardownFn)>,
}

impl DelegateBuilder {
    /// Synchronous factory producing a `T`.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BuildContext) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_factory::<T>(erase(Arc::new(
            move |ctx: BuildContext| -> BoxFuture<'static, Result<T, BoxError>> {
                Box::pin(future::ready(f(&ctx)))
            },
        )))
    }

    /// Asynchronous factory producing a `T`.
    pub fn new_async<T, F, Fut>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::from_factory::<T>(erase(Arc::new(
            move |ctx: BuildContext| -> BoxFuture<'static, Result<T, BoxError>> { Box::pin(f(ctx)) },
        )))
    }

    fn from_factory<T: 'static>(factory: ErasedFactory) -> Self {
        Self {
            contract: Contract::of::<T>(),
            dependencies: Vec::new(),
            factory,
            teardown: None,
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

    /// Tears instances down through their [`AsyncDispose`] impl.
    ///
    /// `T` must be the type the factory produces; a different type is a
    /// configuration error.
    pub fn with_async_dispose<T: AsyncDispose>(mut self) -> Self {
        self.teardown = Some((Contract::of::<T>(), async_dispose_teardown::<T>));
        self
    }

    pub fn contract(&self) -> Contract {
        self.contract
    }

    pub fn dependencies(&self) -> &[Identifier] {
        &self.dependencies
    }

    pub(crate) fn teardown_mismatch(&self) -> Option<Contract> {
        match self.teardown {
            Some((contract, _)) if contract != self.contract => Some(contract),
            _ => None,
        }
    }
}

impl InstanceBuilder for DelegateBuilder {
    fn build(&self, ctx: BuildContext) -> BoxFuture<'static, Result<AnyArc, BoxError>> {
        (self.factory)(ctx)
    }

    fn teardown(&self) -> Option<TeardownFn> {
        self.teardown.map(|(_, teardown)| teardown)
    }
}
