//! Resolver traits for component resolution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::ResolveArgs;
use crate::error::ResolveResult;
use crate::identifier::Identifier;
use crate::lock::{ErasedLock, Lock};

/// Core resolver trait for object-safe resolution.
///
/// Implemented by [`Container`](crate::Container) and [`Scope`](crate::Scope).
/// Most users should use the [`Resolver`] trait instead, which provides typed
/// methods on top of this one.
#[async_trait]
pub trait ResolverCore: Send + Sync {
    /// Acquires a lock on the instance addressed by `identifier`.
    ///
    /// `args` is handed to the builder if a new instance gets built; a reused
    /// live instance ignores it.
    async fn resolve_erased(
        &self,
        identifier: &Identifier,
        args: Option<ResolveArgs>,
    ) -> ResolveResult<ErasedLock>;
}

/// Typed resolution interface.
///
/// Every method returns a [`Lock`] that keeps the instance alive until it is
/// released or dropped.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, DelegateBuilder, Identifier, ProviderNodeConfig, Resolver};
///
/// # #[tokio::main]
/// # async fn main() {
/// let container = ContainerConfig::new()
///     .add(ProviderNodeConfig::singleton(DelegateBuilder::new(|_| Ok(42usize))))
///     .add(ProviderNodeConfig::singleton(DelegateBuilder::new(|_| Ok(8080u16))).named("port"))
///     .build()
///     .unwrap();
///
/// let answer = container.resolve::<usize>().await.unwrap();
/// assert_eq!(*answer, 42);
///
/// let port = container.resolve_named::<u16>("port").await.unwrap();
/// assert_eq!(*port, 8080);
///
/// answer.release().await.unwrap();
/// port.release().await.unwrap();
/// container.dispose_all().await;
/// # }
/// ```
#[async_trait]
pub trait Resolver: ResolverCore {
    /// Resolves the unnamed identifier of `T`.
    async fn resolve<T: Send + Sync + 'static>(&self) -> ResolveResult<Lock<T>> {
        self.resolve_id::<T>(&Identifier::of::<T>()).await
    }

    /// Resolves the identifier of `T` carrying `name`.
    async fn resolve_named<T: Send + Sync + 'static>(&self, name: &str) -> ResolveResult<Lock<T>> {
        self.resolve_id::<T>(&Identifier::named::<T>(name)).await
    }

    /// Resolves `identifier` and checks the instance has type `T`.
    async fn resolve_id<T: Send + Sync + 'static>(&self, identifier: &Identifier) -> ResolveResult<Lock<T>> {
        let erased = self.resolve_erased(identifier, None).await?;
        Lock::from_erased(erased)
    }

    /// Resolves `identifier`, passing `args` to the builder.
    async fn resolve_with<T, A>(&self, identifier: &Identifier, args: A) -> ResolveResult<Lock<T>>
    where
        T: Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        let args: ResolveArgs = Arc::new(args);
        let erased = self.resolve_erased(identifier, Some(args)).await?;
        Lock::from_erased(erased)
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
