//! Lock handles and self references.
//!
//! A [`Lock`] is the only way to hold a resolved instance. Each lock carries
//! one lease on its instance; the instance disposes once every lease is gone
//! and its multiplicity does not pin it.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::builder::AnyArc;
use crate::error::{ResolveError, ResolveResult};
use crate::identifier::Identifier;
use crate::provider::{DisposalJob, LeaseId, NodeRuntime, SlotId};

/// One outstanding lease on an instance slot.
pub(crate) struct Lease {
    runtime: Arc<NodeRuntime>,
    slot: SlotId,
    id: LeaseId,
}

impl Lease {
    pub(crate) fn new(runtime: Arc<NodeRuntime>, slot: SlotId, id: LeaseId) -> Self {
        Self { runtime, slot, id }
    }

    fn release(self) -> ResolveResult<Option<DisposalJob>> {
        self.runtime.release(self.slot, self.id)
    }
}

/// Untyped lock on a resolved instance.
///
/// Returned by [`ResolverCore::resolve_erased`](crate::ResolverCore::resolve_erased).
/// Dropping it releases the lease.
pub struct ErasedLock {
    identifier: Identifier,
    instance: AnyArc,
    lease: Option<Lease>,
}

impl ErasedLock {
    pub(crate) fn new(identifier: Identifier, instance: AnyArc, lease: Lease) -> Self {
        Self {
            identifier,
            instance,
            lease: Some(lease),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub(crate) fn instance(&self) -> &AnyArc {
        &self.instance
    }

    /// Typed view of the lock. On a type mismatch the lock is released.
    pub fn downcast<T: Send + Sync + 'static>(self) -> ResolveResult<Lock<T>> {
        Lock::from_erased(self)
    }

    /// Releases the lease, running the instance's disposal if it was the last one.
    ///
    /// Inside a tokio runtime the disposal runs as its own task; dropping
    /// this future stops the wait, not the disposal.
    pub async fn release(mut self) -> ResolveResult<()> {
        match self.lease.take() {
            Some(lease) => {
                if let Some(job) = lease.release()? {
                    job.start().await;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for ErasedLock {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            match lease.release() {
                Ok(Some(job)) => spawn_disposal(job),
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(identifier = %self.identifier, %error, "dropped lock failed to release");
                }
            }
        }
    }
}

impl fmt::Debug for ErasedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedLock")
            .field("identifier", &self.identifier)
            .field("held", &self.lease.is_some())
            .finish()
    }
}

/// Runs a disposal started from a synchronous path.
///
/// Spawned on the current tokio runtime when there is one, otherwise run to
/// completion on a temporary current-thread runtime.
pub(crate) fn spawn_disposal(job: DisposalJob) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(job.run());
        }
        Err(_) => match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(job.run()),
            Err(error) => {
                tracing::error!(%error, "no runtime available for disposal");
            }
        },
    }
}

/// Exclusive capability to use a resolved instance.
///
/// The instance stays alive, and is never disposed, while the lock is held.
/// Locks are not clonable; resolve again to get a second one. Release with
/// [`release`](Lock::release) to wait for the resulting disposal, or drop the
/// lock to release it in the background.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, DelegateBuilder, ProviderNodeConfig, Resolver};
///
/// # #[tokio::main]
/// # async fn main() {
/// let container = ContainerConfig::new()
///     .add(ProviderNodeConfig::per_resolve(DelegateBuilder::new(|_| Ok(String::from("fresh")))))
///     .build()
///     .unwrap();
///
/// let lock = container.resolve::<String>().await.unwrap();
/// assert_eq!(lock.len(), 5);
/// lock.release().await.unwrap();
/// # }
/// ```
pub struct Lock<T> {
    target: Arc<T>,
    erased: ErasedLock,
}

impl<T: Send + Sync + 'static> Lock<T> {
    pub(crate) fn from_erased(erased: ErasedLock) -> ResolveResult<Self> {
        match erased.instance.clone().downcast::<T>() {
            Ok(target) => Ok(Self { target, erased }),
            Err(_) => Err(ResolveError::ContractMismatch {
                identifier: erased.identifier.clone(),
                requested: std::any::type_name::<T>(),
            }),
        }
    }

    /// Shared pointer to the locked instance.
    ///
    /// Cloning the `Arc` does not extend the lock; the instance may be torn
    /// down once the lock is released.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn identifier(&self) -> &Identifier {
        self.erased.identifier()
    }

    /// Releases the lock, running the instance's disposal if it was the last one.
    pub async fn release(self) -> ResolveResult<()> {
        self.erased.release().await
    }

    pub fn into_erased(self) -> ErasedLock {
        self.erased
    }
}

impl<T> Deref for Lock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("identifier", self.erased.identifier())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Reference an instance holds to itself.
///
/// Handed out once by [`BuildContext::self_handle`](crate::BuildContext::self_handle)
/// and not clonable, so only the instance being built holds it. It does not
/// keep the instance or the container alive.
pub struct SelfHandle {
    runtime: Weak<NodeRuntime>,
    slot: SlotId,
    identifier: Identifier,
}

impl SelfHandle {
    pub(crate) fn new(runtime: &Arc<NodeRuntime>, slot: SlotId) -> Self {
        Self {
            runtime: Arc::downgrade(runtime),
            slot,
            identifier: runtime.identifier().clone(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Requests disposal of this instance.
    ///
    /// The instance stops being resolvable at once; later resolves build a
    /// fresh one. Disposal itself starts when no lock on the instance is
    /// outstanding, and is awaited here if that is already the case. Calling
    /// this again is a no-op.
    pub async fn dispose_async(&self) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if let Some(job) = runtime.dispose_self(self.slot) {
            job.start().await;
        }
    }

    /// False once the instance was disposed, detached or its scope ended.
    pub fn is_resolvable(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.is_resolvable(self.slot))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SelfHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfHandle")
            .field("identifier", &self.identifier)
            .field("slot", &self.slot)
            .finish()
    }
}
