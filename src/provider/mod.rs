//! Multiplicity providers.
//!
//! Every component node has one [`NodeRuntime`] owning its instance table.
//! The table lock only guards bookkeeping and is never held across an
//! await: builders, teardowns and dependency resolution all run outside it.
//! Concurrent acquirers of a key whose instance is being created wait on the
//! creation's completion signal and then retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::builder::{AnyArc, TeardownFn};
use crate::error::{ResolveError, ResolveResult};
use crate::identifier::Identifier;
use crate::internal::DisposeBag;
use crate::lock::{ErasedLock, Lease};
use crate::multiplicity::MultiplicityConfig;
use crate::observer::Observers;
use crate::options::ContainerOptions;

mod disposal;
mod slot;

pub(crate) use disposal::DisposalJob;
pub(crate) use slot::{LeaseId, ScopeId, SlotId, SlotKey};
use slot::{InstanceSlot, InstanceTable, KeyState, SlotState};

/// State shared by a container and all of its node runtimes.
pub(crate) struct RuntimeShared {
    pub(crate) options: ContainerOptions,
    pub(crate) observers: Observers,
    pub(crate) disposed: AtomicBool,
}

impl RuntimeShared {
    pub(crate) fn new(options: ContainerOptions, observers: Observers) -> Self {
        Self {
            options,
            observers,
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Outcome of looking up a key in the instance table.
pub(crate) enum Reservation {
    /// A live instance was found and leased
    Reused(ErasedLock),
    /// Another acquirer is creating the instance
    Wait(watch::Receiver<()>),
    /// The caller must build the instance
    Create(CreationGuard),
}

pub(crate) struct NodeRuntime {
    identifier: Identifier,
    multiplicity: MultiplicityConfig,
    shared: Arc<RuntimeShared>,
    table: Mutex<InstanceTable>,
}

impl NodeRuntime {
    pub(crate) fn new(identifier: Identifier, multiplicity: MultiplicityConfig, shared: Arc<RuntimeShared>) -> Self {
        Self {
            identifier,
            multiplicity,
            shared,
            table: Mutex::new(InstanceTable::default()),
        }
    }

    pub(crate) fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub(crate) fn multiplicity(&self) -> MultiplicityConfig {
        self.multiplicity
    }

    /// Leases the live instance under `key`, or reserves its creation.
    pub(crate) fn reserve(self: &Arc<Self>, key: Option<SlotKey>) -> Reservation {
        let Some(key) = key else {
            return Reservation::Create(CreationGuard::new(self.clone(), None, None));
        };

        let mut table = self.table.lock();
        match table.keyed.get(&key).cloned() {
            Some(KeyState::Live(slot)) => {
                let lease = table.next_lease();
                if let Some(entry) = table.slots.get_mut(&slot) {
                    entry.leases.insert(lease);
                    tracing::trace!(identifier = %self.identifier, slot = slot.0, leases = entry.leases.len(), "reusing instance");
                    let instance = entry.instance.clone();
                    return Reservation::Reused(ErasedLock::new(
                        self.identifier.clone(),
                        instance,
                        Lease::new(self.clone(), slot, lease),
                    ));
                }
                table.keyed.remove(&key);
            }
            Some(KeyState::Creating(signal)) => return Reservation::Wait(signal),
            None => {}
        }

        let (sender, receiver) = watch::channel(());
        table.keyed.insert(key, KeyState::Creating(receiver));
        Reservation::Create(CreationGuard::new(self.clone(), Some(key), Some(sender)))
    }

    /// Drops one lease; returns the disposal to run if it was the last one.
    pub(crate) fn release(self: &Arc<Self>, slot: SlotId, lease: LeaseId) -> ResolveResult<Option<DisposalJob>> {
        let mut table = self.table.lock();
        let released = table
            .slots
            .get_mut(&slot)
            .map_or(false, |entry| entry.leases.remove(&lease));
        if !released {
            return Err(ResolveError::DoubleRelease {
                identifier: self.identifier.clone(),
                lease: lease.0,
            });
        }
        tracing::trace!(identifier = %self.identifier, slot = slot.0, %lease, "lease released");
        Ok(table
            .begin_disposal_if_idle(slot)
            .map(|parts| DisposalJob::new(self.clone(), slot, parts)))
    }

    /// Removes an instance from resolvability at its own request.
    pub(crate) fn dispose_self(self: &Arc<Self>, slot: SlotId) -> Option<DisposalJob> {
        let mut table = self.table.lock();
        if table.pending.contains(&slot) {
            table.doomed.insert(slot);
            return None;
        }
        let entry = table.slots.get_mut(&slot)?;
        if entry.state != SlotState::Live || (!entry.resolvable && !entry.pinned) {
            // Already detached; disposal follows the last release
            return None;
        }
        entry.resolvable = false;
        entry.pinned = false;
        table.unkey(slot);
        tracing::debug!(identifier = %self.identifier, slot = slot.0, "instance requested its own disposal");
        table
            .begin_disposal_if_idle(slot)
            .map(|parts| DisposalJob::new(self.clone(), slot, parts))
    }

    /// Detaches the instance of an ended scope so it cannot be resolved again.
    pub(crate) fn detach_scope(self: &Arc<Self>, scope: ScopeId) -> Option<DisposalJob> {
        let mut table = self.table.lock();
        let Some(KeyState::Live(slot)) = table.keyed.get(&SlotKey::Scope(scope)).cloned() else {
            return None;
        };
        table.keyed.remove(&SlotKey::Scope(scope));
        let entry = table.slots.get_mut(&slot)?;
        entry.resolvable = false;
        table
            .begin_disposal_if_idle(slot)
            .map(|parts| DisposalJob::new(self.clone(), slot, parts))
    }

    /// Unpins and detaches every instance; returns the disposals that can start now.
    pub(crate) fn drain(self: &Arc<Self>) -> Vec<DisposalJob> {
        let mut table = self.table.lock();
        table.keyed.retain(|_, state| matches!(state, KeyState::Creating(_)));
        let slots: Vec<SlotId> = table.slots.keys().copied().collect();
        let mut jobs = Vec::new();
        for slot in slots {
            if let Some(entry) = table.slots.get_mut(&slot) {
                entry.resolvable = false;
                entry.pinned = false;
            }
            if let Some(parts) = table.begin_disposal_if_idle(slot) {
                jobs.push(DisposalJob::new(self.clone(), slot, parts));
            }
        }
        jobs
    }

    pub(crate) fn is_resolvable(&self, slot: SlotId) -> bool {
        let table = self.table.lock();
        if table.pending.contains(&slot) {
            return !table.doomed.contains(&slot);
        }
        table.slots.get(&slot).map_or(false, |entry| entry.resolvable)
    }

    /// Instances not yet fully disposed.
    pub(crate) fn instance_count(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Last step of a disposal: the slot leaves the table.
    ///
    /// The removed slot may hold the last reference to the instance, whose
    /// drop can release locks on this same node, so it is dropped only after
    /// the table lock.
    pub(crate) fn finish(&self, slot: SlotId) {
        let removed = {
            let mut table = self.table.lock();
            table.slots.remove(&slot)
        };
        let was_present = removed.is_some();
        drop(removed);
        if was_present {
            tracing::debug!(
                container = %self.shared.options.name,
                identifier = %self.identifier,
                multiplicity = %self.multiplicity,
                "instance disposed"
            );
            self.shared
                .observers
                .instance_disposed(&self.identifier, self.multiplicity);
        }
    }

    pub(crate) fn report_dispose_error(&self, error: &crate::error::DisposeError) {
        tracing::warn!(container = %self.shared.options.name, identifier = %self.identifier, %error, "disposal step failed");
        self.shared.observers.disposal_failed(&self.identifier, error);
    }
}

/// Reservation of one instance creation.
///
/// Dropping the guard without publishing (builder failure, panic or a
/// cancelled resolve) reverts the key's creating marker so the next acquire
/// retries. Waiters are woken either way.
pub(crate) struct CreationGuard {
    runtime: Arc<NodeRuntime>,
    key: Option<SlotKey>,
    slot: Option<SlotId>,
    // Waiters wake when this drops with the guard
    _signal: Option<watch::Sender<()>>,
    published: bool,
}

impl CreationGuard {
    fn new(runtime: Arc<NodeRuntime>, key: Option<SlotKey>, signal: Option<watch::Sender<()>>) -> Self {
        Self {
            runtime,
            key,
            slot: None,
            _signal: signal,
            published: false,
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }

    /// Slot the new instance will occupy.
    pub(crate) fn slot(&mut self) -> SlotId {
        match self.slot {
            Some(slot) => slot,
            None => {
                let slot = self.runtime.table.lock().allocate_slot();
                self.slot = Some(slot);
                slot
            }
        }
    }

    /// Stores the built instance and hands the creator its lock.
    ///
    /// The instance is only made resolvable when it did not ask to be
    /// disposed while building, its scope is still active and the container
    /// was not torn down meanwhile.
    pub(crate) fn publish(
        mut self,
        instance: AnyArc,
        dependencies: Vec<ErasedLock>,
        disposers: Arc<Mutex<DisposeBag>>,
        teardown: Option<TeardownFn>,
        scope_active: impl Fn() -> bool,
    ) -> ErasedLock {
        let slot = self.slot();
        let runtime = self.runtime.clone();
        let mut table = runtime.table.lock();
        table.pending.remove(&slot);
        let doomed = table.doomed.remove(&slot);
        let resolvable = !doomed && scope_active() && !runtime.shared.is_disposed();
        let lease = table.next_lease();
        table.slots.insert(
            slot,
            InstanceSlot {
                key: self.key,
                instance: instance.clone(),
                leases: [lease].into_iter().collect(),
                pinned: resolvable && runtime.multiplicity.pins(),
                resolvable,
                state: SlotState::Live,
                teardown,
                disposers,
                dependencies,
            },
        );
        if let Some(key) = self.key {
            if resolvable {
                table.keyed.insert(key, KeyState::Live(slot));
            } else {
                table.keyed.remove(&key);
            }
        }
        drop(table);
        self.published = true;
        ErasedLock::new(runtime.identifier.clone(), instance, Lease::new(runtime.clone(), slot, lease))
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let mut table = self.runtime.table.lock();
        if let Some(slot) = self.slot {
            table.pending.remove(&slot);
            table.doomed.remove(&slot);
        }
        if let Some(key) = self.key {
            if matches!(table.keyed.get(&key), Some(KeyState::Creating(_))) {
                table.keyed.remove(&key);
            }
        }
        drop(table);
        tracing::trace!(identifier = %self.runtime.identifier, "creation abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(multiplicity: MultiplicityConfig) -> Arc<NodeRuntime> {
        Arc::new(NodeRuntime::new(
            Identifier::of::<u32>(),
            multiplicity,
            Arc::new(RuntimeShared::new(ContainerOptions::default(), Observers::default())),
        ))
    }

    fn publish(guard: CreationGuard, value: u32) -> ErasedLock {
        guard.publish(
            Arc::new(value),
            Vec::new(),
            Arc::new(Mutex::new(DisposeBag::default())),
            None,
            || true,
        )
    }

    #[test]
    fn second_release_of_a_lease_fails_fast() {
        let runtime = runtime(MultiplicityConfig::Singleton);
        let Reservation::Create(mut guard) = runtime.reserve(Some(SlotKey::Container)) else {
            panic!("expected a creation reservation");
        };
        let slot = guard.slot();
        let lock = publish(guard, 7);
        let lease = {
            let table = runtime.table.lock();
            *table.slots[&slot].leases.iter().next().unwrap()
        };
        // Release through the runtime directly, then once more
        assert!(runtime.release(slot, lease).unwrap().is_none());
        let err = runtime.release(slot, lease).unwrap_err();
        assert!(matches!(err, ResolveError::DoubleRelease { .. }));
        std::mem::forget(lock);
    }

    #[test]
    fn abandoned_creation_reverts_marker() {
        let runtime = runtime(MultiplicityConfig::PerScope);
        let key = Some(SlotKey::Scope(ScopeId(1)));
        let Reservation::Create(guard) = runtime.reserve(key) else {
            panic!("expected a creation reservation");
        };
        assert!(matches!(runtime.reserve(key), Reservation::Wait(_)));
        drop(guard);
        assert!(matches!(runtime.reserve(key), Reservation::Create(_)));
    }

    #[test]
    fn dropped_disposal_still_frees_the_slot() {
        let runtime = runtime(MultiplicityConfig::PerResolve);
        let Reservation::Create(mut guard) = runtime.reserve(None) else {
            panic!("expected a creation reservation");
        };
        let slot = guard.slot();
        let lock = publish(guard, 5);
        let lease = {
            let table = runtime.table.lock();
            *table.slots[&slot].leases.iter().next().unwrap()
        };
        let job = runtime.release(slot, lease).unwrap().expect("last lease starts disposal");
        assert_eq!(runtime.instance_count(), 1);

        drop(job);
        assert_eq!(runtime.instance_count(), 0);
        std::mem::forget(lock);
    }

    #[tokio::test]
    async fn waiters_are_woken_by_publish() {
        let runtime = runtime(MultiplicityConfig::Singleton);
        let key = Some(SlotKey::Container);
        let Reservation::Create(guard) = runtime.reserve(key) else {
            panic!("expected a creation reservation");
        };
        let Reservation::Wait(mut signal) = runtime.reserve(key) else {
            panic!("expected to wait");
        };
        let lock = publish(guard, 1);
        assert!(signal.changed().await.is_err());
        match runtime.reserve(key) {
            Reservation::Reused(second) => {
                assert!(Arc::ptr_eq(second.instance(), lock.instance()));
                second.release().await.unwrap();
            }
            _ => panic!("expected the live instance"),
        }
        lock.release().await.unwrap();
        // Singletons stay pinned
        assert_eq!(runtime.instance_count(), 1);
    }

    #[tokio::test]
    async fn per_resolve_disposes_on_last_release() {
        let runtime = runtime(MultiplicityConfig::PerResolve);
        let Reservation::Create(guard) = runtime.reserve(None) else {
            panic!("expected a creation reservation");
        };
        let lock = publish(guard, 3);
        assert_eq!(runtime.instance_count(), 1);
        lock.release().await.unwrap();
        assert_eq!(runtime.instance_count(), 0);
    }
}
