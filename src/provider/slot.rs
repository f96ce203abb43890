//! Instance slots and the per-node instance table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::builder::{AnyArc, TeardownFn};
use crate::internal::DisposeBag;
use crate::lock::ErasedLock;

/// Arena index of an instance within its node's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(pub(crate) u64);

/// Identity of one outstanding lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LeaseId(pub(crate) u64);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a scope instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(pub(crate) u64);

/// Sharing key of a shared instance. Per-resolve instances have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SlotKey {
    Container,
    Scope(ScopeId),
}

#[derive(Clone)]
pub(crate) enum KeyState {
    /// Creation in flight; the sender is dropped once it finishes or fails
    Creating(watch::Receiver<()>),
    Live(SlotId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Live,
    Disposing,
}

pub(crate) struct InstanceSlot {
    pub(crate) key: Option<SlotKey>,
    pub(crate) instance: AnyArc,
    pub(crate) leases: HashSet<LeaseId>,
    /// Kept alive without leases (live singletons)
    pub(crate) pinned: bool,
    pub(crate) resolvable: bool,
    pub(crate) state: SlotState,
    pub(crate) teardown: Option<TeardownFn>,
    pub(crate) disposers: Arc<Mutex<DisposeBag>>,
    pub(crate) dependencies: Vec<ErasedLock>,
}

/// Everything a disposal needs, moved out of the slot when it begins.
pub(crate) struct DisposalParts {
    pub(crate) instance: AnyArc,
    pub(crate) teardown: Option<TeardownFn>,
    pub(crate) disposers: Arc<Mutex<DisposeBag>>,
    pub(crate) dependencies: Vec<ErasedLock>,
}

#[derive(Default)]
pub(crate) struct InstanceTable {
    pub(crate) slots: HashMap<SlotId, InstanceSlot>,
    pub(crate) keyed: HashMap<SlotKey, KeyState>,
    /// Allocated for a build in flight, not yet published
    pub(crate) pending: HashSet<SlotId>,
    /// Asked to dispose themselves while still being built
    pub(crate) doomed: HashSet<SlotId>,
    next_slot: u64,
    next_lease: u64,
}

impl InstanceTable {
    pub(crate) fn allocate_slot(&mut self) -> SlotId {
        self.next_slot += 1;
        let slot = SlotId(self.next_slot);
        self.pending.insert(slot);
        slot
    }

    pub(crate) fn next_lease(&mut self) -> LeaseId {
        self.next_lease += 1;
        LeaseId(self.next_lease)
    }

    /// Removes the key entry of `slot` if it still points at it.
    pub(crate) fn unkey(&mut self, slot: SlotId) {
        let Some(key) = self.slots.get(&slot).and_then(|entry| entry.key) else {
            return;
        };
        if matches!(self.keyed.get(&key), Some(KeyState::Live(live)) if *live == slot) {
            self.keyed.remove(&key);
        }
    }

    /// Starts disposal when the slot is live, unpinned and has no leases.
    ///
    /// The slot stays in the table, marked disposing, until the disposal
    /// finishes; its key entry is removed at once so a concurrent acquire
    /// builds a fresh instance.
    pub(crate) fn begin_disposal_if_idle(&mut self, slot: SlotId) -> Option<DisposalParts> {
        let idle = self
            .slots
            .get(&slot)
            .map_or(false, |entry| entry.leases.is_empty() && !entry.pinned && entry.state == SlotState::Live);
        if !idle {
            return None;
        }
        self.unkey(slot);
        let entry = self.slots.get_mut(&slot)?;
        entry.state = SlotState::Disposing;
        entry.resolvable = false;
        Some(DisposalParts {
            instance: entry.instance.clone(),
            teardown: entry.teardown,
            disposers: entry.disposers.clone(),
            dependencies: std::mem::take(&mut entry.dependencies),
        })
    }
}
