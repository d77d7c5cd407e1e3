//! Transactional variable cells
//!
//! A [`VarCell`] is the shared state behind one transactional variable:
//! a stable identity, the committed value with its version counter, and the
//! set of parked transactions waiting for the value to change.
//!
//! ## Locking
//!
//! Two locks with strictly separate jobs:
//!
//! - `slot` guards the committed value/version pair. It is taken by the
//!   commit protocol (in global [`VarId`] order across all touched cells)
//!   and, briefly, by a transaction log's first read of the cell to get a
//!   single consistent value/version snapshot. The interpreter never reads
//!   the slot directly; it always goes through the log.
//! - `waiters` guards the waiter registry. Registration and deregistration
//!   must be safe to race against a commit on the same cell, so they use
//!   their own narrower lock rather than piggybacking on `slot`.
//!
//! A commit wakes waiters only after it has released every slot lock.

use crate::value::DynValue;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable, ordered identity of a transactional variable.
///
/// Allocated from a process-global counter. The ordering is what gives the
/// commit protocol its deterministic global lock order: sorting a log's
/// entries by `VarId` prevents deadlock between simultaneous multi-variable
/// commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u64);

impl VarId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        VarId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tvar:{}", self.0)
    }
}

/// Identity of one parked transaction, used to deregister its waiter
/// entries after a wake (or a timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

impl WaiterId {
    /// Allocate a fresh waiter identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        WaiterId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Resumption handle of a parked transaction.
///
/// The blocking manager registers one of these per cell in the blocked
/// transaction's read set; a committing transaction calls [`Notify::notify`]
/// on every waiter of every cell it wrote. Keeping this a trait (rather
/// than baking in a condvar) leaves the cell agnostic to how the waiting
/// side actually suspends.
pub trait Notify: Send + Sync {
    /// Signal the waiter that a watched cell has a new committed value.
    fn notify(&self);
}

/// The committed value/version pair of a cell.
///
/// Mutated only by the commit protocol, under the slot lock.
pub struct Slot {
    /// Current committed value.
    pub value: DynValue,
    /// Bumped by exactly one per committed write. Starts at 0.
    pub version: u64,
}

/// The shared cell behind one transactional variable.
///
/// Owned collectively by the engine via `Arc`; never exclusively owned by
/// one transaction. Created with version 0 and an empty waiter set.
pub struct VarCell {
    id: VarId,
    slot: Mutex<Slot>,
    waiters: Mutex<FxHashMap<WaiterId, Arc<dyn Notify>>>,
}

impl VarCell {
    /// Allocate a fresh cell seeded with `initial`.
    pub fn new(initial: DynValue) -> Arc<Self> {
        Arc::new(VarCell {
            id: VarId::next(),
            slot: Mutex::new(Slot {
                value: initial,
                version: 0,
            }),
            waiters: Mutex::new(FxHashMap::default()),
        })
    }

    /// Stable identity of this cell.
    pub fn id(&self) -> VarId {
        self.id
    }

    /// Lock the committed slot.
    ///
    /// Callers are the commit protocol (which takes slots in `VarId` order)
    /// and the blocking manager's post-registration version check. Never
    /// hold this lock while touching the waiter registry.
    pub fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock()
    }

    /// Atomically snapshot the committed value and version.
    ///
    /// Used by a transaction log on its first read of this cell; the two
    /// halves come from a single lock acquisition, so the version always
    /// matches the value.
    pub fn committed_snapshot(&self) -> (DynValue, u64) {
        let slot = self.slot.lock();
        (slot.value.clone(), slot.version)
    }

    /// Register a parked transaction's resumption handle.
    pub fn register_waiter(&self, id: WaiterId, waiter: Arc<dyn Notify>) {
        self.waiters.lock().insert(id, waiter);
    }

    /// Remove a waiter entry. A no-op if a wake already drained it.
    pub fn deregister_waiter(&self, id: WaiterId) {
        self.waiters.lock().remove(&id);
    }

    /// Wake every waiter of this cell.
    ///
    /// Conservative broadcast: all waiters are drained and signalled, and
    /// each woken transaction re-runs from the top to find out whether it
    /// can proceed now. Signalling happens outside the registry lock.
    pub fn wake_all(&self) {
        let drained: Vec<Arc<dyn Notify>> = {
            let mut waiters = self.waiters.lock();
            waiters.drain().map(|(_, w)| w).collect()
        };
        if !drained.is_empty() {
            tracing::trace!(var = %self.id, count = drained.len(), "waking waiters");
        }
        for waiter in drained {
            waiter.notify();
        }
    }

    /// Number of currently registered waiters. Test hook.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl fmt::Debug for VarCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarCell")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Untyped handle to a cell, yielded by the `Alloc` program variant.
///
/// The engine cannot know the element type of a freshly allocated variable,
/// so `Alloc` delivers this wrapper as its result value; the typed facade
/// downcasts it and rewraps it with the right phantom type.
#[derive(Debug, Clone)]
pub struct RawVar(
    /// The allocated cell.
    pub Arc<VarCell>,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{pack, unpack};

    struct Flag(std::sync::atomic::AtomicBool);

    impl Notify for Flag {
        fn notify(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let a = VarCell::new(pack(0i64));
        let b = VarCell::new(pack(0i64));
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id(), "later allocation should sort later");
    }

    #[test]
    fn test_new_cell_starts_at_version_zero() {
        let cell = VarCell::new(pack(7i64));
        let (value, version) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), 7);
        assert_eq!(version, 0);
        assert_eq!(cell.waiter_count(), 0);
    }

    #[test]
    fn test_register_then_deregister() {
        let cell = VarCell::new(pack(0i64));
        let id = WaiterId::next();
        cell.register_waiter(id, Arc::new(Flag(std::sync::atomic::AtomicBool::new(false))));
        assert_eq!(cell.waiter_count(), 1);
        cell.deregister_waiter(id);
        assert_eq!(cell.waiter_count(), 0);
        // Deregistering twice is harmless.
        cell.deregister_waiter(id);
    }

    #[test]
    fn test_wake_all_drains_and_signals() {
        let cell = VarCell::new(pack(0i64));
        let flags: Vec<Arc<Flag>> = (0..3)
            .map(|_| Arc::new(Flag(std::sync::atomic::AtomicBool::new(false))))
            .collect();
        for flag in &flags {
            cell.register_waiter(WaiterId::next(), flag.clone() as Arc<dyn Notify>);
        }
        cell.wake_all();
        assert_eq!(cell.waiter_count(), 0);
        for flag in &flags {
            assert!(flag.0.load(Ordering::SeqCst), "every waiter must be woken");
        }
    }
}
