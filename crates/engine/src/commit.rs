//! Optimistic commit and conflict detection
//!
//! Validates a successful attempt's log against the shared cells and, if
//! every assumption still holds, applies the buffered writes atomically.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. Lock every touched cell's slot, in ascending VarId order
//! 2. Check each cell's version against the log's read_version
//! 3. Any mismatch: drop all locks, report Conflict (caller re-runs)
//! 4. All match: store each pending write, bump its cell's version by 1
//! 5. Drop all locks
//! 6. wake_all() on every written cell
//! ```
//!
//! The fixed lock order is what makes simultaneous multi-variable commits
//! deadlock-free; the log's `BTreeMap` hands the entries over already
//! sorted. Holding every lock across validation and application is what
//! makes the commit a single global instant: no other transaction can
//! observe one write of this log without the others, and none can commit a
//! conflicting version in between.
//!
//! Waiters are woken after the slot locks are released; the waiter
//! registries have their own locks, so a wake never contends with the next
//! commit's validation.

use crate::log::TxLog;
use parking_lot::MutexGuard;
use smallvec::SmallVec;
use thiserror::Error;
use txvar_core::{Slot, VarId};

/// Why a commit was refused. Internal to the engine: the runtime always
/// recovers by re-running the transaction, and callers never see this.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A concurrent transaction committed a variable this attempt read.
    #[error("version conflict on {var}: read at {read_version}, now {current_version}")]
    Conflict {
        /// The variable that moved.
        var: VarId,
        /// Version the attempt observed.
        read_version: u64,
        /// Version found at validation.
        current_version: u64,
    },
}

/// Validate `log` and apply its pending writes.
///
/// On `Ok`, every buffered write is committed (with its cell's version
/// bumped by one) and every waiter of every written cell has been woken.
/// On `Err`, nothing was changed and the caller must discard the log and
/// re-run the transaction against a fresh one.
pub fn commit(log: &TxLog) -> Result<(), CommitError> {
    let entries: Vec<_> = log.entries().collect();

    // Most transactions touch a handful of variables; keep the guards
    // inline. Entries arrive sorted by VarId, which is the global lock
    // order.
    let mut guards: SmallVec<[MutexGuard<'_, Slot>; 8]> = SmallVec::new();
    for entry in &entries {
        guards.push(entry.cell.lock_slot());
    }

    for (entry, guard) in entries.iter().zip(guards.iter()) {
        if guard.version != entry.read_version {
            return Err(CommitError::Conflict {
                var: entry.cell.id(),
                read_version: entry.read_version,
                current_version: guard.version,
            });
        }
    }

    let mut written = Vec::new();
    for (entry, guard) in entries.iter().zip(guards.iter_mut()) {
        if entry.written {
            guard.value = entry.value.clone();
            guard.version += 1;
            written.push(&entry.cell);
        }
    }
    drop(guards);

    tracing::trace!(touched = entries.len(), written = written.len(), "commit applied");
    for cell in written {
        cell.wake_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::TxLog;
    use txvar_core::{pack, unpack, VarCell};

    #[test]
    fn test_commit_applies_writes_and_bumps_versions() {
        let cell = VarCell::new(pack(1i64));
        let mut log = TxLog::new();
        log.read(&cell);
        log.write(&cell, pack(2i64));
        commit(&log).unwrap();

        let (value, version) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), 2);
        assert_eq!(version, 1);
    }

    #[test]
    fn test_read_only_commit_leaves_version_alone() {
        let cell = VarCell::new(pack(1i64));
        let mut log = TxLog::new();
        log.read(&cell);
        commit(&log).unwrap();

        let (_, version) = cell.committed_snapshot();
        assert_eq!(version, 0, "a read must not bump the version");
    }

    #[test]
    fn test_stale_read_is_a_conflict() {
        let cell = VarCell::new(pack(1i64));
        let mut stale = TxLog::new();
        stale.read(&cell);
        stale.write(&cell, pack(10i64));

        // A competing transaction commits first.
        let mut winner = TxLog::new();
        winner.write(&cell, pack(5i64));
        commit(&winner).unwrap();

        match commit(&stale) {
            Err(CommitError::Conflict {
                var,
                read_version,
                current_version,
            }) => {
                assert_eq!(var, cell.id());
                assert_eq!(read_version, 0);
                assert_eq!(current_version, 1);
            }
            Ok(()) => panic!("stale log must not commit"),
        }
        // First committer wins; the loser changed nothing.
        let (value, version) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), 5);
        assert_eq!(version, 1);
    }

    #[test]
    fn test_conflict_applies_no_partial_writes() {
        let a = VarCell::new(pack(0i64));
        let b = VarCell::new(pack(0i64));

        let mut log = TxLog::new();
        log.write(&a, pack(1i64));
        log.write(&b, pack(1i64));

        // Invalidate b after the log read it.
        let mut competing = TxLog::new();
        competing.write(&b, pack(7i64));
        commit(&competing).unwrap();

        assert!(commit(&log).is_err());
        let (a_value, a_version) = a.committed_snapshot();
        assert_eq!(unpack::<i64>(a_value), 0, "no write may land on a conflict");
        assert_eq!(a_version, 0);
    }

    #[test]
    fn test_commit_wakes_written_cells_only() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use txvar_core::{Notify, WaiterId};

        struct Counter(AtomicUsize);
        impl Notify for Counter {
            fn notify(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let read_cell = VarCell::new(pack(0i64));
        let written_cell = VarCell::new(pack(0i64));
        let on_read = Arc::new(Counter(AtomicUsize::new(0)));
        let on_written = Arc::new(Counter(AtomicUsize::new(0)));
        read_cell.register_waiter(WaiterId::next(), on_read.clone());
        written_cell.register_waiter(WaiterId::next(), on_written.clone());

        let mut log = TxLog::new();
        log.read(&read_cell);
        log.write(&written_cell, pack(1i64));
        commit(&log).unwrap();

        assert_eq!(on_written.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            on_read.0.load(Ordering::SeqCst),
            0,
            "read-only cells must not wake their waiters"
        );
    }
}
