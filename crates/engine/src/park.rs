//! Blocking manager for `Retry`
//!
//! When an attempt blocks, the calling thread must sleep until one of the
//! variables the attempt read is committed with a new value, then re-run
//! the whole transaction from the top. Partial progress is never resumed.
//!
//! ## The missed-wakeup window
//!
//! Between the attempt reading a variable and its waiter being registered,
//! a concurrent transaction may commit that variable. Its broadcast cannot
//! reach a waiter that is not registered yet, so parking naively would
//! sleep through the very change it is waiting for. The protocol closes
//! the window by re-checking every read version *after* registration:
//!
//! ```text
//! 1. Register the latch on every cell in the blocked read set
//! 2. Re-read each cell's version
//!    - any version moved: a commit slipped in; skip the sleep entirely
//!    - otherwise: sleep on the latch
//! 3. Deregister from every cell (always — on wake, on skip, on timeout)
//! ```
//!
//! A commit that lands before step 1 is caught by step 2; one that lands
//! after step 1 finds the latch registered and signals it. Either way the
//! transaction re-runs.
//!
//! Deregistration in step 3 is the required cleanup path: waiter entries
//! must not leak, including when an external collaborator gives up on the
//! wait via [`RetryLatch::wait_for`].

use crate::log::ReadStamp;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use txvar_core::{Notify, WaiterId};

/// Resumption handle for one park: a flag plus a condvar.
///
/// A latch is signalled at most meaningfully once; the sleeping side only
/// cares that *some* watched variable changed, not which or how often.
/// `wait_for` is the hook an external timeout collaborator needs — a timed
/// out wait simply behaves like a wake and re-runs the transaction.
pub struct RetryLatch {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl RetryLatch {
    /// Fresh, unsignalled latch.
    pub fn new() -> Self {
        RetryLatch {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Mark the latch signalled and wake every sleeper.
    pub fn signal(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.condvar.notify_all();
    }

    /// Sleep until the latch is signalled.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.condvar.wait(&mut signalled);
        }
    }

    /// Sleep until the latch is signalled or `timeout` elapses. Returns
    /// whether the latch was signalled.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            let _ = self.condvar.wait_for(&mut signalled, timeout);
        }
        *signalled
    }
}

impl Default for RetryLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Notify for RetryLatch {
    fn notify(&self) {
        self.signal();
    }
}

/// Park the calling thread until one of the stamped variables changes.
///
/// Returns when the transaction should be re-run from the top. A blocked
/// attempt with an empty read set can never be woken; that is a documented
/// caller-side livelock (`retry` without reading anything), and this
/// function will sleep forever on it.
pub fn park_on(stamps: &[ReadStamp]) {
    if stamps.is_empty() {
        tracing::warn!("transaction blocked with an empty read set; nothing can ever wake it");
    }

    let latch = Arc::new(RetryLatch::new());
    let waiter = WaiterId::next();
    for stamp in stamps {
        stamp.cell.register_waiter(waiter, latch.clone());
    }

    // Close the missed-wakeup window: a commit that landed between the
    // attempt's reads and the registrations above already changed a
    // version, and its broadcast may have missed us.
    let already_changed = stamps.iter().any(|stamp| {
        let slot = stamp.cell.lock_slot();
        slot.version != stamp.read_version
    });

    if !already_changed {
        latch.wait();
    }

    for stamp in stamps {
        stamp.cell.deregister_waiter(waiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit;
    use crate::log::TxLog;
    use std::thread;
    use txvar_core::{pack, VarCell};

    #[test]
    fn test_latch_signal_then_wait_returns() {
        let latch = RetryLatch::new();
        latch.signal();
        latch.wait();
    }

    #[test]
    fn test_latch_wait_for_times_out() {
        let latch = RetryLatch::new();
        assert!(!latch.wait_for(Duration::from_millis(20)));
    }

    #[test]
    fn test_latch_wait_for_sees_signal() {
        let latch = Arc::new(RetryLatch::new());
        let signaller = latch.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal();
        });
        assert!(latch.wait_for(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_park_returns_immediately_when_version_already_moved() {
        let cell = VarCell::new(pack(0i64));
        let stamps = vec![ReadStamp {
            cell: cell.clone(),
            read_version: 0,
        }];

        // A commit lands after the attempt read the cell but before it
        // parks; the version check must skip the sleep.
        let mut log = TxLog::new();
        log.write(&cell, pack(1i64));
        commit(&log).unwrap();

        park_on(&stamps);
        assert_eq!(cell.waiter_count(), 0, "waiter entries must not leak");
    }

    #[test]
    fn test_park_wakes_on_commit_and_deregisters_everywhere() {
        let a = VarCell::new(pack(0i64));
        let b = VarCell::new(pack(0i64));
        let stamps = vec![
            ReadStamp {
                cell: a.clone(),
                read_version: 0,
            },
            ReadStamp {
                cell: b.clone(),
                read_version: 0,
            },
        ];

        let a_writer = a.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let mut log = TxLog::new();
            log.write(&a_writer, pack(1i64));
            commit(&log).unwrap();
        });

        park_on(&stamps);
        writer.join().unwrap();

        // Woken via a; the entry on b must be cleaned up too.
        assert_eq!(a.waiter_count(), 0);
        assert_eq!(b.waiter_count(), 0);
    }
}
