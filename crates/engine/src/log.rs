//! Per-attempt transaction log
//!
//! One [`TxLog`] per execution attempt. Each touched variable gets exactly
//! one entry recording the version it was first read at and the value the
//! attempt currently sees (which reflects this attempt's own buffered
//! writes). The shared cells are never mutated through the log; commit
//! consumes the entries and applies the pending writes in one atomic step.
//!
//! Entries live in a `BTreeMap` keyed by [`VarId`], so iterating the log
//! yields cells in the fixed global order the commit protocol locks them
//! in. Logs are cheap to fork (`OrElse`/`HandleError` branch isolation):
//! values are `Arc`-shared, so a fork copies only the map.

use std::collections::BTreeMap;
use std::sync::Arc;
use txvar_core::{DynValue, VarCell, VarId};

/// Log record for one variable.
#[derive(Clone)]
pub struct LogEntry {
    /// The cell this entry tracks.
    pub cell: Arc<VarCell>,
    /// Version observed when the attempt first touched the cell. Commit
    /// validates that the cell still has this version.
    pub read_version: u64,
    /// Value as this attempt sees it, including its own buffered writes.
    pub value: DynValue,
    /// Whether the attempt wrote the cell (and commit must apply `value`).
    pub written: bool,
}

/// A variable this attempt read, with the version it read it at.
///
/// The blocking manager registers on these and re-checks the versions after
/// registration to close the missed-wakeup window.
#[derive(Clone)]
pub struct ReadStamp {
    /// The watched cell.
    pub cell: Arc<VarCell>,
    /// Version the attempt observed.
    pub read_version: u64,
}

/// Per-attempt record of reads and buffered writes.
#[derive(Default)]
pub struct TxLog {
    entries: BTreeMap<VarId, LogEntry>,
}

impl TxLog {
    /// Fresh, empty log for a new attempt.
    pub fn new() -> Self {
        TxLog {
            entries: BTreeMap::new(),
        }
    }

    /// Read a variable through the log.
    ///
    /// First touch takes a single consistent value/version snapshot of the
    /// cell and records it; later touches return the recorded value, so a
    /// read after a buffered write sees that write without going anywhere
    /// near the shared cell.
    pub fn read(&mut self, cell: &Arc<VarCell>) -> DynValue {
        if let Some(entry) = self.entries.get(&cell.id()) {
            return entry.value.clone();
        }
        let (value, version) = cell.committed_snapshot();
        self.entries.insert(
            cell.id(),
            LogEntry {
                cell: cell.clone(),
                read_version: version,
                value: value.clone(),
                written: false,
            },
        );
        value
    }

    /// Buffer a write to a variable.
    ///
    /// An existing entry keeps its `read_version`; a write to an untouched
    /// cell establishes a read at the current version first, matching
    /// read-then-write semantics (so commit still validates it).
    pub fn write(&mut self, cell: &Arc<VarCell>, value: DynValue) {
        match self.entries.entry(cell.id()) {
            std::collections::btree_map::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.value = value;
                entry.written = true;
            }
            std::collections::btree_map::Entry::Vacant(vacant) => {
                let (_, version) = cell.committed_snapshot();
                vacant.insert(LogEntry {
                    cell: cell.clone(),
                    read_version: version,
                    value,
                    written: true,
                });
            }
        }
    }

    /// Fork the log for a branch that may need to be discarded
    /// (`OrElse` left branch, `HandleError` body).
    pub fn fork(&self) -> TxLog {
        TxLog {
            entries: self.entries.clone(),
        }
    }

    /// All entries, in ascending `VarId` order.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    /// Every touched variable with the version it was observed at.
    pub fn read_stamps(&self) -> BTreeMap<VarId, ReadStamp> {
        self.entries
            .iter()
            .map(|(id, entry)| {
                (
                    *id,
                    ReadStamp {
                        cell: entry.cell.clone(),
                        read_version: entry.read_version,
                    },
                )
            })
            .collect()
    }

    /// Number of touched variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the attempt touched any variable at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
