//! Execution engine for txvar transactions
//!
//! This crate turns a `Program` value into a committed result:
//! - [`log`]: the per-attempt transaction log (read versions + buffered
//!   writes)
//! - [`machine`]: the trampolined interpreter producing an [`Outcome`]
//! - [`commit`]: optimistic validation and atomic application of a
//!   successful attempt's log
//! - [`park`]: the blocking manager behind `Retry`
//! - [`runtime`]: the driver loop wiring the above together
//!
//! Interpretation is lock-free with respect to other transactions: the only
//! lock an attempt takes is a cell's slot lock, momentarily, for its first
//! read of that cell. Contention is resolved at commit time, never during
//! user computation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit;
pub mod log;
pub mod machine;
pub mod park;
pub mod runtime;

pub use commit::{commit, CommitError};
pub use log::{LogEntry, ReadStamp, TxLog};
pub use machine::{Machine, Outcome};
pub use park::{park_on, RetryLatch};
pub use runtime::run_to_completion;
