//! Core types for the txvar STM engine
//!
//! This crate defines the data the engine operates on, with no execution
//! logic of its own:
//! - [`Program`]: the nine-variant transaction algebra (a transaction as a
//!   value, not executed code)
//! - [`VarCell`]: the versioned shared cell behind every transactional
//!   variable, including its waiter registry
//! - [`AbortError`]: the user-raised failure that aborts a transaction
//! - [`DynValue`]: the type-erased value representation shared by cells,
//!   logs, and programs
//!
//! The interpreter, transaction log, commit protocol, and blocking manager
//! live in `txvar-engine`; the typed public surface lives in the root
//! `txvar` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod program;
pub mod tvar;
pub mod value;

pub use error::AbortError;
pub use program::{Continuation, ErrorHandler, Program, UpdateFn};
pub use tvar::{Notify, RawVar, Slot, VarCell, VarId, WaiterId};
pub use value::{pack, unit, unpack, DynValue, Transactable};
