//! # txvar
//!
//! Composable software transactional memory for threads.
//!
//! txvar lets you compose arbitrary read/modify sequences over shared
//! mutable cells ([`TVar`]s) and run them as atomic, isolated
//! transactions. A transaction is a value of type [`Stm<T>`]; nothing
//! happens until [`atomically`] runs it. Conflicting transactions are
//! re-run automatically, and a transaction that cannot proceed yet can
//! [`Stm::retry`], parking its thread until a variable it read changes.
//!
//! ## Quick start
//!
//! ```
//! use txvar::{atomically, Stm, TVar};
//!
//! let account = TVar::new(100i64);
//!
//! // Withdraw 30, blocking until the balance covers it.
//! let remaining = atomically(|| {
//!     let account = account.clone();
//!     account.get().bind(move |balance| {
//!         if balance < 30 {
//!             Stm::retry()
//!         } else {
//!             account.set(balance - 30).bind(move |_| Stm::pure(balance - 30))
//!         }
//!     })
//! }).unwrap();
//!
//! assert_eq!(remaining, 70);
//! ```
//!
//! ## Guarantees
//!
//! - **Atomicity** — either every write in a transaction commits or none
//!   does; external readers never observe a transaction mid-flight.
//! - **Isolation** — committed transactions are serializable over the
//!   variables they touch.
//! - **Composability** — [`Stm::or_else`] tries an alternative when a
//!   branch blocks; [`Stm::handle_error`] catches an [`Stm::abort`] and
//!   rolls the aborted branch's writes back.
//!
//! ## Rules
//!
//! A transaction may be re-run any number of times, so the closures passed
//! to `bind`, `modify`, and the `atomically` factory must be pure: no I/O,
//! no locking, no mutation outside the transaction's own variables.
//!
//! This crate is in-memory only: no durability, no distribution, and only
//! `TVar` reads/writes are tracked.

#![warn(missing_docs)]

mod stm;
mod var;

pub mod prelude;

pub use stm::{atomically, Stm};
pub use var::TVar;

// Re-export the pieces of the engine surface a caller can meet.
pub use txvar_core::{AbortError, Transactable, VarId};
