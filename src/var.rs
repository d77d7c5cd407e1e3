//! Typed transactional variables

use crate::stm::Stm;
use crate::Transactable;
use std::marker::PhantomData;
use std::sync::Arc;
use txvar_core::{pack, unpack, Program, RawVar, VarCell, VarId};

/// A shared mutable cell accessible only through transactions.
///
/// Cloning a `TVar` clones the handle, not the cell: all clones name the
/// same variable, and that is how a variable is shared across threads.
/// The current value can only be observed via [`TVar::get`] inside a
/// transaction; there is deliberately no unsynchronized peek.
pub struct TVar<T> {
    cell: Arc<VarCell>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        TVar {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Transactable> TVar<T> {
    /// Create a variable outside any transaction, for setup code.
    ///
    /// Inside a transaction, prefer [`TVar::alloc`]: its effect is rolled
    /// back with the rest of the transaction if it never commits.
    pub fn new(initial: T) -> TVar<T> {
        TVar {
            cell: VarCell::new(pack(initial)),
            _marker: PhantomData,
        }
    }

    /// Transactionally create a variable seeded with `initial`, yielding
    /// its handle.
    ///
    /// The new variable is unreachable outside the transaction until the
    /// transaction commits, so a discarded attempt leaves no trace of it.
    pub fn alloc(initial: T) -> Stm<TVar<T>> {
        Stm::from_program(Program::Bind(
            Box::new(Program::Alloc(pack(initial))),
            Box::new(|handle| {
                let raw = unpack::<RawVar>(handle);
                Program::Pure(pack(TVar::<T> {
                    cell: raw.0,
                    _marker: PhantomData,
                }))
            }),
        ))
    }

    /// Read the variable's value as this transaction sees it: the last
    /// value written in the same transaction, or else the committed value.
    pub fn get(&self) -> Stm<T> {
        Stm::from_program(Program::Get(self.cell.clone()))
    }

    /// Write `value` to the variable. Buffered until commit; a later
    /// [`get`](TVar::get) in the same transaction sees it immediately.
    pub fn set(&self, value: T) -> Stm<()> {
        self.modify(move |_| value)
    }

    /// Read-then-write with `f`. Like [`set`](TVar::set), the write is
    /// buffered until commit. `f` must be pure; it may run once per
    /// attempt.
    pub fn modify<F>(&self, f: F) -> Stm<()>
    where
        F: FnOnce(T) -> T + Send + 'static,
    {
        Stm::from_program(Program::Modify(
            self.cell.clone(),
            Box::new(move |value| pack(f(unpack::<T>(value)))),
        ))
    }

    /// Stable identity of this variable.
    pub fn id(&self) -> VarId {
        self.cell.id()
    }
}

impl<T> std::fmt::Debug for TVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TVar").field("id", &self.cell.id()).finish()
    }
}
