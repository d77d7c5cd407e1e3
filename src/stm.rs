//! Typed transaction values and the `atomically` entry point
//!
//! [`Stm<T>`] is a phantom-typed wrapper over the untyped program algebra
//! in `txvar-core`. The wrapper is the crate's type-safety boundary: it is
//! the only constructor of programs, every value it packs is unpacked with
//! the same type on the other side of a continuation, and the engine never
//! inspects payloads.

use std::any::Any;
use std::marker::PhantomData;
use txvar_core::{pack, unpack, AbortError, Program, Transactable};
use txvar_engine::run_to_completion;

/// A transaction producing a `T`, as an inert value.
///
/// Built from [`Stm::pure`], [`TVar`](crate::TVar) operations, and the
/// combinators below; executed only by [`atomically`]. Building one has no
/// effect of any kind.
pub struct Stm<T> {
    program: Program,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Transactable> Stm<T> {
    pub(crate) fn from_program(program: Program) -> Self {
        Stm {
            program,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_program(self) -> Program {
        self.program
    }

    /// A transaction that yields `value` without touching any variable.
    pub fn pure(value: T) -> Stm<T> {
        Stm::from_program(Program::Pure(pack(value)))
    }

    /// Sequence: run `self`, feed its result to `k`, run the transaction
    /// `k` returns. The fundamental composition operator; everything else
    /// (mapping, looping, sequencing sugar) can be built on top of it.
    pub fn bind<U, K>(self, k: K) -> Stm<U>
    where
        U: Transactable,
        K: FnOnce(T) -> Stm<U> + Send + 'static,
    {
        Stm::from_program(Program::Bind(
            Box::new(self.program),
            Box::new(move |value| k(unpack::<T>(value)).into_program()),
        ))
    }

    /// Alternative: run `self`; if it blocks, discard its buffered effects
    /// and run `other` instead. If both block, the combination blocks
    /// until a variable read by either branch changes.
    pub fn or_else(self, other: Stm<T>) -> Stm<T> {
        Stm::from_program(Program::OrElse(
            Box::new(self.program),
            Box::new(other.program),
        ))
    }

    /// Catch an abort raised inside `self` and run the recovery
    /// transaction `handler` returns. The aborted body's buffered writes
    /// are rolled back before the handler runs.
    pub fn handle_error<H>(self, handler: H) -> Stm<T>
    where
        H: FnOnce(AbortError) -> Stm<T> + Send + 'static,
    {
        Stm::from_program(Program::HandleError(
            Box::new(self.program),
            Box::new(move |error| handler(error).into_program()),
        ))
    }

    /// Block this transaction: park until some variable it has read
    /// changes, then restart it from the top.
    ///
    /// A `retry` before any read can never be woken — that transaction
    /// blocks forever, by design.
    pub fn retry() -> Stm<T> {
        Stm::from_program(Program::Retry)
    }

    /// Abort the transaction with `error`. Nothing is committed; the error
    /// surfaces from [`atomically`] unless an enclosing
    /// [`handle_error`](Stm::handle_error) catches it.
    pub fn abort<E: Any + Send + Sync>(error: E) -> Stm<T> {
        Stm::from_program(Program::Abort(AbortError::new(error)))
    }
}

/// Run a transaction atomically, blocking the calling thread until it
/// commits or aborts.
///
/// `factory` rebuilds the transaction for each attempt — conflicts and
/// wakeups after [`Stm::retry`] both restart from the top — so it must be
/// pure. There is no timeout parameter; a caller-imposed timeout belongs
/// to an external collaborator built on the engine's parking hook.
///
/// # Errors
///
/// Returns exactly the [`AbortError`] raised by an uncaught
/// [`Stm::abort`]. Conflicts and retries are recovered internally and
/// never surface.
pub fn atomically<T, F>(factory: F) -> Result<T, AbortError>
where
    T: Transactable,
    F: Fn() -> Stm<T>,
{
    run_to_completion(|| factory().into_program()).map(unpack::<T>)
}
