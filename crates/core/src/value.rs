//! Type-erased transaction values
//!
//! Transactions are heterogeneous: one program may move integers, strings,
//! and user structs through the same log and the same cells. The engine
//! therefore stores every value as a [`DynValue`] (`Arc<dyn Any>`), and the
//! typed facade in the root crate downcasts at its boundary.
//!
//! The erasure is an internal contract: the typed facade is the only place
//! that constructs programs, so a value always carries the type the facade
//! expects. A failed downcast means that contract was broken and is treated
//! as a bug, not a recoverable error.

use std::any::Any;
use std::sync::Arc;

/// Type-erased value stored in cells, logs, and programs.
///
/// `Arc` keeps log forks and repeated reads cheap: cloning a `DynValue`
/// never clones the payload.
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// Marker for types that can live in a transactional variable.
///
/// `Clone` is required because reads hand the caller an owned copy while
/// the committed value stays in the cell. Blanket-implemented; users never
/// implement this directly.
pub trait Transactable: Any + Send + Sync + Clone {}

impl<T: Any + Send + Sync + Clone> Transactable for T {}

/// Erase a typed value.
pub fn pack<T: Transactable>(value: T) -> DynValue {
    Arc::new(value)
}

/// Recover a typed value from its erased form.
///
/// # Panics
///
/// Panics if `value` does not carry a `T`. The typed facade guarantees the
/// type of every value flowing through a program, so this fires only on an
/// engine bug.
pub fn unpack<T: Transactable>(value: DynValue) -> T {
    match value.downcast::<T>() {
        Ok(v) => (*v).clone(),
        Err(_) => panic!(
            "transaction value does not have the expected type {}",
            std::any::type_name::<T>()
        ),
    }
}

/// The erased unit value, yielded by writes.
pub fn unit() -> DynValue {
    Arc::new(())
}
