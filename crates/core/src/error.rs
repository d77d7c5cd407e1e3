//! Transaction abort errors
//!
//! [`AbortError`] is the only failure a caller of `atomically` can observe.
//! It is raised by the `Abort` program variant, carries an arbitrary
//! user-supplied payload, and is catchable inside a transaction by
//! `HandleError`. Conflicts and blocking are internal control signals and
//! never surface as errors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A user-raised failure that aborts the enclosing transaction.
///
/// The payload is an arbitrary `Any + Send + Sync` value chosen by the
/// caller of `abort`. No write buffered before the abort is ever committed,
/// whether or not the abort is caught.
///
/// Cloneable so the same error can flow both into an error handler and out
/// of `atomically`.
#[derive(Clone, Error)]
#[error("transaction aborted ({type_name})")]
pub struct AbortError {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl AbortError {
    /// Wrap a payload into an abort error.
    pub fn new<E: Any + Send + Sync>(payload: E) -> Self {
        AbortError {
            payload: Arc::new(payload),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Borrow the payload as a concrete type, if it has that type.
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Name of the payload type, as captured at the `abort` call site.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Take the erased payload.
    pub fn into_payload(self) -> Arc<dyn Any + Send + Sync> {
        self.payload
    }
}

impl fmt::Debug for AbortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortError")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
