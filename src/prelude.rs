//! Convenience re-exports.
//!
//! ```
//! use txvar::prelude::*;
//!
//! let var = TVar::new(0i64);
//! let value = atomically(|| var.get()).unwrap();
//! assert_eq!(value, 0);
//! ```

pub use crate::{atomically, AbortError, Stm, TVar};
