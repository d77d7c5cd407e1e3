//! The transaction algebra
//!
//! A transaction is represented as a [`Program`]: an immutable tagged tree
//! with exactly nine variants. Representing the transaction as a value
//! (rather than executed code) is what lets the engine re-run it after a
//! conflict, restart it after a blocking retry, and race its `OrElse`
//! branches against forked logs.
//!
//! Constructing a program never executes anything: reads, writes, and
//! allocations become effects only when the interpreter in `txvar-engine`
//! walks the tree, and even then every effect is buffered in the attempt's
//! log until commit.
//!
//! The enum is deliberately the whole surface: the interpreter is a single
//! exhaustive match over these tags, so adding a variant without handling
//! it is a compile error.

use crate::error::AbortError;
use crate::tvar::VarCell;
use crate::value::DynValue;
use std::fmt;
use std::sync::Arc;

/// Continuation of a `Bind`: consumes the previous step's value and
/// produces the rest of the program.
pub type Continuation = Box<dyn FnOnce(DynValue) -> Program + Send>;

/// Recovery function of a `HandleError`: consumes the caught abort and
/// produces the recovery program.
pub type ErrorHandler = Box<dyn FnOnce(AbortError) -> Program + Send>;

/// Update function of a `Modify`: maps the current value to the new one.
pub type UpdateFn = Box<dyn FnOnce(DynValue) -> DynValue + Send>;

/// A transaction as a value.
///
/// See the module docs; one variant per primitive operation.
pub enum Program {
    /// Yield a precomputed value without touching any variable.
    Pure(DynValue),
    /// Create a fresh variable seeded with the value; yields its handle
    /// (a [`crate::RawVar`]). Allocation happens outside the log: a new
    /// cell cannot conflict because no other transaction can reach it
    /// before this one commits.
    Alloc(DynValue),
    /// Run the first program, then feed its result to the continuation.
    /// The fundamental composition operator.
    Bind(Box<Program>, Continuation),
    /// Run the body; if it raises an abort, feed the error to the handler
    /// and run the recovery program it returns.
    HandleError(Box<Program>, ErrorHandler),
    /// Read the variable through the attempt's log.
    Get(Arc<VarCell>),
    /// Read then write the variable, buffering the new value in the log;
    /// yields unit. The shared cell is untouched until commit.
    Modify(Arc<VarCell>, UpdateFn),
    /// Run the left program; if it blocks, discard its buffered effects
    /// and run the right one instead. If both block, the combination
    /// blocks on the union of both branches' read sets.
    OrElse(Box<Program>, Box<Program>),
    /// Abort the transaction with a user-visible error. Catchable only by
    /// an enclosing `HandleError`; nothing is ever committed.
    Abort(AbortError),
    /// Signal "cannot proceed now": block until some variable read so far
    /// changes, then restart the whole transaction from the top.
    Retry,
}

impl Program {
    /// Tag name, for diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Program::Pure(_) => "Pure",
            Program::Alloc(_) => "Alloc",
            Program::Bind(_, _) => "Bind",
            Program::HandleError(_, _) => "HandleError",
            Program::Get(_) => "Get",
            Program::Modify(_, _) => "Modify",
            Program::OrElse(_, _) => "OrElse",
            Program::Abort(_) => "Abort",
            Program::Retry => "Retry",
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Bind(first, _) => write!(f, "Bind({:?}, <continuation>)", first),
            Program::HandleError(body, _) => write!(f, "HandleError({:?}, <handler>)", body),
            Program::Get(cell) => write!(f, "Get({})", cell.id()),
            Program::Modify(cell, _) => write!(f, "Modify({}, <update>)", cell.id()),
            Program::OrElse(left, right) => write!(f, "OrElse({:?}, {:?})", left, right),
            other => f.write_str(other.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::pack;

    #[test]
    fn test_construction_is_pure() {
        // Building a Modify must not touch the cell; only the interpreter
        // (via the log, at commit) may change it.
        let cell = VarCell::new(pack(1i64));
        let _program = Program::Modify(cell.clone(), Box::new(|_| pack(99i64)));
        let (value, version) = cell.committed_snapshot();
        assert_eq!(crate::value::unpack::<i64>(value), 1);
        assert_eq!(version, 0);
    }

    #[test]
    fn test_tags_cover_all_variants() {
        let cell = VarCell::new(pack(0i64));
        let programs = vec![
            Program::Pure(pack(0i64)),
            Program::Alloc(pack(0i64)),
            Program::Bind(Box::new(Program::Retry), Box::new(Program::Pure)),
            Program::HandleError(
                Box::new(Program::Retry),
                Box::new(|e| Program::Abort(e)),
            ),
            Program::Get(cell.clone()),
            Program::Modify(cell, Box::new(|v| v)),
            Program::OrElse(Box::new(Program::Retry), Box::new(Program::Retry)),
            Program::Abort(AbortError::new(())),
            Program::Retry,
        ];
        let tags: Vec<&str> = programs.iter().map(|p| p.tag()).collect();
        assert_eq!(
            tags,
            vec![
                "Pure",
                "Alloc",
                "Bind",
                "HandleError",
                "Get",
                "Modify",
                "OrElse",
                "Abort",
                "Retry"
            ]
        );
    }

    #[test]
    fn test_debug_elides_closures() {
        let program = Program::Bind(Box::new(Program::Retry), Box::new(Program::Pure));
        assert_eq!(format!("{:?}", program), "Bind(Retry, <continuation>)");
    }
}
