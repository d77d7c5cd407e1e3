//! Trampolined program interpreter
//!
//! Executes a `Program` against a fresh [`TxLog`] and reports one of three
//! outcomes: the attempt succeeded, blocked, or failed with a user abort.
//!
//! The interpreter never recurses into the program tree. `Bind` chains can
//! be arbitrarily long (they are how loops are expressed in the algebra),
//! so evaluation keeps an explicit stack of pending frames and runs a flat
//! step loop — constant call-stack space regardless of program depth.
//!
//! ## Branch isolation
//!
//! `OrElse` and `HandleError` both fork the log before running their first
//! sub-program:
//! - an `OrElse` left branch that blocks is discarded wholesale; the right
//!   branch starts from the pre-branch log, and if it blocks too the
//!   combination blocks on the union of both branches' read sets;
//! - a `HandleError` body that aborts is rolled back before the handler
//!   runs, so a caught abort leaves no buffered writes behind.
//!
//! On success the live (forked) log is simply adopted; the saved copies are
//! dropped as the frames pop.

use crate::log::{ReadStamp, TxLog};
use std::collections::BTreeMap;
use txvar_core::{
    pack, unit, AbortError, Continuation, DynValue, ErrorHandler, Program, RawVar, VarCell, VarId,
};

/// Result of one interpreter run.
pub enum Outcome {
    /// The attempt produced a value; the log is ready for validation.
    Success(DynValue, TxLog),
    /// The attempt hit `Retry`; the transaction must park until one of
    /// these variables is committed with a new value, then restart.
    Blocked(Vec<ReadStamp>),
    /// The attempt raised an uncaught abort. Nothing may be committed.
    Failed(AbortError),
}

impl Outcome {
    /// Tag name, for diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Success(_, _) => "Success",
            Outcome::Blocked(_) => "Blocked",
            Outcome::Failed(_) => "Failed",
        }
    }
}

/// Pending work between a sub-program and the rest of the transaction.
enum Frame {
    /// Continuation of a `Bind`, waiting for the previous step's value.
    Then(Continuation),
    /// Handler of a `HandleError`, with the log to restore if the body
    /// aborts.
    Catch { handler: ErrorHandler, saved: TxLog },
    /// Right branch of an `OrElse`, with the log to restore if the left
    /// branch blocks.
    TryRight { right: Box<Program>, saved: TxLog },
    /// Read set of an already-blocked left branch, carried while the right
    /// branch runs so a second block reports the union.
    UnionReads(BTreeMap<VarId, ReadStamp>),
}

enum Step {
    Continue(Program),
    Done(Outcome),
}

/// One interpreter activation: a frame stack plus the attempt's log.
pub struct Machine {
    stack: Vec<Frame>,
    log: TxLog,
}

impl Machine {
    /// Start a machine over a (normally fresh) log.
    pub fn new(log: TxLog) -> Self {
        Machine {
            stack: Vec::new(),
            log,
        }
    }

    /// Run `program` to an [`Outcome`].
    pub fn run(mut self, program: Program) -> Outcome {
        let mut current = program;
        loop {
            let step = match current {
                Program::Pure(value) => self.deliver(value),
                Program::Alloc(initial) => {
                    // Outside the log: a fresh cell is unreachable by any
                    // other transaction until this one commits, so it can
                    // neither conflict nor need validation.
                    let cell = VarCell::new(initial);
                    self.deliver(pack(RawVar(cell)))
                }
                Program::Get(cell) => {
                    let value = self.log.read(&cell);
                    self.deliver(value)
                }
                Program::Modify(cell, update) => {
                    let value = self.log.read(&cell);
                    self.log.write(&cell, update(value));
                    self.deliver(unit())
                }
                Program::Bind(first, continuation) => {
                    self.stack.push(Frame::Then(continuation));
                    Step::Continue(*first)
                }
                Program::HandleError(body, handler) => {
                    self.stack.push(Frame::Catch {
                        handler,
                        saved: self.log.fork(),
                    });
                    Step::Continue(*body)
                }
                Program::OrElse(left, right) => {
                    self.stack.push(Frame::TryRight {
                        right,
                        saved: self.log.fork(),
                    });
                    Step::Continue(*left)
                }
                Program::Abort(error) => self.fail(error),
                Program::Retry => self.block(),
            };
            match step {
                Step::Continue(next) => current = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    /// A step produced a value: hand it to the nearest pending
    /// continuation, or finish the attempt. Catch/OrElse bookkeeping on
    /// the way down is dropped — success adopts the live log.
    fn deliver(&mut self, value: DynValue) -> Step {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Then(continuation) => return Step::Continue(continuation(value)),
                Frame::Catch { .. } | Frame::TryRight { .. } | Frame::UnionReads(_) => {}
            }
        }
        Step::Done(Outcome::Success(value, std::mem::take(&mut self.log)))
    }

    /// An abort is unwinding: skip pending continuations and alternative
    /// branches until a handler catches it. The handler runs against the
    /// log saved before its body started, rolling the body's buffered
    /// writes back.
    fn fail(&mut self, error: AbortError) -> Step {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Catch { handler, saved } => {
                    self.log = saved;
                    return Step::Continue(handler(error));
                }
                Frame::Then(_) | Frame::TryRight { .. } | Frame::UnionReads(_) => {}
            }
        }
        Step::Done(Outcome::Failed(error))
    }

    /// A `Retry` is unwinding: the blocked read set starts as everything
    /// this attempt has touched, grows by the read sets of earlier blocked
    /// branches, and is either rescued by a pending `OrElse` right branch
    /// or reported as the final blocked outcome.
    fn block(&mut self) -> Step {
        let mut blocked = self.log.read_stamps();
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::UnionReads(reads) => {
                    for (id, stamp) in reads {
                        blocked.entry(id).or_insert(stamp);
                    }
                }
                Frame::TryRight { right, saved } => {
                    self.log = saved;
                    self.stack.push(Frame::UnionReads(blocked));
                    return Step::Continue(*right);
                }
                Frame::Then(_) | Frame::Catch { .. } => {}
            }
        }
        Step::Done(Outcome::Blocked(blocked.into_values().collect()))
    }
}

/// Convenience: run a program against a fresh log.
pub fn interpret(program: Program) -> Outcome {
    Machine::new(TxLog::new()).run(program)
}
