//! Transaction driver loop
//!
//! Glues the interpreter, the commit protocol, and the blocking manager
//! into the single entry point the facade exposes: run a transaction until
//! it either commits a value or surfaces an uncaught abort.
//!
//! Conflict re-runs are unbounded: validation failure is always recovered
//! by re-interpreting against a fresh log, never reported to the caller.
//! Under heavy contention this can starve a large transaction behind a
//! stream of small ones — a documented liveness risk, not a correctness
//! bug. A capped exponential backoff after repeated conflicts keeps the
//! pathological cases moving.

use crate::commit::commit;
use crate::log::TxLog;
use crate::machine::{Machine, Outcome};
use crate::park::park_on;
use std::time::Duration;
use txvar_core::{AbortError, DynValue, Program};

/// Drive a transaction to completion.
///
/// `factory` rebuilds the program for each attempt: a program is consumed
/// by interpretation, and a transaction may need any number of attempts
/// (conflicts, wakeups after blocking). Blocks the calling thread while
/// parked; returns the committed value or the uncaught abort.
pub fn run_to_completion<F>(mut factory: F) -> Result<DynValue, AbortError>
where
    F: FnMut() -> Program,
{
    let mut attempt: u64 = 0;
    let mut conflicts: u32 = 0;
    loop {
        attempt += 1;
        let outcome = Machine::new(TxLog::new()).run(factory());
        match outcome {
            Outcome::Success(value, log) => match commit(&log) {
                Ok(()) => {
                    tracing::trace!(attempt, "transaction committed");
                    return Ok(value);
                }
                Err(conflict) => {
                    conflicts += 1;
                    tracing::debug!(attempt, %conflict, "validation failed; re-running");
                    backoff(conflicts);
                }
            },
            Outcome::Blocked(stamps) => {
                tracing::debug!(attempt, vars = stamps.len(), "transaction blocked; parking");
                park_on(&stamps);
            }
            Outcome::Failed(error) => {
                // The log dies here; an abort never reaches commit.
                tracing::debug!(attempt, error = %error, "transaction aborted");
                return Err(error);
            }
        }
    }
}

/// The first few conflicts re-run immediately; after that, sleep with a
/// capped exponential backoff so hot loops back off each other.
fn backoff(conflicts: u32) {
    const SPIN_ATTEMPTS: u32 = 3;
    const BASE_MICROS: u64 = 50;
    const MAX_SHIFT: u32 = 6;

    if conflicts <= SPIN_ATTEMPTS {
        std::thread::yield_now();
        return;
    }
    let shift = (conflicts - SPIN_ATTEMPTS).min(MAX_SHIFT);
    std::thread::sleep(Duration::from_micros(BASE_MICROS << shift));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use txvar_core::{pack, unpack, VarCell};

    #[test]
    fn test_pure_transaction_commits_value() {
        let result = run_to_completion(|| Program::Pure(pack(5i64))).unwrap();
        assert_eq!(unpack::<i64>(result), 5);
    }

    #[test]
    fn test_write_becomes_visible_after_commit() {
        let cell = VarCell::new(pack(0i64));
        let target = cell.clone();
        run_to_completion(move || Program::Modify(target.clone(), Box::new(|_| pack(3i64))))
            .unwrap();
        let (value, version) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), 3);
        assert_eq!(version, 1);
    }

    #[test]
    fn test_abort_surfaces_without_committing() {
        let cell = VarCell::new(pack(0i64));
        let target = cell.clone();
        let result = run_to_completion(move || {
            Program::Bind(
                Box::new(Program::Modify(target.clone(), Box::new(|_| pack(9i64)))),
                Box::new(|_| Program::Abort(AbortError::new("no"))),
            )
        });
        assert!(result.is_err());
        let (value, version) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), 0, "aborted write must never commit");
        assert_eq!(version, 0);
    }

    #[test]
    fn test_blocked_transaction_resumes_after_commit() {
        let cell = VarCell::new(pack(0i64));
        let reader = cell.clone();
        let waiter = thread::spawn(move || {
            run_to_completion(move || {
                let c = reader.clone();
                Program::Bind(
                    Box::new(Program::Get(c)),
                    Box::new(|v| {
                        if unpack::<i64>(v.clone()) == 0 {
                            Program::Retry
                        } else {
                            Program::Pure(v)
                        }
                    }),
                )
            })
        });

        thread::sleep(std::time::Duration::from_millis(30));
        let writer = cell.clone();
        run_to_completion(move || Program::Modify(writer.clone(), Box::new(|_| pack(42i64))))
            .unwrap();

        let value = waiter.join().unwrap().unwrap();
        assert_eq!(unpack::<i64>(value), 42);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 200;

        let cell = VarCell::new(pack(0i64));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        run_to_completion(|| {
                            Program::Modify(
                                cell.clone(),
                                Box::new(|v| pack(unpack::<i64>(v) + 1)),
                            )
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (value, _) = cell.committed_snapshot();
        assert_eq!(unpack::<i64>(value), (THREADS * INCREMENTS) as i64);
    }
}
