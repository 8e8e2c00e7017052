//! Scoped semaphore permits
//!
//! The runtime does not release permits when a task fails - a bare
//! `acquire / run / release` leaks its permit whenever the middle
//! program raises. [`with_permit`] is the scoped idiom: the release
//! happens on the success path and the failure path both, and the
//! guarded program's outcome is then re-delivered.

use effrun_core::effect::{acquire_semaphore, release_semaphore, safe};
use effrun_core::error::EffectError;
use effrun_core::program::{pure, raise_error, Program};
use effrun_core::{Outcome, Value};

/// Acquire a permit from `semaphore`, run `program`, and release the
/// permit whether the program succeeded or raised. The program's value
/// is returned; its error is re-raised after the release.
pub fn with_permit(semaphore: Value, program: Program) -> Program {
    acquire_semaphore(semaphore.clone()).flat_map(move |_| {
        let semaphore = semaphore.clone();
        safe(program.clone()).flat_map(move |wrapped| {
            let wrapped = wrapped.clone();
            release_semaphore(semaphore.clone()).flat_map(move |_| {
                match wrapped.as_outcome() {
                    Some(Outcome::Ok(v)) => pure(v.clone()),
                    Some(Outcome::Err(e)) => raise_error(e.clone()),
                    None => raise_error(EffectError::raised("safe returned a non-outcome")),
                }
            })
        })
    })
}
