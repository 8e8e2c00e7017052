//! Timeouts by racing against a timer
//!
//! Timeouts are not a runtime primitive; they compose from `Spawn`,
//! `Race`, `Delay` and explicit cancellation of the loser. This module
//! is that composition, packaged.

use effrun_core::effect::{cancel_task, delay, race, spawn};
use effrun_core::error::EffectError;
use effrun_core::program::{pure, raise_error, Program};
use effrun_core::Value;

/// Run `program` with an upper bound of `seconds`.
///
/// The program is spawned and raced against a timer; whichever loses
/// is cancelled. On timeout the result is a raised error naming the
/// bound. A program that fails before the bound propagates its own
/// error.
///
/// Most useful under the asynchronous preset, where the timer sleeps
/// without blocking the driver. Under the simulation preset the timer
/// completes instantly, so only programs that finish within their
/// first scheduling slices beat it.
pub fn timeout(program: Program, seconds: f64) -> Program {
    spawn(program).flat_map(move |main| {
        spawn(delay(seconds)).flat_map(move |timer| {
            let main = main.clone();
            let timer = timer.clone();
            race([main.clone(), timer.clone()]).flat_map(move |won| {
                let main_won = match (won.field("first"), main.waitable()) {
                    (Some(Value::Future(first)), Some(main_future)) => *first == main_future,
                    _ => false,
                };
                if main_won {
                    let value = won.field("value").cloned().unwrap_or_else(Value::null);
                    cancel_task(timer.clone()).then(pure(value))
                } else {
                    cancel_task(main.clone()).then(raise_error(EffectError::raised(format!(
                        "timed out after {seconds}s"
                    ))))
                }
            })
        })
    })
}
