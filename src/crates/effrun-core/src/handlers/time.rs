//! Time effects: `Delay`, `GetTime` and `WaitUntil`
//!
//! The three presets disagree about what a second is:
//!
//! - **Blocking** (synchronous preset): a real `thread::sleep`. The
//!   whole driver sleeps; cooperative tasks do not interleave during a
//!   delay.
//! - **EventLoop** (asynchronous preset): a tokio timer handed to the
//!   external executor. Only the delaying task parks; everything else
//!   keeps stepping.
//! - **Simulated**: the virtual clock jumps forward instantly. A run
//!   full of hour-long delays completes in microseconds, with
//!   `GetTime` reporting exactly where the delays put the clock.

use std::time::Duration;

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::value::Value;
use crate::vm::task::Resume;

/// Which notion of time a preset runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Real time, blocking sleeps.
    Blocking,
    /// Real time, non-blocking timers on the host event loop.
    EventLoop,
    /// Virtual time, advanced instantly.
    Simulated,
}

/// Store key mirroring the virtual clock during simulation runs.
pub const CURRENT_TIME_KEY: &str = "__current_time__";

/// Serves `Delay`, `GetTime` and `WaitUntil`.
pub struct TimeHandler {
    mode: TimeMode,
}

impl TimeHandler {
    pub fn new(mode: TimeMode) -> TimeHandler {
        TimeHandler { mode }
    }

    fn sleep(&self, seconds: f64, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Ok(Dispatch::Fault(EffectError::invalid(format!(
                "delay of {seconds} seconds"
            ))));
        }
        match self.mode {
            TimeMode::Blocking => {
                if seconds > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(seconds));
                }
                Ok(Dispatch::Value(Value::null()))
            }
            TimeMode::EventLoop => {
                if seconds == 0.0 {
                    // No timer; the implicit post-effect yield still
                    // gives the scheduler a turn.
                    return Ok(Dispatch::Value(Value::null()));
                }
                let promise = cx.sched.new_promise();
                cx.sched.begin_external();
                cx.services.executor.submit(
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                        Ok(Value::null())
                    }),
                    promise,
                    cx.services.sender.clone(),
                );
                Ok(Dispatch::Park {
                    futures: vec![promise],
                    resume: Resume::Deliver(promise),
                })
            }
            TimeMode::Simulated => {
                cx.services.clock.advance(seconds);
                cx.task
                    .store
                    .lock()
                    .insert(CURRENT_TIME_KEY, cx.services.clock.now());
                Ok(Dispatch::Value(Value::null()))
            }
        }
    }
}

impl EffectHandler for TimeHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Delay { seconds } => self.sleep(seconds, cx),
            Effect::GetTime => Ok(Dispatch::Value(Value::from(cx.services.clock.now()))),
            Effect::WaitUntil { target } => {
                let now = cx.services.clock.now();
                if target <= now {
                    return Ok(Dispatch::Value(Value::null()));
                }
                self.sleep(target - now, cx)
            }
            other => Err(EffectError::invalid(format!(
                "time handler got {:?}",
                other.kind()
            ))),
        }
    }
}
