//! The host bridge: `Await`
//!
//! `Await` is the only crossing between programs and host futures. The
//! handler allocates a promise, hands the future to the preset's
//! external executor and parks the task on the promise; the executor
//! reports through the external-completion queue when the future
//! settles. Under the synchronous preset the future runs on the bridge
//! thread while other tasks keep stepping; under the asynchronous
//! preset it runs on the caller's loop, so awaits genuinely overlap.

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::vm::task::Resume;

/// Serves `Await`.
pub struct BridgeHandler {
    supported: bool,
}

impl BridgeHandler {
    /// A bridge wired to the preset's external executor.
    pub fn supported() -> BridgeHandler {
        BridgeHandler { supported: true }
    }

    /// The simulation preset's bridge: every `Await` fails with
    /// [`EffectError::AwaitUnsupported`].
    pub fn unsupported() -> BridgeHandler {
        BridgeHandler { supported: false }
    }
}

impl EffectHandler for BridgeHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Await { factory } => {
                if !self.supported {
                    return Ok(Dispatch::Fault(EffectError::AwaitUnsupported));
                }
                let promise = cx.sched.new_promise();
                cx.sched.begin_external();
                cx.services
                    .executor
                    .submit(factory.build(), promise, cx.services.sender.clone());
                Ok(Dispatch::Park {
                    futures: vec![promise],
                    resume: Resume::Deliver(promise),
                })
            }
            other => Err(EffectError::invalid(format!(
                "bridge handler got {:?}",
                other.kind()
            ))),
        }
    }
}
