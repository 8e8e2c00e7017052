//! Control effects: `Pure`, `Safe` and `Intercept`

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::frame::{InterceptFrame, SafeFrame};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};

/// Serves `Pure`, `Safe` and `Intercept`.
///
/// `Safe` is the local recovery boundary: an error that unwinds into
/// its frame becomes an `Err(..)` outcome value instead of continuing
/// up the stack. There is no rollback - store writes and log appends
/// made before the error stand. Nesting behaves accordingly:
/// `Safe(Safe(p))` yields `Ok(Err(..))` when `p` fails, never a
/// top-level `Err`.
pub struct ControlHandler;

impl EffectHandler for ControlHandler {
    fn handle(&self, effect: Effect, _cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Pure { value } => Ok(Dispatch::Value(value)),
            Effect::Safe { sub } => Ok(Dispatch::Push(Box::new(SafeFrame), (*sub).clone())),
            Effect::Intercept { sub, transforms } => Ok(Dispatch::Push(
                Box::new(InterceptFrame { transforms }),
                (*sub).clone(),
            )),
            other => Err(EffectError::invalid(format!(
                "control handler got {:?}",
                other.kind()
            ))),
        }
    }
}
