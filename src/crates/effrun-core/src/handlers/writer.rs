//! Writer effects: `Tell` and `Listen`

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::frame::ListenFrame;
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::value::Value;

/// Serves `Tell` and `Listen`.
///
/// The log is run-global and append-only. `Listen` does not carve its
/// entries out of the log - it records the current offset and returns
/// the slice appended while its sub-program ran, so an outer `Listen`
/// still observes the inner one's entries.
pub struct WriterHandler;

impl EffectHandler for WriterHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Tell { value } => {
                cx.services.log.append(value);
                Ok(Dispatch::Value(Value::null()))
            }
            Effect::Listen { sub } => Ok(Dispatch::Push(
                Box::new(ListenFrame {
                    from: cx.services.log.len(),
                }),
                (*sub).clone(),
            )),
            other => Err(EffectError::invalid(format!(
                "writer handler got {:?}",
                other.kind()
            ))),
        }
    }
}
