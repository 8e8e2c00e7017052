//! State effects: `Get`, `Put` and `Modify`
//!
//! State is working data, initialised incrementally: `Get` of an absent
//! key reads as JSON null instead of raising (the environment is the
//! one that raises - configuration gaps are bugs, state gaps are
//! normal).
//!
//! `Modify` is the read-modify-write primitive. A bare `Get` followed
//! by `Put` is *not* atomic when other tasks can interleave at the
//! yield between them; `Modify` performs both inside one dispatch.

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::store::LOG_KEY;
use crate::value::Value;

/// Serves `Get`, `Put` and `Modify`.
pub struct StateHandler;

impl EffectHandler for StateHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Get { key } => {
                if key == LOG_KEY {
                    return Ok(Dispatch::Value(Value::List(cx.services.log.snapshot())));
                }
                let value = cx
                    .task
                    .store
                    .lock()
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(Value::null);
                Ok(Dispatch::Value(value))
            }
            Effect::Put { key, value } => {
                cx.task.store.lock().insert(key, value);
                Ok(Dispatch::Value(Value::null()))
            }
            Effect::Modify { key, f } => {
                let mut store = cx.task.store.lock();
                let current = store.get(&key).cloned().unwrap_or_else(Value::null);
                match f.apply(current) {
                    Ok(next) => {
                        store.insert(key, next.clone());
                        Ok(Dispatch::Value(next))
                    }
                    // The transform failed: the store stays untouched.
                    Err(e) => Ok(Dispatch::Fault(e)),
                }
            }
            other => Err(EffectError::invalid(format!(
                "state handler got {:?}",
                other.kind()
            ))),
        }
    }
}
