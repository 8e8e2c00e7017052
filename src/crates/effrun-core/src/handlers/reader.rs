//! Reader effects: `Ask` and `Local`

use std::sync::Arc;

use crate::effect::Effect;
use crate::env::CacheState;
use crate::error::{EffectError, Result};
use crate::frame::{EnvCacheFrame, LocalFrame};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::value::Value;
use crate::vm::task::Resume;

/// Serves `Ask` and `Local`.
///
/// Lazy bindings - environment values that are themselves programs -
/// are evaluated at most once per binding. The first asker evaluates
/// under an [`EnvCacheFrame`]; concurrent askers park on the cache
/// promise and receive the cached value, so a run never duplicates the
/// work and never falsely reports a dependency cycle.
pub struct ReaderHandler;

impl EffectHandler for ReaderHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Ask { key } => Ok(self.ask(&key, cx)),
            Effect::Local { overrides, sub } => {
                let saved = cx.task.env.clone();
                cx.task.env = saved.merged(overrides.iter());
                Ok(Dispatch::Push(Box::new(LocalFrame { saved }), (*sub).clone()))
            }
            other => Err(EffectError::invalid(format!(
                "reader handler got {:?}",
                other.kind()
            ))),
        }
    }
}

impl ReaderHandler {
    fn ask(&self, key: &str, cx: &mut EffectCx<'_>) -> Dispatch {
        let bound = match cx.task.env.get(key) {
            None => return Dispatch::Fault(EffectError::missing_env(key)),
            Some(v) => v.clone(),
        };
        let program = match bound {
            Value::Program(p) => p,
            plain => return Dispatch::Value(plain),
        };
        match cx.services.env_cache.lookup(key, &program) {
            Some(CacheState::Ready(v)) => Dispatch::Value(v),
            Some(CacheState::InFlight(promise)) => Dispatch::Park {
                futures: vec![promise],
                resume: Resume::Deliver(promise),
            },
            None => {
                let promise = cx.sched.new_promise();
                cx.services.env_cache.begin(key, Arc::clone(&program), promise);
                Dispatch::Push(
                    Box::new(EnvCacheFrame {
                        key: key.to_string(),
                        program: Arc::clone(&program),
                        promise,
                    }),
                    (*program).clone(),
                )
            }
        }
    }
}
