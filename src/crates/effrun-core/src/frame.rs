//! Continuation frames
//!
//! The kontinuation is a stack of frames awaiting a value or an error.
//! A handler that delegates control pushes a frame; when the delegated
//! program finishes, the evaluator pops frames top-down, calling
//! [`Frame::on_value`] or [`Frame::on_error`] until a frame redirects
//! (returns [`FrameResult::Run`]) or the stack empties and the task
//! completes.
//!
//! User-defined frames are first-class: the evaluator drives every
//! frame - built-in or not - through the same trait. A frame that
//! restores state must do so on *both* paths; see [`LocalFrame`] for
//! the canonical shape.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::effect::{Effect, InterceptFn};
use crate::env::Env;
use crate::error::EffectError;
use crate::handle::{PromiseId, TaskId};
use crate::outcome::Outcome;
use crate::program::{Kleisli, KleisliCall, Program};
use crate::services::RunServices;
use crate::store::SharedStore;
use crate::value::Value;
use crate::vm::scheduler::SchedCore;

/// What a frame decided to do with a value or error.
#[derive(Debug)]
pub enum FrameResult {
    /// Keep unwinding with this value.
    Value(Value),
    /// Keep unwinding with this error.
    Fault(EffectError),
    /// Stop unwinding and run this program in the frame's place.
    Run(Program),
}

/// Context handed to a frame while it reacts.
pub struct FrameCx<'a> {
    /// The owning task's environment; restorative frames write here.
    pub env: &'a mut Env,
    /// The owning task's store handle.
    pub store: &'a SharedStore,
    /// Run-wide services: log, env cache, clock.
    pub services: &'a RunServices,
    /// Scheduler core, for frames that resolve promises.
    pub sched: &'a mut SchedCore,
    /// The owning task.
    pub task: TaskId,
}

/// A typed continuation element.
pub trait Frame: Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// React to the value produced beneath this frame.
    fn on_value(&mut self, value: Value, cx: &mut FrameCx<'_>) -> FrameResult;

    /// React to an error unwinding through this frame. The default
    /// passes it on.
    fn on_error(&mut self, error: EffectError, cx: &mut FrameCx<'_>) -> FrameResult {
        let _ = cx;
        FrameResult::Fault(error)
    }

    /// Intercept transforms this frame contributes to effect dispatch.
    fn transforms(&self) -> Option<&Arc<[InterceptFn]>> {
        None
    }

    /// A copy of this frame for a child task's kontinuation base.
    /// Only intercepting frames propagate.
    fn clone_for_child(&self) -> Option<Box<dyn Frame>> {
        None
    }

    /// Whether the frame stays on the stack after redirecting with
    /// [`FrameResult::Run`]. Collection frames that expect further
    /// values return `true`; one-shot continuations keep the default.
    fn persists(&self) -> bool {
        false
    }
}

/// Delivers a value into a [`Kleisli`] continuation.
pub struct BindFrame {
    pub(crate) k: Kleisli,
}

impl Frame for BindFrame {
    fn name(&self) -> &str {
        "bind"
    }

    fn on_value(&mut self, value: Value, _cx: &mut FrameCx<'_>) -> FrameResult {
        match self.k.apply(value) {
            Ok(next) => FrameResult::Run(next),
            Err(e) => FrameResult::Fault(e),
        }
    }
}

/// Converts completion into an [`Outcome`] instead of unwinding.
pub struct SafeFrame;

impl Frame for SafeFrame {
    fn name(&self) -> &str {
        "safe"
    }

    fn on_value(&mut self, value: Value, _cx: &mut FrameCx<'_>) -> FrameResult {
        FrameResult::Value(Outcome::Ok(value).into())
    }

    fn on_error(&mut self, error: EffectError, _cx: &mut FrameCx<'_>) -> FrameResult {
        FrameResult::Value(Outcome::Err(error).into())
    }
}

/// Restores the environment saved before a `Local` scope, on both the
/// value and the error path.
pub struct LocalFrame {
    pub(crate) saved: Env,
}

impl Frame for LocalFrame {
    fn name(&self) -> &str {
        "local"
    }

    fn on_value(&mut self, value: Value, cx: &mut FrameCx<'_>) -> FrameResult {
        *cx.env = self.saved.clone();
        FrameResult::Value(value)
    }

    fn on_error(&mut self, error: EffectError, cx: &mut FrameCx<'_>) -> FrameResult {
        *cx.env = self.saved.clone();
        FrameResult::Fault(error)
    }
}

/// Collects the log entries appended since the `Listen` began.
///
/// Entries stay in the global log - an outer Listen sees them too. On
/// the error path nothing is collected; written entries persist.
pub struct ListenFrame {
    pub(crate) from: usize,
}

impl Frame for ListenFrame {
    fn name(&self) -> &str {
        "listen"
    }

    fn on_value(&mut self, value: Value, cx: &mut FrameCx<'_>) -> FrameResult {
        let appended = cx.services.log.slice_from(self.from);
        FrameResult::Value(Value::record([
            ("value", value),
            ("log", Value::List(appended)),
        ]))
    }
}

/// Holds intercept transforms consulted at effect dispatch. Transparent
/// to values and errors.
pub struct InterceptFrame {
    pub(crate) transforms: Arc<[InterceptFn]>,
}

impl Frame for InterceptFrame {
    fn name(&self) -> &str {
        "intercept"
    }

    fn on_value(&mut self, value: Value, _cx: &mut FrameCx<'_>) -> FrameResult {
        FrameResult::Value(value)
    }

    fn transforms(&self) -> Option<&Arc<[InterceptFn]>> {
        Some(&self.transforms)
    }

    fn clone_for_child(&self) -> Option<Box<dyn Frame>> {
        Some(Box::new(InterceptFrame {
            transforms: self.transforms.clone(),
        }))
    }
}

/// Turn one gather item into the program that produces its value.
pub(crate) fn item_program(item: &Value) -> Result<Program, EffectError> {
    if let Value::Program(p) = item {
        return Ok((**p).clone());
    }
    if item.waitable().is_some() {
        return Ok(Program::Effect(Effect::Wait {
            future: item.clone(),
        }));
    }
    Err(EffectError::invalid(
        "gather items must be programs, futures or tasks",
    ))
}

/// Sequential gather: runs the items one after another inside the
/// dispatching task, in input order, failing fast. Used by the presets
/// without task-level parallelism.
pub struct GatherFrame {
    pub(crate) pending: VecDeque<Value>,
    pub(crate) acc: Vec<Value>,
}

impl Frame for GatherFrame {
    fn name(&self) -> &str {
        "gather"
    }

    fn on_value(&mut self, value: Value, _cx: &mut FrameCx<'_>) -> FrameResult {
        self.acc.push(value);
        match self.pending.pop_front() {
            Some(item) => match item_program(&item) {
                Ok(p) => FrameResult::Run(p),
                Err(e) => FrameResult::Fault(e),
            },
            None => FrameResult::Value(Value::List(std::mem::take(&mut self.acc))),
        }
    }

    fn persists(&self) -> bool {
        true
    }
}

/// Resolves one program-valued argument of a [`KleisliCall`], then
/// hands the updated call back to the evaluator for the next one.
pub struct ArgResolveFrame {
    pub(crate) call: KleisliCall,
    pub(crate) index: usize,
}

impl Frame for ArgResolveFrame {
    fn name(&self) -> &str {
        "resolve-arg"
    }

    fn on_value(&mut self, value: Value, _cx: &mut FrameCx<'_>) -> FrameResult {
        let mut call = self.call.clone();
        call.args[self.index] = value;
        // Mark the position resolved so a program-valued result is not
        // resolved a second time.
        let mut declared: Vec<usize> = call.program_params.to_vec();
        declared.push(self.index);
        call.program_params = declared.into();
        FrameResult::Run(Program::Call(call))
    }
}

/// Completes a lazy environment resolution: records the value in the
/// run-shared cache and resolves the promise other askers parked on.
pub struct EnvCacheFrame {
    pub(crate) key: String,
    pub(crate) program: Arc<Program>,
    pub(crate) promise: PromiseId,
}

impl Frame for EnvCacheFrame {
    fn name(&self) -> &str {
        "env-cache"
    }

    fn on_value(&mut self, value: Value, cx: &mut FrameCx<'_>) -> FrameResult {
        cx.services
            .env_cache
            .finish(&self.key, &self.program, value.clone());
        let _ = cx.sched.resolve_promise(self.promise, Outcome::Ok(value.clone()));
        FrameResult::Value(value)
    }

    fn on_error(&mut self, error: EffectError, cx: &mut FrameCx<'_>) -> FrameResult {
        cx.services.env_cache.clear(&self.key, &self.program);
        let _ = cx
            .sched
            .resolve_promise(self.promise, Outcome::Err(error.clone()));
        FrameResult::Fault(error)
    }
}

/// Clone the intercepting frames of a kontinuation, outer-to-inner, as
/// the base stack of a child task.
pub(crate) fn child_frames(kont: &[Box<dyn Frame>]) -> Vec<Box<dyn Frame>> {
    kont.iter().filter_map(|f| f.clone_for_child()).collect()
}
