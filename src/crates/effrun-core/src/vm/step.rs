//! The stepping loop
//!
//! [`step_task`] advances one task for one scheduling slice: it pumps
//! pure program structure (binds, calls, value/error unwinding) freely,
//! and yields control back to the scheduler after one effect dispatch
//! so tasks interleave deterministically at effect boundaries.
//!
//! Every dispatched effect first traverses the intercept chain: the
//! transforms of every intercepting frame on the kontinuation,
//! outermost frame first, each frame's transforms in registration
//! order, first non-`None` answer wins. A substituted effect restarts
//! the traversal skipping the frame that produced it; a replacement
//! program runs in the effect's place and its own effects traverse the
//! full chain again.

use std::collections::HashSet;
use std::sync::Arc;

use crate::effect::{Effect, Transformed};
use crate::error::{EffectError, Result};
use crate::frame::{BindFrame, Frame, FrameCx, FrameResult};
use crate::handlers::{Dispatch, EffectCx, HandlerTable};
use crate::outcome::Outcome;
use crate::program::Program;
use crate::services::RunServices;
use crate::vm::scheduler::SchedCore;
use crate::vm::task::{Resume, TaskPoint, TaskState, TaskStatus};

/// Effects dispatched per scheduling slice before the implicit yield.
const EFFECT_BUDGET: u32 = 1;

/// How a slice ended.
pub(crate) enum StepResult {
    /// Budget exhausted; re-enqueue at the tail of the ready queue.
    Yielded,
    /// Parked on futures; the scheduler recorded the waits.
    Parked,
    /// The task completed.
    Finished { outcome: Outcome, cancelled: bool },
}

enum DispatchTarget {
    Effect(Effect),
    Program(Program),
}

fn intercept_pass(effect: Effect, kont: &[Box<dyn Frame>]) -> Result<DispatchTarget> {
    let mut skip: HashSet<usize> = HashSet::new();
    let mut current = effect;
    'restart: loop {
        for (i, frame) in kont.iter().enumerate() {
            if skip.contains(&i) {
                continue;
            }
            let Some(transforms) = frame.transforms() else {
                continue;
            };
            for transform in transforms.iter() {
                match transform.apply(&current)? {
                    None => {}
                    Some(Transformed::Effect(next)) => {
                        skip.insert(i);
                        current = next;
                        continue 'restart;
                    }
                    Some(Transformed::Program(p)) => {
                        return Ok(DispatchTarget::Program(p));
                    }
                }
            }
        }
        return Ok(DispatchTarget::Effect(current));
    }
}

/// Record where the fault originated, then raise it.
fn raise_into(task: &mut TaskState, error: EffectError) {
    task.fault_frames = Some(task.kont.iter().map(|f| f.name().to_string()).collect());
    task.point = TaskPoint::Raise(error);
}

/// Advance `task` (detached from the scheduler table) by one slice.
pub(crate) fn step_task(
    task: &mut TaskState,
    core: &mut SchedCore,
    services: &RunServices,
    handlers: &HandlerTable,
) -> StepResult {
    if task.cancel_requested {
        task.cancel_requested = false;
        task.resume = None;
        raise_into(task, EffectError::TaskCancelled { task: task.id });
    } else if let Some(resume) = task.resume.take() {
        match resume {
            Resume::Deliver(promise) => match core.promise_outcome(promise) {
                Some(Outcome::Ok(v)) => task.point = TaskPoint::Deliver(v.clone()),
                Some(Outcome::Err(e)) => raise_into(task, e.clone()),
                None => raise_into(
                    task,
                    EffectError::invalid("task woken before its future resolved"),
                ),
            },
            Resume::Redispatch(effect) => {
                task.point = TaskPoint::Run(Program::Effect(effect));
            }
        }
    }

    let mut budget = EFFECT_BUDGET;

    loop {
        match std::mem::replace(&mut task.point, TaskPoint::Idle) {
            TaskPoint::Idle => {
                raise_into(task, EffectError::invalid("task stepped while idle"));
            }

            TaskPoint::Run(program) => match program {
                Program::Pure(value) => {
                    task.point = TaskPoint::Deliver(value);
                }
                Program::Bind { src, k } => {
                    task.kont.push(Box::new(BindFrame { k }));
                    task.point = TaskPoint::Run(*src);
                }
                Program::Call(call) => {
                    if let Some(trace) = services.trace.as_ref() {
                        trace.record(task.id, task.kont.len(), format!("call {}", call.name()));
                    }
                    match call.first_unresolved() {
                        Some((index, arg)) => {
                            task.kont.push(Box::new(crate::frame::ArgResolveFrame {
                                call,
                                index,
                            }));
                            task.point = TaskPoint::Run((*arg).clone());
                        }
                        None => match call.invoke() {
                            Ok(next) => task.point = TaskPoint::Run(next),
                            Err(e) => raise_into(task, e),
                        },
                    }
                }
                Program::Effect(effect) => {
                    let target = match intercept_pass(effect, &task.kont) {
                        Ok(t) => t,
                        Err(e) => {
                            raise_into(task, e);
                            continue;
                        }
                    };
                    let effect = match target {
                        DispatchTarget::Program(p) => {
                            task.point = TaskPoint::Run(p);
                            continue;
                        }
                        DispatchTarget::Effect(e) => e,
                    };
                    let kind = effect.kind();
                    if let Some(trace) = services.trace.as_ref() {
                        trace.record(task.id, task.kont.len(), format!("{kind:?}"));
                    }
                    tracing::trace!(task = ?task.id, kind = ?kind, "dispatching effect");
                    let handler = match handlers.get(&kind) {
                        Some(h) => Arc::clone(h),
                        None => {
                            raise_into(task, EffectError::UnhandledEffect { kind });
                            continue;
                        }
                    };
                    let dispatched = {
                        let mut cx = EffectCx {
                            task: &mut *task,
                            services,
                            sched: &mut *core,
                        };
                        handler.handle(effect, &mut cx)
                    };
                    budget = budget.saturating_sub(1);
                    match dispatched {
                        Err(e) => raise_into(task, e),
                        Ok(Dispatch::Value(v)) => task.point = TaskPoint::Deliver(v),
                        Ok(Dispatch::Fault(e)) => raise_into(task, e),
                        Ok(Dispatch::Run(p)) => task.point = TaskPoint::Run(p),
                        Ok(Dispatch::Push(frame, p)) => {
                            task.kont.push(frame);
                            task.point = TaskPoint::Run(p);
                        }
                        Ok(Dispatch::Park { futures, resume }) => {
                            core.block_task(task, futures, resume);
                            return StepResult::Parked;
                        }
                    }
                }
            },

            TaskPoint::Deliver(value) => match task.kont.pop() {
                None => {
                    return StepResult::Finished {
                        outcome: Outcome::Ok(value),
                        cancelled: false,
                    };
                }
                Some(mut frame) => {
                    let result = {
                        let mut cx = FrameCx {
                            env: &mut task.env,
                            store: &task.store,
                            services,
                            sched: &mut *core,
                            task: task.id,
                        };
                        frame.on_value(value, &mut cx)
                    };
                    match result {
                        FrameResult::Value(v) => task.point = TaskPoint::Deliver(v),
                        FrameResult::Fault(e) => raise_into(task, e),
                        FrameResult::Run(p) => {
                            if frame.persists() {
                                task.kont.push(frame);
                            }
                            task.point = TaskPoint::Run(p);
                        }
                    }
                }
            },

            TaskPoint::Raise(error) => match task.kont.pop() {
                None => {
                    let cancelled = matches!(
                        &error,
                        EffectError::TaskCancelled { task: t } if *t == task.id
                    );
                    return StepResult::Finished {
                        outcome: Outcome::Err(error),
                        cancelled,
                    };
                }
                Some(mut frame) => {
                    let result = {
                        let mut cx = FrameCx {
                            env: &mut task.env,
                            store: &task.store,
                            services,
                            sched: &mut *core,
                            task: task.id,
                        };
                        frame.on_error(error, &mut cx)
                    };
                    match result {
                        FrameResult::Value(v) => task.point = TaskPoint::Deliver(v),
                        // Pass-through: keep unwinding without
                        // re-recording the origin frames.
                        FrameResult::Fault(e) => task.point = TaskPoint::Raise(e),
                        FrameResult::Run(p) => {
                            if frame.persists() {
                                task.kont.push(frame);
                            }
                            task.point = TaskPoint::Run(p);
                        }
                    }
                }
            },
        }

        if budget == 0 {
            task.status = TaskStatus::Ready;
            return StepResult::Yielded;
        }
    }
}
