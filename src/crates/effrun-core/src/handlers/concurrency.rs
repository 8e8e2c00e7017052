//! Concurrency effects: tasks, futures, promises and semaphores
//!
//! Everything here rides on the scheduler's promise registry. A
//! spawned task's completion is a promise; a semaphore waiter parks on
//! a promise; `Gather` and `Race` park on the unresolved subset of
//! their futures and re-check when woken.
//!
//! Store sharing differs by construct, deliberately:
//!
//! - `Spawn` snapshots the parent's store - the child is isolated.
//! - `Gather` of programs shares the parent's store - children
//!   interleave writes at yield boundaries, and orphaned siblings of a
//!   failed gather may keep writing.

use crate::effect::Effect;
use crate::error::{EffectError, Result};
use crate::frame::{child_frames, item_program, GatherFrame};
use crate::handle::{FutureHandle, PromiseId};
use crate::handlers::{Dispatch, EffectCx, EffectHandler};
use crate::outcome::Outcome;
use crate::store::snapshot;
use crate::value::Value;
use crate::vm::task::Resume;

/// How `Gather` runs program items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherMode {
    /// Run them one after another inside the dispatching task. The
    /// deterministic choice of the synchronous and simulation presets.
    Sequential,
    /// Spawn them as store-sharing tasks and wait on their futures.
    Concurrent,
}

/// Serves the task, future, promise and semaphore effects.
pub struct ConcurrencyHandler {
    gather: GatherMode,
}

impl ConcurrencyHandler {
    pub fn new(gather: GatherMode) -> ConcurrencyHandler {
        ConcurrencyHandler { gather }
    }

    /// Turn gather/race items into futures, spawning program items as
    /// store-sharing child tasks.
    fn normalize(&self, items: Vec<Value>, cx: &mut EffectCx<'_>) -> Result<Vec<FutureHandle>> {
        items
            .into_iter()
            .map(|item| match item {
                Value::Program(p) => {
                    let handle = cx.sched.spawn_task(
                        (*p).clone(),
                        cx.task.env.clone(),
                        cx.task.store.clone(),
                        child_frames(&cx.task.kont),
                    );
                    Ok(handle.future())
                }
                other => other.waitable().ok_or_else(|| {
                    EffectError::invalid("gather items must be programs, futures or tasks")
                }),
            })
            .collect()
    }

    fn gather_concurrent(&self, items: Vec<Value>, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        let futures = self.normalize(items, cx)?;
        let mut values = Vec::with_capacity(futures.len());
        let mut unresolved: Vec<PromiseId> = Vec::new();
        for f in &futures {
            match cx.sched.promise_outcome(f.id()) {
                Some(Outcome::Ok(v)) => values.push(v.clone()),
                // Fail-fast: the first error aborts the gather. The
                // sibling tasks are not cancelled and may keep
                // mutating the shared store.
                Some(Outcome::Err(e)) => return Ok(Dispatch::Fault(e.clone())),
                None => unresolved.push(f.id()),
            }
        }
        if unresolved.is_empty() {
            return Ok(Dispatch::Value(Value::List(values)));
        }
        Ok(Dispatch::Park {
            futures: unresolved,
            resume: Resume::Redispatch(Effect::Gather {
                items: futures.into_iter().map(Value::Future).collect(),
            }),
        })
    }

    fn gather_sequential(&self, mut items: Vec<Value>, _cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        let first = items.remove(0);
        let program = item_program(&first)?;
        Ok(Dispatch::Push(
            Box::new(GatherFrame {
                pending: items.into(),
                acc: Vec::new(),
            }),
            program,
        ))
    }

    fn race(&self, items: Vec<Value>, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        if items.is_empty() {
            return Ok(Dispatch::Fault(EffectError::invalid(
                "race needs at least one item",
            )));
        }
        let futures = self.normalize(items, cx)?;
        for (i, f) in futures.iter().enumerate() {
            let outcome = match cx.sched.promise_outcome(f.id()) {
                None => continue,
                Some(o) => o.clone(),
            };
            return Ok(match outcome {
                Outcome::Ok(value) => {
                    let rest: Vec<Value> = futures
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, other)| Value::Future(*other))
                        .collect();
                    Dispatch::Value(Value::record([
                        ("first", Value::Future(*f)),
                        ("value", value),
                        ("rest", Value::List(rest)),
                    ]))
                }
                Outcome::Err(e) => Dispatch::Fault(e),
            });
        }
        Ok(Dispatch::Park {
            futures: futures.iter().map(|f| f.id()).collect(),
            resume: Resume::Redispatch(Effect::Race {
                items: futures.into_iter().map(Value::Future).collect(),
            }),
        })
    }

    fn promise_id(value: &Value) -> Result<PromiseId> {
        match value {
            Value::Promise(h) => Ok(h.id()),
            Value::External(e) => Ok(e.promise.id()),
            _ => Err(EffectError::invalid("expected a promise handle")),
        }
    }
}

impl EffectHandler for ConcurrencyHandler {
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch> {
        match effect {
            Effect::Spawn { program } => {
                let handle = cx.sched.spawn_task(
                    (*program).clone(),
                    cx.task.env.clone(),
                    snapshot(&cx.task.store),
                    child_frames(&cx.task.kont),
                );
                Ok(Dispatch::Value(Value::Task(handle)))
            }

            Effect::Wait { future } => {
                let f = future
                    .waitable()
                    .ok_or_else(|| EffectError::invalid("Wait expects a future or task"))?;
                Ok(match cx.sched.promise_outcome(f.id()) {
                    Some(Outcome::Ok(v)) => Dispatch::Value(v.clone()),
                    Some(Outcome::Err(e)) => Dispatch::Fault(e.clone()),
                    None => Dispatch::Park {
                        futures: vec![f.id()],
                        resume: Resume::Deliver(f.id()),
                    },
                })
            }

            Effect::Gather { items } => {
                if items.is_empty() {
                    return Ok(Dispatch::Value(Value::List(Vec::new())));
                }
                // Re-dispatches after a park arrive with futures only;
                // they take the concurrent path in every mode.
                let all_futures = items.iter().all(|i| i.waitable().is_some());
                match self.gather {
                    GatherMode::Sequential if !all_futures => self.gather_sequential(items, cx),
                    _ => self.gather_concurrent(items, cx),
                }
            }

            Effect::Race { items } => self.race(items, cx),

            Effect::CreatePromise => {
                let id = cx.sched.new_promise();
                let promise = crate::handle::PromiseHandle { id };
                Ok(Dispatch::Value(Value::record([
                    ("promise", Value::Promise(promise)),
                    ("future", Value::Future(promise.future())),
                ])))
            }

            Effect::CompletePromise { promise, value } => {
                let id = Self::promise_id(&promise)?;
                Ok(match cx.sched.resolve_promise(id, Outcome::Ok(value)) {
                    Ok(()) => Dispatch::Value(Value::null()),
                    Err(e) => Dispatch::Fault(e),
                })
            }

            Effect::FailPromise { promise, error } => {
                let id = Self::promise_id(&promise)?;
                let message = error
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| "promise failed".to_string());
                let outcome = Outcome::Err(EffectError::raised_with(message, error));
                Ok(match cx.sched.resolve_promise(id, outcome) {
                    Ok(()) => Dispatch::Value(Value::null()),
                    Err(e) => Dispatch::Fault(e),
                })
            }

            Effect::CreateExternalPromise => {
                let ext = cx.sched.register_external(cx.services.sender.clone());
                let future = ext.future();
                Ok(Dispatch::Value(Value::record([
                    ("promise", Value::External(ext)),
                    ("future", Value::Future(future)),
                ])))
            }

            Effect::CancelTask { task } => {
                let handle = match task {
                    Value::Task(h) => h,
                    _ => return Err(EffectError::invalid("CancelTask expects a task")),
                };
                if handle.task_id() == cx.task.id {
                    // Self-cancel: the task is detached from the table
                    // while it runs, so flag it directly.
                    cx.task.cancel_requested = true;
                } else {
                    cx.sched.cancel(handle.task_id());
                }
                Ok(Dispatch::Value(Value::null()))
            }

            Effect::TaskDone { task } => {
                let handle = match task {
                    Value::Task(h) => h,
                    _ => return Err(EffectError::invalid("TaskDone expects a task")),
                };
                Ok(Dispatch::Value(Value::from(
                    cx.sched.is_done(handle.task_id()),
                )))
            }

            Effect::CreateSemaphore { permits } => {
                if permits == 0 {
                    return Ok(Dispatch::Fault(EffectError::invalid(
                        "semaphore needs at least one permit",
                    )));
                }
                let handle = cx.sched.new_semaphore(permits);
                Ok(Dispatch::Value(Value::Semaphore(handle)))
            }

            Effect::AcquireSemaphore { semaphore } => {
                let handle = match semaphore {
                    Value::Semaphore(h) => h,
                    _ => return Err(EffectError::invalid("AcquireSemaphore expects a semaphore")),
                };
                Ok(match cx.sched.sem_acquire(handle.id(), cx.task.id)? {
                    None => Dispatch::Value(Value::null()),
                    Some(promise) => Dispatch::Park {
                        futures: vec![promise],
                        resume: Resume::Deliver(promise),
                    },
                })
            }

            Effect::ReleaseSemaphore { semaphore } => {
                let handle = match semaphore {
                    Value::Semaphore(h) => h,
                    _ => return Err(EffectError::invalid("ReleaseSemaphore expects a semaphore")),
                };
                Ok(match cx.sched.sem_release(handle.id()) {
                    Ok(()) => Dispatch::Value(Value::null()),
                    Err(e) => Dispatch::Fault(e),
                })
            }

            other => Err(EffectError::invalid(format!(
                "concurrency handler got {:?}",
                other.kind()
            ))),
        }
    }
}
