//! Scheduler core: task table, ready queue, promises, semaphores
//!
//! [`SchedCore`] owns every piece of mutable coordination state of a
//! run. Nothing outside the scheduler mutates it directly: tasks touch
//! it through effects, the outside world through the external
//! completion queue. That single-owner discipline is what lets the
//! whole runtime get by without task-level locking - tasks interleave
//! only at yield boundaries, never mid-dispatch.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use uuid::Uuid;

use crate::env::Env;
use crate::error::{EffectError, Result};
use crate::frame::Frame;
use crate::handle::{
    ExternalCompletion, ExternalKey, ExternalPromise, ExternalSender, FutureHandle, PromiseHandle,
    PromiseId, SemaphoreHandle, SemaphoreId, TaskHandle, TaskId,
};
use crate::outcome::Outcome;
use crate::program::Program;
use crate::store::SharedStore;
use crate::vm::task::{Resume, TaskState, TaskStatus};

/// A retired task: terminal outcome plus what diagnostics need.
pub struct FinishedTask {
    /// The completion outcome delivered to waiters.
    pub outcome: Outcome,
    /// The environment at completion.
    pub env: Env,
    /// Whether the task terminated by cancellation.
    pub cancelled: bool,
    /// Frame names captured at the last fault, if the task failed.
    pub fault_frames: Option<Vec<String>>,
}

struct SemaphoreState {
    permits: usize,
    available: usize,
    waiters: VecDeque<(TaskId, PromiseId)>,
}

/// The scheduler's coordination state.
pub struct SchedCore {
    pub(crate) tasks: HashMap<TaskId, TaskState>,
    pub(crate) ready: VecDeque<TaskId>,
    pub(crate) finished: HashMap<TaskId, FinishedTask>,
    blocked_on_future: HashMap<PromiseId, Vec<TaskId>>,
    promises: HashMap<PromiseId, Option<Outcome>>,
    semaphores: HashMap<SemaphoreId, SemaphoreState>,
    external: HashMap<Uuid, PromiseId>,
    pending_external: usize,
    next_task: u64,
    next_promise: u64,
    next_semaphore: u64,
}

impl SchedCore {
    pub(crate) fn new() -> SchedCore {
        SchedCore {
            tasks: HashMap::new(),
            ready: VecDeque::new(),
            finished: HashMap::new(),
            blocked_on_future: HashMap::new(),
            promises: HashMap::new(),
            semaphores: HashMap::new(),
            external: HashMap::new(),
            pending_external: 0,
            next_task: 0,
            next_promise: 0,
            next_semaphore: 0,
        }
    }

    /// Allocate a fresh promise/future slot.
    pub fn new_promise(&mut self) -> PromiseId {
        let id = PromiseId(self.next_promise);
        self.next_promise += 1;
        self.promises.insert(id, None);
        id
    }

    /// The resolved outcome of a promise, if any.
    pub fn promise_outcome(&self, id: PromiseId) -> Option<&Outcome> {
        self.promises.get(&id).and_then(Option::as_ref)
    }

    /// Resolve a promise, waking every task parked on its future.
    /// Errors with [`EffectError::PromiseAlreadyCompleted`] on a second
    /// resolution.
    pub fn resolve_promise(&mut self, id: PromiseId, outcome: Outcome) -> Result<()> {
        let slot = self
            .promises
            .get_mut(&id)
            .ok_or_else(|| EffectError::invalid(format!("unknown promise {id:?}")))?;
        if slot.is_some() {
            return Err(EffectError::PromiseAlreadyCompleted { promise: id });
        }
        *slot = Some(outcome);
        self.wake_waiters(id);
        Ok(())
    }

    fn wake_waiters(&mut self, id: PromiseId) {
        let Some(waiters) = self.blocked_on_future.remove(&id) else {
            return;
        };
        for tid in waiters {
            let other_waits = match self.tasks.get_mut(&tid) {
                Some(task) if task.status == TaskStatus::Blocked => {
                    task.status = TaskStatus::Ready;
                    std::mem::take(&mut task.waiting_on)
                }
                _ => continue,
            };
            for pid in other_waits {
                if pid == id {
                    continue;
                }
                if let Some(list) = self.blocked_on_future.get_mut(&pid) {
                    list.retain(|t| *t != tid);
                    if list.is_empty() {
                        self.blocked_on_future.remove(&pid);
                    }
                }
            }
            tracing::trace!(task = ?tid, promise = ?id, "waking task");
            self.ready.push_back(tid);
        }
    }

    /// Park `task` (already detached from the table) on `futures`.
    pub fn block_task(&mut self, task: &mut TaskState, futures: Vec<PromiseId>, resume: Resume) {
        debug_assert!(!futures.is_empty(), "parking on nothing");
        task.status = TaskStatus::Blocked;
        task.resume = Some(resume);
        task.waiting_on = futures.clone();
        for pid in futures {
            self.blocked_on_future.entry(pid).or_default().push(task.id);
        }
        tracing::trace!(task = ?task.id, waits = task.waiting_on.len(), "task parked");
    }

    /// Create a task and enqueue it ready.
    pub fn spawn_task(
        &mut self,
        program: Program,
        env: Env,
        store: SharedStore,
        kont: Vec<Box<dyn Frame>>,
    ) -> TaskHandle {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        let future = self.new_promise();
        let task = TaskState::new(id, program, kont, env, store, future);
        self.tasks.insert(id, task);
        self.ready.push_back(id);
        tracing::debug!(task = ?id, "task spawned");
        TaskHandle {
            task: id,
            future: FutureHandle { id: future },
        }
    }

    /// Request cooperative cancellation. Terminal tasks ignore it;
    /// parked tasks are woken so they observe the cancellation at
    /// their next step.
    pub fn cancel(&mut self, tid: TaskId) {
        let waits = match self.tasks.get_mut(&tid) {
            None => return,
            Some(task) => {
                task.cancel_requested = true;
                if task.status != TaskStatus::Blocked {
                    return;
                }
                task.status = TaskStatus::Ready;
                task.resume = None;
                std::mem::take(&mut task.waiting_on)
            }
        };
        for pid in waits {
            if let Some(list) = self.blocked_on_future.get_mut(&pid) {
                list.retain(|t| *t != tid);
                if list.is_empty() {
                    self.blocked_on_future.remove(&pid);
                }
            }
        }
        for sem in self.semaphores.values_mut() {
            sem.waiters.retain(|(t, _)| *t != tid);
        }
        self.ready.push_back(tid);
        tracing::debug!(task = ?tid, "cancellation requested");
    }

    /// Whether a task has reached a terminal status.
    pub fn is_done(&self, tid: TaskId) -> bool {
        self.finished.contains_key(&tid)
    }

    /// Retire a task, resolving its completion future.
    pub(crate) fn retire(&mut self, task: TaskState, outcome: Outcome, cancelled: bool) {
        tracing::debug!(task = ?task.id, ok = outcome.is_ok(), cancelled, "task finished");
        let _ = self.resolve_promise(task.future, outcome.clone());
        self.finished.insert(
            task.id,
            FinishedTask {
                outcome,
                env: task.env,
                cancelled,
                fault_frames: task.fault_frames,
            },
        );
    }

    /// Allocate a counting semaphore.
    pub fn new_semaphore(&mut self, permits: usize) -> SemaphoreHandle {
        let id = SemaphoreId(self.next_semaphore);
        self.next_semaphore += 1;
        self.semaphores.insert(
            id,
            SemaphoreState {
                permits,
                available: permits,
                waiters: VecDeque::new(),
            },
        );
        SemaphoreHandle { id }
    }

    /// Take a permit or join the FIFO wait queue. `Ok(None)` means the
    /// permit was taken; `Ok(Some(p))` means park on `p`.
    pub fn sem_acquire(&mut self, id: SemaphoreId, tid: TaskId) -> Result<Option<PromiseId>> {
        {
            let sem = self
                .semaphores
                .get_mut(&id)
                .ok_or_else(|| EffectError::invalid(format!("unknown semaphore {id:?}")))?;
            if sem.available > 0 {
                sem.available -= 1;
                return Ok(None);
            }
        }
        let promise = self.new_promise();
        let sem = self
            .semaphores
            .get_mut(&id)
            .ok_or_else(|| EffectError::invalid(format!("unknown semaphore {id:?}")))?;
        sem.waiters.push_back((tid, promise));
        Ok(Some(promise))
    }

    /// Return a permit, handing it to the longest-parked live waiter.
    /// Errors when every permit is already available.
    pub fn sem_release(&mut self, id: SemaphoreId) -> Result<()> {
        loop {
            let waiter = {
                let sem = self
                    .semaphores
                    .get_mut(&id)
                    .ok_or_else(|| EffectError::invalid(format!("unknown semaphore {id:?}")))?;
                match sem.waiters.pop_front() {
                    Some(w) => Some(w),
                    None => {
                        if sem.available == sem.permits {
                            return Err(EffectError::SemaphoreOverRelease { semaphore: id });
                        }
                        sem.available += 1;
                        None
                    }
                }
            };
            match waiter {
                None => return Ok(()),
                Some((tid, promise)) => {
                    // A retired waiter forfeits its place; hand the
                    // permit to the next one instead.
                    if self.finished.contains_key(&tid) {
                        continue;
                    }
                    return self.resolve_promise(promise, Outcome::Ok(crate::value::Value::null()));
                }
            }
        }
    }

    /// Allocate an externally completed promise.
    pub fn register_external(&mut self, sender: ExternalSender) -> ExternalPromise {
        let promise = self.new_promise();
        let id = Uuid::new_v4();
        self.external.insert(id, promise);
        self.pending_external += 1;
        ExternalPromise {
            id,
            promise: PromiseHandle { id: promise },
            sender,
            used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Note a handed-off piece of external work (an Await future or an
    /// asynchronous timer) that will complete through the queue.
    pub fn begin_external(&mut self) {
        self.pending_external += 1;
    }

    /// Whether the scheduler may legitimately wait for the external
    /// queue instead of declaring a deadlock.
    pub(crate) fn expects_external(&self) -> bool {
        self.pending_external > 0
    }

    /// Apply one drained completion. Duplicates after resolution are
    /// ignored: the first completion won and the late caller is in a
    /// foreign thread nothing can be raised into.
    pub(crate) fn apply_external(&mut self, completion: ExternalCompletion) {
        let promise = match completion.key {
            ExternalKey::Promise(p) => Some(p),
            ExternalKey::Id(uuid) => self.external.get(&uuid).copied(),
        };
        let Some(promise) = promise else {
            tracing::warn!("external completion for unknown promise id");
            return;
        };
        let outcome = match completion.result {
            Ok(v) => Outcome::Ok(v),
            Err(message) => Outcome::Err(EffectError::raised(message)),
        };
        match self.resolve_promise(promise, outcome) {
            Ok(()) => {
                self.pending_external = self.pending_external.saturating_sub(1);
            }
            Err(_) => {
                tracing::debug!(promise = ?promise, "duplicate external completion ignored");
            }
        }
    }
}
