//! Opaque handles for tasks, futures, promises and semaphores
//!
//! Handles are small, cheaply cloneable identifiers. They carry no
//! behaviour of their own - every operation on them flows through an
//! effect, so a handle can be stored, passed between programs and sent
//! across task boundaries freely.
//!
//! The one exception is [`ExternalPromise`]: its [`complete`] and
//! [`fail`] methods are the bridge by which code *outside* the VM
//! (threads, host coroutines, callbacks) resolves an internal promise.
//! Both enqueue onto a thread-safe completion queue and never block.
//!
//! [`complete`]: ExternalPromise::complete
//! [`fail`]: ExternalPromise::fail

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::value::Value;

/// Identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The root task of every run.
    pub const ROOT: TaskId = TaskId(0);
}

/// Identifier of a promise/future pair in the promise registry.
///
/// A promise and its future share one registry slot, so one id names
/// both sides of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromiseId(pub(crate) u64);

/// Identifier of a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemaphoreId(pub(crate) u64);

/// Read-side handle of a promise pair. Accepted by Wait, Gather and Race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FutureHandle {
    pub(crate) id: PromiseId,
}

impl FutureHandle {
    /// The registry slot this future reads.
    pub fn id(&self) -> PromiseId {
        self.id
    }
}

/// Write-side handle of a promise pair, completed from inside the VM
/// via `CompletePromise` / `FailPromise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromiseHandle {
    pub(crate) id: PromiseId,
}

impl PromiseHandle {
    /// The registry slot this promise resolves.
    pub fn id(&self) -> PromiseId {
        self.id
    }

    /// The read side of the pair.
    pub fn future(&self) -> FutureHandle {
        FutureHandle { id: self.id }
    }
}

/// A spawned task: its completion future plus lifecycle identity.
///
/// Cancel and is-done checks go through the `CancelTask` / `TaskDone`
/// effects; waiting on the task goes through `Wait` of [`Self::future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub(crate) task: TaskId,
    pub(crate) future: FutureHandle,
}

impl TaskHandle {
    /// The scheduler identity of the task.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// The future resolved with the task's completion outcome.
    pub fn future(&self) -> FutureHandle {
        self.future
    }
}

/// Handle of a counting semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemaphoreHandle {
    pub(crate) id: SemaphoreId,
}

impl SemaphoreHandle {
    pub fn id(&self) -> SemaphoreId {
        self.id
    }
}

/// A completion record crossing the external bridge.
#[derive(Debug, Clone)]
pub struct ExternalCompletion {
    pub(crate) key: ExternalKey,
    pub(crate) result: std::result::Result<Value, String>,
}

/// How an external completion names its promise: by the in-process slot
/// id, or by the serialisable [`Uuid`] printed on an [`ExternalPromise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKey {
    Promise(PromiseId),
    Id(Uuid),
}

/// Sending half of the external-completion queue.
pub type ExternalSender = mpsc::UnboundedSender<ExternalCompletion>;

/// Receiving half of the external-completion queue; owned by the scheduler.
pub type ExternalReceiver = mpsc::UnboundedReceiver<ExternalCompletion>;

/// Complete a promise by its serialisable id.
///
/// The cross-process shape of the bridge: the [`Uuid`] travelled
/// elsewhere (over a wire, into a callback registry) and the completion
/// arrives later, holding only the id and a sender clone.
pub fn complete_by_id(sender: &ExternalSender, id: Uuid, value: impl Into<Value>) -> bool {
    sender
        .send(ExternalCompletion {
            key: ExternalKey::Id(id),
            result: Ok(value.into()),
        })
        .is_ok()
}

/// Write-side handle completed from outside the VM.
///
/// `complete` and `fail` are thread-safe, never block, and observe
/// at-most-once semantics: the first call wins, later calls return
/// `false` and enqueue nothing.
#[derive(Clone)]
pub struct ExternalPromise {
    pub(crate) id: Uuid,
    pub(crate) promise: PromiseHandle,
    pub(crate) sender: ExternalSender,
    pub(crate) used: Arc<AtomicBool>,
}

impl ExternalPromise {
    /// The serialisable identity of this promise.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The read side waited on inside the VM.
    pub fn future(&self) -> FutureHandle {
        self.promise.future()
    }

    /// Resolve the promise with a value. Returns `false` if this handle
    /// already completed or the run is gone.
    pub fn complete(&self, value: impl Into<Value>) -> bool {
        self.push(Ok(value.into()))
    }

    /// Resolve the promise with an error message. Returns `false` if
    /// this handle already completed or the run is gone.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.push(Err(error.into()))
    }

    fn push(&self, result: std::result::Result<Value, String>) -> bool {
        if self.used.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.sender
            .send(ExternalCompletion {
                key: ExternalKey::Promise(self.promise.id),
                result,
            })
            .is_ok()
    }
}

impl fmt::Debug for ExternalPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalPromise")
            .field("id", &self.id)
            .field("promise", &self.promise)
            .finish()
    }
}

impl PartialEq for ExternalPromise {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_promise_completes_at_most_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ext = ExternalPromise {
            id: Uuid::new_v4(),
            promise: PromiseHandle { id: PromiseId(7) },
            sender: tx,
            used: Arc::new(AtomicBool::new(false)),
        };

        assert!(ext.complete(1i64));
        assert!(!ext.complete(2i64));
        assert!(!ext.fail("late"));

        let first = rx.try_recv().expect("one completion enqueued");
        assert_eq!(first.key, ExternalKey::Promise(PromiseId(7)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn promise_and_future_share_a_slot() {
        let p = PromiseHandle { id: PromiseId(3) };
        assert_eq!(p.future().id(), p.id());
    }
}
