//! Per-task scheduler state

use crate::env::Env;
use crate::error::EffectError;
use crate::frame::Frame;
use crate::handle::{PromiseId, TaskId};
use crate::program::Program;
use crate::store::SharedStore;
use crate::value::Value;

/// Where a task currently is in its program.
#[derive(Debug)]
pub enum TaskPoint {
    /// About to run a program.
    Run(Program),
    /// Unwinding the kontinuation with a value.
    Deliver(Value),
    /// Unwinding the kontinuation with an error.
    Raise(EffectError),
    /// Parked; [`TaskState::resume`] says how to continue.
    Idle,
}

/// Scheduling status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// In the ready queue (or about to be re-enqueued).
    Ready,
    /// Being stepped right now.
    Running,
    /// Parked on one or more futures.
    Blocked,
}

/// How a woken task resumes.
#[derive(Debug, Clone)]
pub enum Resume {
    /// Deliver the resolved outcome of this future into the kontinuation.
    Deliver(PromiseId),
    /// Re-run the handler for this effect, which will re-check its
    /// futures. Used by Gather and Race.
    Redispatch(crate::effect::Effect),
}

/// One live task in the scheduler's table.
pub struct TaskState {
    /// Scheduler identity.
    pub id: TaskId,
    /// Current control point.
    pub point: TaskPoint,
    /// The kontinuation: frames awaiting a value or error, outermost
    /// first.
    pub kont: Vec<Box<dyn Frame>>,
    /// The task's environment. Immutable per scope; `Local` swaps the
    /// handle and restores it via a frame.
    pub env: Env,
    /// The task's store handle: snapshotted at `Spawn`, shared with
    /// `Gather` children.
    pub store: SharedStore,
    /// Scheduling status.
    pub status: TaskStatus,
    /// Futures this task is parked on.
    pub waiting_on: Vec<PromiseId>,
    /// Pending resumption, set when parking.
    pub resume: Option<Resume>,
    /// Cooperative cancellation was requested; observed at the next
    /// scheduling point.
    pub cancel_requested: bool,
    /// The promise resolved with this task's completion outcome.
    pub future: PromiseId,
    /// Frame names captured when the most recent fault was raised.
    pub fault_frames: Option<Vec<String>>,
}

impl TaskState {
    pub(crate) fn new(
        id: TaskId,
        program: Program,
        kont: Vec<Box<dyn Frame>>,
        env: Env,
        store: SharedStore,
        future: PromiseId,
    ) -> TaskState {
        TaskState {
            id,
            point: TaskPoint::Run(program),
            kont,
            env,
            store,
            status: TaskStatus::Ready,
            waiting_on: Vec::new(),
            resume: None,
            cancel_requested: false,
            future,
            fault_frames: None,
        }
    }
}
