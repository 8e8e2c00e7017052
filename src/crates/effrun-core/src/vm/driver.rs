//! The scheduler driver loop
//!
//! One [`Driver`] exists per run. Its loop is the same in every preset:
//! drain the external-completion queue, step the head of the ready
//! queue, and when nothing is runnable either finish (root complete),
//! wait for an external completion (work is in flight), or declare a
//! deadlock. The synchronous and asynchronous entry points differ only
//! in how they wait on the queue.

use crate::env::Env;
use crate::error::EffectError;
use crate::handle::{ExternalReceiver, TaskId};
use crate::handlers::HandlerTable;
use crate::outcome::Outcome;
use crate::program::Program;
use crate::runtime::RunResult;
use crate::services::RunServices;
use crate::store::SharedStore;
use crate::trace::TraceRecorder;
use crate::vm::scheduler::SchedCore;
use crate::vm::step::{step_task, StepResult};
use crate::vm::task::TaskStatus;

pub(crate) struct Driver {
    core: SchedCore,
    services: RunServices,
    handlers: HandlerTable,
    rx: ExternalReceiver,
    root: TaskId,
    root_store: SharedStore,
    initial_env: Env,
}

impl Driver {
    pub(crate) fn new(
        program: Program,
        handlers: HandlerTable,
        env: Env,
        store: SharedStore,
        services: RunServices,
        rx: ExternalReceiver,
    ) -> Driver {
        let mut core = SchedCore::new();
        let root = core
            .spawn_task(program, env.clone(), store.clone(), Vec::new())
            .task_id();
        Driver {
            core,
            services,
            handlers,
            rx,
            root,
            root_store: store,
            initial_env: env,
        }
    }

    fn drain(&mut self) {
        while let Ok(completion) = self.rx.try_recv() {
            self.core.apply_external(completion);
        }
    }

    /// Step the head of the ready queue. `false` when nothing is ready.
    fn step_ready(&mut self) -> bool {
        let Some(tid) = self.core.ready.pop_front() else {
            return false;
        };
        let Some(mut task) = self.core.tasks.remove(&tid) else {
            return true;
        };
        task.status = TaskStatus::Running;
        match step_task(&mut task, &mut self.core, &self.services, &self.handlers) {
            StepResult::Yielded => {
                task.status = TaskStatus::Ready;
                self.core.tasks.insert(tid, task);
                self.core.ready.push_back(tid);
            }
            StepResult::Parked => {
                self.core.tasks.insert(tid, task);
            }
            StepResult::Finished { outcome, cancelled } => {
                self.core.retire(task, outcome, cancelled);
            }
        }
        true
    }

    fn fail_root(&mut self, error: EffectError) {
        if let Some(task) = self.core.tasks.remove(&self.root) {
            self.core.retire(task, Outcome::Err(error), false);
        }
    }

    /// Drive to completion on the calling thread, sleeping on the
    /// external queue while handed-off work is in flight.
    pub(crate) fn run_sync(mut self) -> RunResult {
        loop {
            self.drain();
            if self.step_ready() {
                continue;
            }
            if self.core.is_done(self.root) {
                break;
            }
            if self.core.expects_external() {
                match self.rx.blocking_recv() {
                    Some(completion) => {
                        self.core.apply_external(completion);
                        continue;
                    }
                    None => {
                        self.fail_root(EffectError::raised("external completion queue closed"));
                        break;
                    }
                }
            }
            let blocked = self.core.tasks.len();
            tracing::error!(blocked, "deadlock: no runnable task and the root is incomplete");
            self.fail_root(EffectError::Deadlock { blocked });
            break;
        }
        self.finish()
    }

    /// Drive to completion on the caller's event loop. Yields to the
    /// loop between slices so spawned timers and awaits make progress
    /// even on a current-thread runtime.
    pub(crate) async fn run_async(mut self) -> RunResult {
        loop {
            self.drain();
            if self.step_ready() {
                tokio::task::yield_now().await;
                continue;
            }
            if self.core.is_done(self.root) {
                break;
            }
            if self.core.expects_external() {
                match self.rx.recv().await {
                    Some(completion) => {
                        self.core.apply_external(completion);
                        continue;
                    }
                    None => {
                        self.fail_root(EffectError::raised("external completion queue closed"));
                        break;
                    }
                }
            }
            let blocked = self.core.tasks.len();
            tracing::error!(blocked, "deadlock: no runnable task and the root is incomplete");
            self.fail_root(EffectError::Deadlock { blocked });
            break;
        }
        self.finish()
    }

    fn finish(mut self) -> RunResult {
        let (outcome, env, fault_frames) = match self.core.finished.remove(&self.root) {
            Some(f) => (f.outcome, f.env, f.fault_frames),
            None => (
                Outcome::Err(EffectError::raised("run ended before the root task completed")),
                self.initial_env.clone(),
                None,
            ),
        };
        let store = self.root_store.lock().clone();
        let log = self.services.log.snapshot();
        let trace = self.services.trace.as_ref().map(TraceRecorder::snapshot);
        RunResult::assemble(outcome, env, store, log, trace, fault_frames)
    }
}
