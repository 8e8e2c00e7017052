//! Handler registry and the built-in handler presets
//!
//! A handler is a function keyed by [`EffectKind`]: the evaluator looks
//! the kind up in the run's [`HandlerTable`] and hands the effect over.
//! Handlers are ordinary values - a run is built with a table, users
//! may override any entry or register entirely new kinds (the
//! `Custom` effect exists for exactly that), and the runtime never
//! swaps handlers underneath a run.
//!
//! Three presets cover the packaged drivers:
//!
//! - [`default_handlers`] - the synchronous preset: blocking sleeps,
//!   sequential gather, `Await` on a background bridge thread.
//! - [`default_async_handlers`] - the asynchronous preset: event-loop
//!   timers, concurrent gather, `Await` on the caller's loop.
//! - [`simulation_handlers`] - the deterministic preset: virtual time,
//!   sequential gather, no host bridge.
//!
//! Pick the preset matching the entry point that will drive the run.

mod bridge;
mod concurrency;
mod control;
mod reader;
mod state;
mod time;
mod writer;

pub use bridge::BridgeHandler;
pub use concurrency::{ConcurrencyHandler, GatherMode};
pub use control::ControlHandler;
pub use reader::ReaderHandler;
pub use state::StateHandler;
pub use time::{TimeHandler, TimeMode, CURRENT_TIME_KEY};
pub use writer::WriterHandler;

use std::collections::HashMap;
use std::sync::Arc;

use crate::effect::{Effect, EffectKind};
use crate::error::{EffectError, Result};
use crate::frame::Frame;
use crate::handle::PromiseId;
use crate::program::Program;
use crate::services::RunServices;
use crate::value::Value;
use crate::vm::scheduler::SchedCore;
use crate::vm::task::{Resume, TaskState};

/// What a handler decided to do with an effect.
pub enum Dispatch {
    /// Deliver a value into the kontinuation.
    Value(Value),
    /// Raise an error into the kontinuation.
    Fault(EffectError),
    /// Run a program in the effect's place.
    Run(Program),
    /// Push a frame, then run a program beneath it.
    Push(Box<dyn Frame>, Program),
    /// Park the task on `futures`; `resume` says how to continue when
    /// one of them resolves.
    Park {
        futures: Vec<PromiseId>,
        resume: Resume,
    },
}

/// Context handed to a handler while it dispatches one effect.
pub struct EffectCx<'a> {
    /// The dispatching task.
    pub task: &'a mut TaskState,
    /// Run-wide services.
    pub services: &'a RunServices,
    /// Scheduler core.
    pub sched: &'a mut SchedCore,
}

/// A registered effect handler.
pub trait EffectHandler: Send + Sync {
    /// Dispatch one effect.
    fn handle(&self, effect: Effect, cx: &mut EffectCx<'_>) -> Result<Dispatch>;
}

/// The handler registry of a run: one handler per effect kind.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EffectKind, Arc<dyn EffectHandler>>,
}

impl HandlerTable {
    /// An empty table. Programs run against it fail with
    /// `UnhandledEffect` on their first dispatch - start from a preset
    /// unless that is what you want.
    pub fn new() -> HandlerTable {
        HandlerTable::default()
    }

    /// Register (or override) the handler for one kind.
    pub fn register(&mut self, kind: EffectKind, handler: Arc<dyn EffectHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Builder-style [`Self::register`].
    pub fn with_handler(mut self, kind: EffectKind, handler: Arc<dyn EffectHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// The handler for a kind, if registered.
    pub fn get(&self, kind: &EffectKind) -> Option<&Arc<dyn EffectHandler>> {
        self.handlers.get(kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn builtin(gather: GatherMode, time: TimeMode, bridge: BridgeHandler) -> HandlerTable {
        let mut table = HandlerTable::new();

        let reader = Arc::new(ReaderHandler);
        table.register(EffectKind::Ask, reader.clone());
        table.register(EffectKind::Local, reader);

        let state = Arc::new(StateHandler);
        table.register(EffectKind::Get, state.clone());
        table.register(EffectKind::Put, state.clone());
        table.register(EffectKind::Modify, state);

        let writer = Arc::new(WriterHandler);
        table.register(EffectKind::Tell, writer.clone());
        table.register(EffectKind::Listen, writer);

        let control = Arc::new(ControlHandler);
        table.register(EffectKind::Pure, control.clone());
        table.register(EffectKind::Safe, control.clone());
        table.register(EffectKind::Intercept, control);

        let concurrency = Arc::new(ConcurrencyHandler::new(gather));
        for kind in [
            EffectKind::Spawn,
            EffectKind::Wait,
            EffectKind::Gather,
            EffectKind::Race,
            EffectKind::CreatePromise,
            EffectKind::CompletePromise,
            EffectKind::FailPromise,
            EffectKind::CreateExternalPromise,
            EffectKind::CancelTask,
            EffectKind::TaskDone,
            EffectKind::CreateSemaphore,
            EffectKind::AcquireSemaphore,
            EffectKind::ReleaseSemaphore,
        ] {
            table.register(kind, concurrency.clone());
        }

        let time = Arc::new(TimeHandler::new(time));
        table.register(EffectKind::Delay, time.clone());
        table.register(EffectKind::GetTime, time.clone());
        table.register(EffectKind::WaitUntil, time);

        table.register(EffectKind::Await, Arc::new(bridge));

        table
    }
}

/// The synchronous preset.
pub fn default_handlers() -> HandlerTable {
    HandlerTable::builtin(
        GatherMode::Sequential,
        TimeMode::Blocking,
        BridgeHandler::supported(),
    )
}

/// The asynchronous preset.
pub fn default_async_handlers() -> HandlerTable {
    HandlerTable::builtin(
        GatherMode::Concurrent,
        TimeMode::EventLoop,
        BridgeHandler::supported(),
    )
}

/// The deterministic simulation preset.
pub fn simulation_handlers() -> HandlerTable {
    HandlerTable::builtin(
        GatherMode::Sequential,
        TimeMode::Simulated,
        BridgeHandler::unsupported(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_cover_every_builtin_kind() {
        for table in [
            default_handlers(),
            default_async_handlers(),
            simulation_handlers(),
        ] {
            for kind in [
                EffectKind::Ask,
                EffectKind::Local,
                EffectKind::Get,
                EffectKind::Put,
                EffectKind::Modify,
                EffectKind::Tell,
                EffectKind::Listen,
                EffectKind::Pure,
                EffectKind::Safe,
                EffectKind::Intercept,
                EffectKind::Spawn,
                EffectKind::Wait,
                EffectKind::Gather,
                EffectKind::Race,
                EffectKind::CreatePromise,
                EffectKind::CompletePromise,
                EffectKind::FailPromise,
                EffectKind::CreateExternalPromise,
                EffectKind::CancelTask,
                EffectKind::TaskDone,
                EffectKind::Delay,
                EffectKind::GetTime,
                EffectKind::WaitUntil,
                EffectKind::Await,
                EffectKind::CreateSemaphore,
                EffectKind::AcquireSemaphore,
                EffectKind::ReleaseSemaphore,
            ] {
                assert!(table.get(&kind).is_some(), "missing handler for {kind:?}");
            }
        }
    }

    #[test]
    fn custom_kinds_are_unregistered_by_default() {
        let table = default_handlers();
        assert!(table.get(&EffectKind::Custom("metrics".to_string())).is_none());
    }
}
