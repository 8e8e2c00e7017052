//! Run entry points
//!
//! Three packaged ways to drive a program, all returning a
//! [`RunResult`]:
//!
//! - [`run`] - synchronous: blocks the calling thread, sleeps for real
//!   on time effects, executes `Await` futures on a background bridge
//!   thread. Must not be called from inside an async context.
//! - [`async_run`] - asynchronous: drives the scheduler on the
//!   caller's tokio loop; awaits from different tasks overlap.
//! - [`simulation_run`] - deterministic: time is virtual and advances
//!   instantly, `Await` is rejected, and a run full of delays finishes
//!   in microseconds.
//!
//! [`Runtime`] is the builder behind all three, for callers that want
//! to set up once and invoke repeatedly.
//!
//! # Examples
//!
//! ```rust
//! use effrun_core::effect::{ask, get, put};
//! use effrun_core::handlers::default_handlers;
//! use effrun_core::runtime::run;
//! use effrun_core::{Env, StoreMap, Value};
//!
//! let program = ask("multiplier").flat_map(|m| {
//!     get("counter").flat_map(move |c| {
//!         let next = c.as_i64().unwrap_or(0) + m.as_i64().unwrap_or(0);
//!         put("counter", next).flat_map(move |_| get("counter"))
//!     })
//! });
//!
//! let result = run(
//!     program,
//!     default_handlers(),
//!     Env::from_pairs([("multiplier", 3i64.into())]),
//!     StoreMap::from_pairs([("counter", 0i64)]),
//! );
//! assert_eq!(result.value(), Some(&Value::from(3i64)));
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clock::{RealClock, SharedClock, SimClock};
use crate::env::{Env, EnvCache};
use crate::error::EffectError;
use crate::handle::ExternalReceiver;
use crate::handlers::{
    default_async_handlers, default_handlers, simulation_handlers, HandlerTable, CURRENT_TIME_KEY,
};
use crate::outcome::Outcome;
use crate::program::Program;
use crate::services::RunServices;
use crate::store::{share, SharedLog, StoreMap};
use crate::trace::{EffectTrace, TraceRecorder};
use crate::value::Value;
use crate::vm::driver::Driver;
use crate::vm::external::{BackgroundExecutor, HostLoopExecutor, NoExecutor, SharedExecutor};

/// Everything a finished run exposes.
#[derive(Debug)]
pub struct RunResult {
    /// The root task's outcome.
    pub outcome: Outcome,
    /// The environment at root completion.
    pub env: Env,
    /// Snapshot of the root store.
    pub store: StoreMap,
    /// Every value told to the log, in append order.
    pub log: Vec<Value>,
    /// The effect-call tree, when tracing was enabled.
    pub trace: Option<EffectTrace>,
    /// Formatted failure context: the error, the frames active at the
    /// fault, and the call tree. `None` on success.
    pub diagnostics: Option<String>,
}

impl RunResult {
    pub(crate) fn assemble(
        outcome: Outcome,
        env: Env,
        store: StoreMap,
        log: Vec<Value>,
        trace: Option<EffectTrace>,
        fault_frames: Option<Vec<String>>,
    ) -> RunResult {
        let diagnostics = outcome.error().map(|error| {
            let mut out = format!("run failed: {error}\n");
            match &fault_frames {
                Some(frames) if !frames.is_empty() => {
                    out.push_str("continuation at fault (outermost first): ");
                    out.push_str(&frames.join(" -> "));
                    out.push('\n');
                }
                _ => out.push_str("continuation at fault: <empty>\n"),
            }
            if let Some(trace) = &trace {
                out.push_str("effect call tree:\n");
                out.push_str(&trace.render());
            }
            out
        });
        RunResult {
            outcome,
            env,
            store,
            log,
            trace,
            diagnostics,
        }
    }

    /// Whether the run succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.outcome.value()
    }

    /// The error, if any.
    pub fn error(&self) -> Option<&EffectError> {
        self.outcome.error()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Sync,
    Async,
    Simulation,
}

/// Reusable run configuration: handlers, preset, initial context.
///
/// Mirrors the construct-then-invoke shape: build a `Runtime` once,
/// then [`invoke`](Self::invoke) (or
/// [`invoke_async`](Self::invoke_async)) as many programs as needed.
/// Each invocation gets fresh services - log, cache, clock, bridge.
pub struct Runtime {
    handlers: HandlerTable,
    preset: Preset,
    start_time: f64,
    trace: bool,
    env: Env,
    store: StoreMap,
}

impl Runtime {
    /// The synchronous preset with its default handlers.
    pub fn sync() -> Runtime {
        Runtime::with_preset(Preset::Sync, default_handlers())
    }

    /// The asynchronous preset with its default handlers. Drive with
    /// [`invoke_async`](Self::invoke_async).
    pub fn async_preset() -> Runtime {
        Runtime::with_preset(Preset::Async, default_async_handlers())
    }

    /// The deterministic simulation preset, starting its virtual clock
    /// at `start_time` epoch seconds.
    pub fn simulation(start_time: f64) -> Runtime {
        let mut runtime = Runtime::with_preset(Preset::Simulation, simulation_handlers());
        runtime.start_time = start_time;
        runtime
    }

    fn with_preset(preset: Preset, handlers: HandlerTable) -> Runtime {
        Runtime {
            handlers,
            preset,
            start_time: 0.0,
            trace: false,
            env: Env::new(),
            store: StoreMap::new(),
        }
    }

    /// Replace the handler table. The table must match the preset's
    /// driver; the runtime never swaps handlers under a run.
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Runtime {
        self.handlers = handlers;
        self
    }

    /// The initial environment of every invocation.
    pub fn with_env(mut self, env: Env) -> Runtime {
        self.env = env;
        self
    }

    /// The initial store of every invocation.
    pub fn with_store(mut self, store: StoreMap) -> Runtime {
        self.store = store;
        self
    }

    /// Record the effect-call tree of each invocation.
    pub fn with_trace(mut self, trace: bool) -> Runtime {
        self.trace = trace;
        self
    }

    fn build_services(&self) -> (RunServices, ExternalReceiver, SharedClock) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock: SharedClock = match self.preset {
            Preset::Simulation => Arc::new(SimClock::new(self.start_time)),
            _ => Arc::new(RealClock),
        };
        let executor: SharedExecutor = match self.preset {
            Preset::Sync => Arc::new(BackgroundExecutor::new()),
            Preset::Async => Arc::new(HostLoopExecutor),
            Preset::Simulation => Arc::new(NoExecutor),
        };
        let services = RunServices {
            log: SharedLog::new(),
            env_cache: EnvCache::new(),
            clock: clock.clone(),
            executor,
            sender: tx,
            trace: self.trace.then(TraceRecorder::new),
        };
        (services, rx, clock)
    }

    fn build_driver(&self, program: Program) -> (Driver, SharedClock) {
        let (services, rx, clock) = self.build_services();
        let driver = Driver::new(
            program,
            self.handlers.clone(),
            self.env.clone(),
            share(self.store.clone()),
            services,
            rx,
        );
        (driver, clock)
    }

    /// Run a program to completion on the calling thread.
    ///
    /// Not valid for the asynchronous preset, and not valid from
    /// inside an async context (the driver sleeps on the external
    /// queue with a blocking receive).
    pub fn invoke(&self, program: Program) -> RunResult {
        if self.preset == Preset::Async {
            return RunResult::assemble(
                Outcome::Err(EffectError::invalid(
                    "the asynchronous preset must be driven with invoke_async",
                )),
                self.env.clone(),
                self.store.clone(),
                Vec::new(),
                None,
                None,
            );
        }
        let (driver, clock) = self.build_driver(program);
        let mut result = driver.run_sync();
        if self.preset == Preset::Simulation {
            result.store.insert(CURRENT_TIME_KEY, clock.now());
        }
        result
    }

    /// Run a program to completion on the caller's event loop.
    pub async fn invoke_async(&self, program: Program) -> RunResult {
        let (driver, clock) = self.build_driver(program);
        let mut result = driver.run_async().await;
        if self.preset == Preset::Simulation {
            result.store.insert(CURRENT_TIME_KEY, clock.now());
        }
        result
    }
}

/// Synchronous run of `program` against `handlers`, `env` and `store`.
pub fn run(program: Program, handlers: HandlerTable, env: Env, store: StoreMap) -> RunResult {
    Runtime::sync()
        .with_handlers(handlers)
        .with_env(env)
        .with_store(store)
        .invoke(program)
}

/// Asynchronous run of `program`, driven on the caller's tokio loop.
pub async fn async_run(
    program: Program,
    handlers: HandlerTable,
    env: Env,
    store: StoreMap,
) -> RunResult {
    Runtime::async_preset()
        .with_handlers(handlers)
        .with_env(env)
        .with_store(store)
        .invoke_async(program)
        .await
}

/// Deterministic run of `program` with a virtual clock starting at
/// `start_time` epoch seconds.
pub fn simulation_run(
    program: Program,
    handlers: HandlerTable,
    env: Env,
    store: StoreMap,
    start_time: f64,
) -> RunResult {
    Runtime::simulation(start_time)
        .with_handlers(handlers)
        .with_env(env)
        .with_store(store)
        .invoke(program)
}
