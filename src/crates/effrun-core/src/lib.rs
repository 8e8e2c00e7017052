//! # effrun-core - An Algebraic-Effects Runtime
//!
//! **Programs as data, effects as values** - build lazy, composable
//! computations whose side effects are first-class records, and run
//! them on a stepping virtual machine with a cooperative task
//! scheduler.
//!
//! ## Overview
//!
//! `effrun-core` executes [`Program`] values: trees of immediate
//! values, effect records and continuations. Nothing happens at
//! construction time; a run entry point interprets the tree one
//! dispatch at a time, routing every [`Effect`](effect::Effect) to the
//! handler registered for its kind. Because effects are plain values,
//! they can be substituted, replaced, recorded and tested without
//! touching the code that yields them.
//!
//! The crate provides:
//!
//! - **A stepping evaluator** - a CESK-shaped machine over (program,
//!   environment, store, kontinuation), with typed frames and
//!   first-class user frames
//! - **A cooperative scheduler** - task table, FIFO ready queue,
//!   promise registry, FIFO semaphores; tasks interleave only at
//!   effect boundaries
//! - **An external bridge** - a thread-safe completion queue plus
//!   promise handles that outside code resolves from any thread
//! - **Three presets** - synchronous, asynchronous (tokio-driven) and
//!   deterministic simulation, differing only in their handler tables
//!   and services
//!
//! ## Core Concepts
//!
//! ### 1. Effects are data
//!
//! `Ask`, `Put`, `Tell`, `Spawn`, `Delay`, `Await` and the rest of the
//! taxonomy are variants of one enum. Constructing one does nothing;
//! dispatching it consults the run's [`HandlerTable`]. User tables can
//! override any entry or register `Custom` kinds.
//!
//! ### 2. Programs compose
//!
//! [`pure`] lifts a value; [`Program::flat_map`] sequences;
//! [`KleisliFn`](program::KleisliFn) names a compound program and
//! binds arguments. Programs are re-runnable: executing one never
//! consumes it.
//!
//! ### 3. The kontinuation is a stack of typed frames
//!
//! `Safe` catches by pushing a frame that converts an unwinding error
//! into an [`Outcome`]; `Local` restores the environment the same way;
//! `Intercept` contributes effect transforms consulted at every
//! dispatch beneath it. User-defined [`Frame`](frame::Frame)s go
//! through exactly the same protocol.
//!
//! ### 4. Concurrency is cooperative
//!
//! `Spawn` snapshots the store; `Gather` shares it. Tasks park on
//! futures and the scheduler wakes them when promises resolve -
//! including promises completed from outside the VM through
//! [`ExternalPromise`](handle::ExternalPromise).
//!
//! ## Quick Start
//!
//! ```rust
//! use effrun_core::effect::{ask, get, put};
//! use effrun_core::handlers::default_handlers;
//! use effrun_core::{run, Env, StoreMap, Value};
//!
//! let program = ask("multiplier").flat_map(|m| {
//!     get("counter").flat_map(move |c| {
//!         let next = c.as_i64().unwrap_or(0) + m.as_i64().unwrap_or(0);
//!         put("counter", next)
//!     })
//! });
//!
//! let result = run(
//!     program,
//!     default_handlers(),
//!     Env::from_pairs([("multiplier", 3i64.into())]),
//!     StoreMap::from_pairs([("counter", 0i64)]),
//! );
//! assert!(result.is_ok());
//! assert_eq!(result.store.get("counter"), Some(&Value::from(3i64)));
//! ```
//!
//! ## Picking a preset
//!
//! | Entry point | Time | Await | Gather |
//! |---|---|---|---|
//! | [`run`] | real, blocking | background thread | sequential |
//! | [`async_run`] | tokio timers | caller's loop | concurrent |
//! | [`simulation_run`] | virtual, instant | rejected | sequential |
//!
//! The handler table and the driver must match; the runtime never
//! swaps handlers under a running program.

pub mod clock;
pub mod effect;
pub mod env;
pub mod error;
pub mod frame;
pub mod handle;
pub mod handlers;
pub mod outcome;
pub mod program;
pub mod runtime;
pub mod services;
pub mod store;
pub mod trace;
pub mod value;
pub mod vm;

pub use clock::{Clock, RealClock, SimClock};
pub use effect::{Effect, EffectKind, InterceptFn, Transformed};
pub use env::Env;
pub use error::{EffectError, Result};
pub use frame::{Frame, FrameCx, FrameResult};
pub use handle::{
    complete_by_id, ExternalPromise, FutureHandle, PromiseHandle, PromiseId, SemaphoreHandle,
    SemaphoreId, TaskHandle, TaskId,
};
pub use handlers::{
    default_async_handlers, default_handlers, simulation_handlers, Dispatch, EffectCx,
    EffectHandler, HandlerTable,
};
pub use outcome::Outcome;
pub use program::{first_success, gather_list, pure, sequence, KleisliFn, Program};
pub use runtime::{async_run, run, simulation_run, RunResult, Runtime};
pub use store::{SharedLog, StoreMap, LOG_KEY};
pub use trace::{EffectTrace, TraceEvent};
pub use value::Value;
