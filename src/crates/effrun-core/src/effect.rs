//! The effect taxonomy - side effects described as data
//!
//! An [`Effect`] is a frozen description of an operation the program
//! wants performed: read a key, append to the log, spawn a task, wait
//! on a future. Effects do nothing by themselves; the evaluator looks
//! up the handler registered for the effect's [`EffectKind`] and lets
//! it act. Effects are ordinary values - they can be constructed, put
//! in payloads of other effects, and transformed by `Intercept`.
//!
//! The [`Effect::Custom`] variant keeps the taxonomy open: user handler
//! tables can register behaviour for named custom effects without this
//! enum changing. When a custom effect stabilises across enough users
//! it graduates to a named variant.
//!
//! The free functions at the bottom of this module are the construction
//! API: each wraps one effect into a runnable
//! [`Program`](crate::Program).
//!
//! # Examples
//!
//! ```rust
//! use effrun_core::effect::{ask, put, tell};
//!
//! let program = ask("multiplier")
//!     .flat_map(|m| put("last_multiplier", m.clone()).then(tell(m)));
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{EffectError, Result};
use crate::program::Program;
use crate::value::Value;

/// A store transform used by `Modify`: old value in, new value out.
#[derive(Clone)]
pub struct ValueFn(pub(crate) Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>);

impl ValueFn {
    pub fn new(f: impl Fn(Value) -> Result<Value> + Send + Sync + 'static) -> ValueFn {
        ValueFn(Arc::new(f))
    }

    pub fn apply(&self, value: Value) -> Result<Value> {
        (self.0)(value)
    }
}

impl fmt::Debug for ValueFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFn")
    }
}

/// Factory for the host future awaited by `Await`.
///
/// A factory rather than a future so the owning effect stays cloneable
/// and the program stays re-runnable: every dispatch builds a fresh
/// future.
#[derive(Clone)]
pub struct AwaitFn(
    pub(crate) Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync>,
);

impl AwaitFn {
    pub fn new(
        f: impl Fn() -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync + 'static,
    ) -> AwaitFn {
        AwaitFn(Arc::new(f))
    }

    pub fn build(&self) -> BoxFuture<'static, std::result::Result<Value, String>> {
        (self.0)()
    }
}

impl fmt::Debug for AwaitFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AwaitFn")
    }
}

/// What an intercept transform turned an effect into.
#[derive(Debug, Clone)]
pub enum Transformed {
    /// Substitute: dispatch this effect instead. It skips the rest of
    /// the frame that produced it but still traverses the other frames.
    Effect(Effect),
    /// Replace: run this program in place of the effect. Its own
    /// yielded effects go through the full intercept chain again.
    Program(Program),
}

/// One intercept transform. `None` means "not mine, try the next one".
#[derive(Clone)]
pub struct InterceptFn(
    pub(crate) Arc<dyn Fn(&Effect) -> Result<Option<Transformed>> + Send + Sync>,
);

impl InterceptFn {
    pub fn new(
        f: impl Fn(&Effect) -> Result<Option<Transformed>> + Send + Sync + 'static,
    ) -> InterceptFn {
        InterceptFn(Arc::new(f))
    }

    pub fn apply(&self, effect: &Effect) -> Result<Option<Transformed>> {
        (self.0)(effect)
    }
}

impl fmt::Debug for InterceptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InterceptFn")
    }
}

/// A side effect described as data.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Effect {
    // Reader
    /// Read a key from the environment. Absent keys are an error.
    Ask { key: String },
    /// Run `sub` with overrides layered on the environment, restoring
    /// the outer environment afterwards on both success and error.
    Local {
        overrides: Arc<Vec<(String, Value)>>,
        sub: Arc<Program>,
    },

    // State
    /// Read a store key; absent keys read as JSON null.
    Get { key: String },
    /// Write a store key.
    Put { key: String, value: Value },
    /// Atomic read-transform-write of a store key. If the transform
    /// errors, the store is unchanged.
    Modify { key: String, f: ValueFn },

    // Writer
    /// Append a value to the run log.
    Tell { value: Value },
    /// Run `sub` and return its value together with the log entries
    /// appended while it ran.
    Listen { sub: Arc<Program> },

    // Control
    /// An immediate value.
    Pure { value: Value },
    /// Run `sub`, converting success into `Ok(..)` and an escaping
    /// error into `Err(..)`. No rollback: store and log changes made
    /// before the error persist.
    Safe { sub: Arc<Program> },
    /// Run `sub` with transforms applied to every effect it dispatches.
    Intercept {
        sub: Arc<Program>,
        transforms: Arc<[InterceptFn]>,
    },

    // Concurrency
    /// Start a task running `program` with a snapshot of the store.
    Spawn { program: Arc<Program> },
    /// Park until a future (or task) resolves; deliver its value or
    /// re-raise its error.
    Wait { future: Value },
    /// Wait for every item (futures, tasks or programs), delivering the
    /// values in input order. Fail-fast on the first error.
    Gather { items: Vec<Value> },
    /// Wait for the first item to resolve; the rest keep running.
    Race { items: Vec<Value> },
    /// Allocate a promise/future pair.
    CreatePromise,
    /// Resolve a promise with a value. At most once.
    CompletePromise { promise: Value, value: Value },
    /// Resolve a promise with an error value. At most once.
    FailPromise { promise: Value, error: Value },
    /// Allocate a promise completed from outside the VM.
    CreateExternalPromise,
    /// Request cooperative cancellation of a task.
    CancelTask { task: Value },
    /// Whether a task has reached a terminal status.
    TaskDone { task: Value },

    // Time
    /// Sleep for a non-negative number of seconds.
    Delay { seconds: f64 },
    /// The current time in epoch seconds.
    GetTime,
    /// Sleep until an epoch-seconds target; past targets return
    /// immediately.
    WaitUntil { target: f64 },

    // Host bridge
    /// Run a host future and deliver its result. The only bridge to
    /// host coroutines.
    Await { factory: AwaitFn },

    // Semaphores
    /// Allocate a counting semaphore with `permits` >= 1.
    CreateSemaphore { permits: usize },
    /// Take a permit, parking FIFO when none is available.
    AcquireSemaphore { semaphore: Value },
    /// Return a permit, waking the longest-parked acquirer first.
    ReleaseSemaphore { semaphore: Value },

    /// An extension effect served by a user-registered handler.
    Custom { name: Arc<str>, payload: Value },
}

/// Registry key: which handler serves an effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Ask,
    Local,
    Get,
    Put,
    Modify,
    Tell,
    Listen,
    Pure,
    Safe,
    Intercept,
    Spawn,
    Wait,
    Gather,
    Race,
    CreatePromise,
    CompletePromise,
    FailPromise,
    CreateExternalPromise,
    CancelTask,
    TaskDone,
    Delay,
    GetTime,
    WaitUntil,
    Await,
    CreateSemaphore,
    AcquireSemaphore,
    ReleaseSemaphore,
    Custom(String),
}

impl Effect {
    /// The registry key of this effect.
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Ask { .. } => EffectKind::Ask,
            Effect::Local { .. } => EffectKind::Local,
            Effect::Get { .. } => EffectKind::Get,
            Effect::Put { .. } => EffectKind::Put,
            Effect::Modify { .. } => EffectKind::Modify,
            Effect::Tell { .. } => EffectKind::Tell,
            Effect::Listen { .. } => EffectKind::Listen,
            Effect::Pure { .. } => EffectKind::Pure,
            Effect::Safe { .. } => EffectKind::Safe,
            Effect::Intercept { .. } => EffectKind::Intercept,
            Effect::Spawn { .. } => EffectKind::Spawn,
            Effect::Wait { .. } => EffectKind::Wait,
            Effect::Gather { .. } => EffectKind::Gather,
            Effect::Race { .. } => EffectKind::Race,
            Effect::CreatePromise => EffectKind::CreatePromise,
            Effect::CompletePromise { .. } => EffectKind::CompletePromise,
            Effect::FailPromise { .. } => EffectKind::FailPromise,
            Effect::CreateExternalPromise => EffectKind::CreateExternalPromise,
            Effect::CancelTask { .. } => EffectKind::CancelTask,
            Effect::TaskDone { .. } => EffectKind::TaskDone,
            Effect::Delay { .. } => EffectKind::Delay,
            Effect::GetTime => EffectKind::GetTime,
            Effect::WaitUntil { .. } => EffectKind::WaitUntil,
            Effect::Await { .. } => EffectKind::Await,
            Effect::CreateSemaphore { .. } => EffectKind::CreateSemaphore,
            Effect::AcquireSemaphore { .. } => EffectKind::AcquireSemaphore,
            Effect::ReleaseSemaphore { .. } => EffectKind::ReleaseSemaphore,
            Effect::Custom { name, .. } => EffectKind::Custom(name.to_string()),
        }
    }

    /// Wrap into a runnable program.
    pub fn into_program(self) -> Program {
        Program::Effect(self)
    }
}

// Construction API. Each returns a Program so effects compose with
// flat_map/map directly.

/// Read `key` from the environment.
pub fn ask(key: impl Into<String>) -> Program {
    Effect::Ask { key: key.into() }.into_program()
}

/// Run `sub` with `overrides` layered on the environment.
pub fn local<K: Into<String>, V: Into<Value>>(
    overrides: impl IntoIterator<Item = (K, V)>,
    sub: Program,
) -> Program {
    Effect::Local {
        overrides: Arc::new(
            overrides
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ),
        sub: Arc::new(sub),
    }
    .into_program()
}

/// Read `key` from the store (absent keys read as null).
pub fn get(key: impl Into<String>) -> Program {
    Effect::Get { key: key.into() }.into_program()
}

/// Write `value` at `key` in the store.
pub fn put(key: impl Into<String>, value: impl Into<Value>) -> Program {
    Effect::Put {
        key: key.into(),
        value: value.into(),
    }
    .into_program()
}

/// Atomically transform the value at `key`.
pub fn modify(
    key: impl Into<String>,
    f: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
) -> Program {
    Effect::Modify {
        key: key.into(),
        f: ValueFn::new(f),
    }
    .into_program()
}

/// Alias of [`modify`] for read-modify-write call sites that want the
/// atomicity spelled out.
pub fn atomic_update(
    key: impl Into<String>,
    f: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
) -> Program {
    modify(key, f)
}

/// Append `value` to the run log.
pub fn tell(value: impl Into<Value>) -> Program {
    Effect::Tell {
        value: value.into(),
    }
    .into_program()
}

/// Append a structured record to the run log. Sugar for [`tell`] of a
/// record value.
pub fn structured_log<K: Into<String>>(
    fields: impl IntoIterator<Item = (K, Value)>,
) -> Program {
    tell(Value::record(fields))
}

/// Run `sub` and return `{value, log}` with the entries it appended.
pub fn listen(sub: Program) -> Program {
    Effect::Listen { sub: Arc::new(sub) }.into_program()
}

/// Run `sub`, wrapping its result into an [`Outcome`](crate::Outcome).
pub fn safe(sub: Program) -> Program {
    Effect::Safe { sub: Arc::new(sub) }.into_program()
}

/// Run `sub` with `transforms` applied to every effect it dispatches.
pub fn intercept_with(sub: Program, transforms: Vec<InterceptFn>) -> Program {
    Effect::Intercept {
        sub: Arc::new(sub),
        transforms: transforms.into(),
    }
    .into_program()
}

/// Start `program` as a task with a snapshot of the store.
pub fn spawn(program: Program) -> Program {
    Effect::Spawn {
        program: Arc::new(program),
    }
    .into_program()
}

/// Park until `future` (a future or task) resolves.
pub fn wait(future: impl Into<Value>) -> Program {
    Effect::Wait {
        future: future.into(),
    }
    .into_program()
}

/// Wait for every item; results in input order; fail-fast.
pub fn gather(items: impl IntoIterator<Item = Value>) -> Program {
    Effect::Gather {
        items: items.into_iter().collect(),
    }
    .into_program()
}

/// Wait for the first item to resolve; returns `{first, value, rest}`.
pub fn race(items: impl IntoIterator<Item = Value>) -> Program {
    Effect::Race {
        items: items.into_iter().collect(),
    }
    .into_program()
}

/// Allocate a promise/future pair; returns `{promise, future}`.
pub fn create_promise() -> Program {
    Effect::CreatePromise.into_program()
}

/// Resolve `promise` with `value`.
pub fn complete_promise(promise: impl Into<Value>, value: impl Into<Value>) -> Program {
    Effect::CompletePromise {
        promise: promise.into(),
        value: value.into(),
    }
    .into_program()
}

/// Resolve `promise` with an error value.
pub fn fail_promise(promise: impl Into<Value>, error: impl Into<Value>) -> Program {
    Effect::FailPromise {
        promise: promise.into(),
        error: error.into(),
    }
    .into_program()
}

/// Allocate an externally completed promise; returns `{promise, future}`.
pub fn create_external_promise() -> Program {
    Effect::CreateExternalPromise.into_program()
}

/// Request cooperative cancellation of `task`.
pub fn cancel_task(task: impl Into<Value>) -> Program {
    Effect::CancelTask { task: task.into() }.into_program()
}

/// Whether `task` has reached a terminal status.
pub fn task_done(task: impl Into<Value>) -> Program {
    Effect::TaskDone { task: task.into() }.into_program()
}

/// Sleep for `seconds`.
pub fn delay(seconds: f64) -> Program {
    Effect::Delay { seconds }.into_program()
}

/// The current time in epoch seconds.
pub fn get_time() -> Program {
    Effect::GetTime.into_program()
}

/// Sleep until `target` epoch seconds.
pub fn wait_until(target: f64) -> Program {
    Effect::WaitUntil { target }.into_program()
}

/// Await a host future built by `factory`.
pub fn await_future(
    factory: impl Fn() -> BoxFuture<'static, std::result::Result<Value, String>>
        + Send
        + Sync
        + 'static,
) -> Program {
    Effect::Await {
        factory: AwaitFn::new(factory),
    }
    .into_program()
}

/// Allocate a counting semaphore. `permits` of 1 is a mutex.
pub fn create_semaphore(permits: usize) -> Program {
    Effect::CreateSemaphore { permits }.into_program()
}

/// Take a permit from `semaphore`, parking FIFO when empty.
///
/// Permits are not released automatically on task failure; pair with
/// a scoped-release pattern when the guarded program can fail.
pub fn acquire_semaphore(semaphore: impl Into<Value>) -> Program {
    Effect::AcquireSemaphore {
        semaphore: semaphore.into(),
    }
    .into_program()
}

/// Return a permit to `semaphore`.
pub fn release_semaphore(semaphore: impl Into<Value>) -> Program {
    Effect::ReleaseSemaphore {
        semaphore: semaphore.into(),
    }
    .into_program()
}

/// A custom effect served by a user-registered handler.
pub fn custom(name: impl Into<Arc<str>>, payload: impl Into<Value>) -> Program {
    Effect::Custom {
        name: name.into(),
        payload: payload.into(),
    }
    .into_program()
}

/// An effect raising a user-level error when dispatched. Handy for
/// "unreachable arm" and validation failures inside program bodies.
pub fn raise(message: impl Into<String>) -> Program {
    crate::program::raise_error(EffectError::raised(message))
}
