//! Run-wide services shared by every task
//!
//! One [`RunServices`] value exists per run. It bundles the pieces that
//! are deliberately *not* per-task: the append-only log, the lazy
//! environment resolution cache, the clock, the external executor and
//! the sending half of the external-completion queue. Spawned children
//! receive the same services handle, which is what makes the log global
//! and lazy environment work shared.

use crate::clock::SharedClock;
use crate::env::EnvCache;
use crate::handle::ExternalSender;
use crate::store::SharedLog;
use crate::trace::TraceRecorder;
use crate::vm::external::SharedExecutor;

/// Shared per-run services.
#[derive(Clone)]
pub struct RunServices {
    /// The run-global append-only log.
    pub log: SharedLog,
    /// Lazy environment resolutions, shared across tasks.
    pub env_cache: EnvCache,
    /// The preset's time source.
    pub clock: SharedClock,
    /// Where `Await` futures and asynchronous timers execute.
    pub executor: SharedExecutor,
    /// Sending half of the external-completion queue.
    pub sender: ExternalSender,
    /// Effect-call recorder, when tracing is enabled.
    pub trace: Option<TraceRecorder>,
}
