//! External execution of host futures
//!
//! `Await` and the asynchronous preset's timers hand real futures to an
//! [`ExternalExecutor`]. The executor runs them wherever the preset
//! says - a dedicated background thread with its own tokio runtime for
//! the synchronous preset, the caller's event loop for the asynchronous
//! preset - and reports the result through the external-completion
//! queue, never by touching scheduler state directly. That queue is the
//! single multi-producer touchpoint of the whole runtime.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::handle::{ExternalCompletion, ExternalKey, ExternalSender, PromiseId};
use crate::value::Value;

/// The result type carried by an externally executed future.
pub type HostResult = std::result::Result<Value, String>;

/// Executes host futures on behalf of the scheduler.
pub trait ExternalExecutor: Send + Sync {
    /// Run `future` somewhere appropriate and enqueue its result as a
    /// completion of `promise`. Must not block the caller.
    fn submit(&self, future: BoxFuture<'static, HostResult>, promise: PromiseId, sender: ExternalSender);
}

/// Shared executor handle.
pub type SharedExecutor = Arc<dyn ExternalExecutor>;

fn completion(promise: PromiseId, result: HostResult) -> ExternalCompletion {
    ExternalCompletion {
        key: ExternalKey::Promise(promise),
        result,
    }
}

struct Job {
    future: BoxFuture<'static, HostResult>,
    promise: PromiseId,
    sender: ExternalSender,
}

/// The synchronous preset's executor: a lazily started background
/// thread owning a single-threaded tokio runtime.
///
/// Jobs run one at a time - an `Await` parks its task for the duration
/// while the rest of the scheduler keeps stepping. The worker exits
/// when the run drops the executor and the job channel closes.
#[derive(Default)]
pub struct BackgroundExecutor {
    tx: Mutex<Option<std_mpsc::Sender<Job>>>,
}

impl BackgroundExecutor {
    pub fn new() -> BackgroundExecutor {
        BackgroundExecutor::default()
    }

    fn worker(rx: std_mpsc::Receiver<Job>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let runtime = match runtime {
            Ok(rt) => rt,
            Err(e) => {
                let message = format!("bridge runtime failed to start: {e}");
                while let Ok(job) = rx.recv() {
                    let _ = job.sender.send(completion(job.promise, Err(message.clone())));
                }
                return;
            }
        };
        while let Ok(job) = rx.recv() {
            let result = runtime.block_on(std::panic::AssertUnwindSafe(job.future).catch_unwind());
            let result = match result {
                Ok(host) => host,
                Err(_) => Err("awaited future panicked".to_string()),
            };
            let _ = job.sender.send(completion(job.promise, result));
        }
    }
}

impl ExternalExecutor for BackgroundExecutor {
    fn submit(&self, future: BoxFuture<'static, HostResult>, promise: PromiseId, sender: ExternalSender) {
        let mut guard = self.tx.lock();
        if guard.is_none() {
            let (tx, rx) = std_mpsc::channel::<Job>();
            let spawned = std::thread::Builder::new()
                .name("effrun-bridge".to_string())
                .spawn(move || Self::worker(rx));
            match spawned {
                Ok(_) => *guard = Some(tx),
                Err(e) => {
                    tracing::error!(error = %e, "failed to start bridge thread");
                    let _ = sender.send(completion(
                        promise,
                        Err(format!("bridge thread failed to start: {e}")),
                    ));
                    return;
                }
            }
        }
        if let Some(tx) = guard.as_ref() {
            if tx
                .send(Job {
                    future,
                    promise,
                    sender: sender.clone(),
                })
                .is_err()
            {
                let _ = sender.send(completion(promise, Err("bridge thread gone".to_string())));
            }
        }
    }
}

/// The asynchronous preset's executor: spawns onto the caller's tokio
/// event loop, so awaits from different tasks genuinely overlap.
#[derive(Debug, Default)]
pub struct HostLoopExecutor;

impl ExternalExecutor for HostLoopExecutor {
    fn submit(&self, future: BoxFuture<'static, HostResult>, promise: PromiseId, sender: ExternalSender) {
        tokio::spawn(async move {
            let result = match std::panic::AssertUnwindSafe(future).catch_unwind().await {
                Ok(host) => host,
                Err(_) => Err("awaited future panicked".to_string()),
            };
            let _ = sender.send(completion(promise, result));
        });
    }
}

/// The simulation preset has no host bridge; anything submitted
/// completes with an error. The `Await` handler rejects first, so this
/// is a backstop for custom handlers.
#[derive(Debug, Default)]
pub struct NoExecutor;

impl ExternalExecutor for NoExecutor {
    fn submit(&self, _future: BoxFuture<'static, HostResult>, promise: PromiseId, sender: ExternalSender) {
        let _ = sender.send(completion(
            promise,
            Err("no external executor in this preset".to_string()),
        ));
    }
}
