//! Error types for program construction and execution
//!
//! All runtime failures flow through [`EffectError`], which implements
//! `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! EffectError
//! ├── MissingEnvKey           - Ask on an absent environment key
//! ├── UnhandledEffect         - no handler registered for an effect kind
//! ├── TaskCancelled           - cooperative cancellation observed
//! ├── PromiseAlreadyCompleted - second complete/fail on one promise
//! ├── SemaphoreOverRelease    - release past capacity
//! ├── Deadlock                - no runnable task, root incomplete
//! ├── AwaitUnsupported        - Await under the simulation preset
//! ├── InvalidEffect           - malformed effect payload
//! └── Raised                  - user-level failure carried as a value
//! ```
//!
//! # Error Handling Patterns
//!
//! Errors unwind the continuation stack frame by frame. A `Safe` effect
//! absorbs the unwind and converts it into an [`Outcome::Err`]; anything
//! that escapes the root task surfaces on
//! [`RunResult::outcome`](crate::runtime::RunResult::outcome).
//!
//! ```rust
//! use effrun_core::error::EffectError;
//!
//! fn describe(err: &EffectError) -> String {
//!     match err {
//!         EffectError::MissingEnvKey { key, .. } => {
//!             format!("configuration gap: {key}")
//!         }
//!         EffectError::TaskCancelled { .. } => "cancelled".to_string(),
//!         other => format!("failed: {other}"),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::effect::EffectKind;
use crate::handle::{PromiseId, SemaphoreId, TaskId};
use crate::value::Value;

/// Convenience result type using [`EffectError`].
pub type Result<T> = std::result::Result<T, EffectError>;

/// All errors a run can produce.
///
/// Variants are compared by payload so that [`Outcome`](crate::Outcome)
/// values are equality-comparable in tests and in user code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// `Ask` was dispatched for a key the environment does not bind.
    ///
    /// The environment is configuration: a miss is a programming error,
    /// unlike the store where `Get` of an absent key returns null.
    #[error("missing env key '{key}' ({hint})")]
    MissingEnvKey {
        /// The key that was requested.
        key: String,
        /// A short hint about how the key should have been provided.
        hint: String,
    },

    /// An effect reached the dispatcher with no registered handler.
    ///
    /// Fatal to the dispatching task; a handler table must cover every
    /// effect kind a program can yield.
    #[error("no handler registered for effect '{kind:?}'")]
    UnhandledEffect {
        /// The kind that had no registry entry.
        kind: EffectKind,
    },

    /// Cooperative cancellation was observed.
    ///
    /// Raised into a cancelled task at its next scheduling point, and
    /// into any task waiting on a cancelled task's future.
    #[error("task {task:?} cancelled")]
    TaskCancelled {
        /// The cancelled task.
        task: TaskId,
    },

    /// A promise was completed or failed a second time.
    #[error("promise {promise:?} already completed")]
    PromiseAlreadyCompleted {
        /// The promise that was already resolved.
        promise: PromiseId,
    },

    /// `ReleaseSemaphore` was dispatched with all permits already available.
    #[error("semaphore {semaphore:?} released past capacity")]
    SemaphoreOverRelease {
        /// The over-released semaphore.
        semaphore: SemaphoreId,
    },

    /// The scheduler went idle with the root task incomplete and no
    /// external completion possible.
    #[error("deadlock: {blocked} task(s) parked, none runnable, no external completion pending")]
    Deadlock {
        /// Number of tasks parked at the time of detection.
        blocked: usize,
    },

    /// `Await` was dispatched under a preset without a host bridge
    /// (the simulation preset).
    #[error("Await is not supported by this preset")]
    AwaitUnsupported,

    /// An effect payload failed validation before dispatch.
    #[error("invalid effect: {0}")]
    InvalidEffect(String),

    /// A user-level failure: a program body, store transform, intercept
    /// transform or awaited host future returned an error.
    ///
    /// `payload` optionally carries a structured error value, the way
    /// `FailPromise` delivers one.
    #[error("{message}")]
    Raised {
        /// Human-readable description.
        message: String,
        /// Optional structured error value.
        payload: Option<Value>,
    },
}

impl EffectError {
    /// Create a [`EffectError::MissingEnvKey`] with a default hint.
    pub fn missing_env(key: impl Into<String>) -> Self {
        let key = key.into();
        let hint = format!("bind '{key}' in the run environment or wrap the Ask in Local");
        Self::MissingEnvKey { key, hint }
    }

    /// Create a [`EffectError::Raised`] from a message.
    ///
    /// ```rust
    /// use effrun_core::error::EffectError;
    ///
    /// let err = EffectError::raised("boom");
    /// assert_eq!(format!("{err}"), "boom");
    /// ```
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised {
            message: message.into(),
            payload: None,
        }
    }

    /// Create a [`EffectError::Raised`] carrying a structured payload.
    pub fn raised_with(message: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self::Raised {
            message: message.into(),
            payload: Some(payload.into()),
        }
    }

    /// Create a [`EffectError::InvalidEffect`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidEffect(message.into())
    }

    /// Whether this error is a cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::TaskCancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_compares_by_payload() {
        assert_eq!(EffectError::raised("boom"), EffectError::raised("boom"));
        assert_ne!(EffectError::raised("boom"), EffectError::raised("bang"));
    }

    #[test]
    fn missing_env_mentions_key_in_hint() {
        let err = EffectError::missing_env("api_key");
        match err {
            EffectError::MissingEnvKey { key, hint } => {
                assert_eq!(key, "api_key");
                assert!(hint.contains("api_key"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
