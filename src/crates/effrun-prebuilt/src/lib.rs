//! # effrun-prebuilt - High-Level Effect Patterns
//!
//! **Ready-to-use compositions** of the core primitives for the
//! recurring shapes of effectful code:
//!
//! - [`timeout`] - bound a program's duration by racing it against a
//!   timer and cancelling the loser
//! - [`retry`] - bounded re-execution with exponential backoff between
//!   attempts
//! - [`with_permit`] - scoped semaphore use that releases on success
//!   *and* on failure
//! - [`fallback_chain`] - try alternatives in order, each under its
//!   own `Safe`; the first success wins, the last failure propagates
//!
//! Everything here is built from the public construction API of
//! `effrun-core`; nothing reaches into the scheduler. That keeps the
//! patterns preset-agnostic: under the simulation preset a retry's
//! backoff sleeps advance the virtual clock instantly, so even
//! long-backoff policies test in microseconds.
//!
//! **Use `effrun-core` directly when** a pattern here almost fits but
//! not quite - these are compositions, not primitives, and forking one
//! into your own module is the intended escape hatch.

mod fallback;
mod retry;
mod scoped;
mod timeout;

pub use fallback::fallback_chain;
pub use retry::{retry, RetryPolicy};
pub use scoped::with_permit;
pub use timeout::timeout;
