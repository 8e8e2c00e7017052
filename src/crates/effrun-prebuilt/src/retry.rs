//! Bounded retry with exponential backoff

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use effrun_core::effect::{delay, safe};
use effrun_core::error::EffectError;
use effrun_core::program::{pure, raise_error, Program};
use effrun_core::Outcome;

/// Retry configuration.
///
/// Backoff grows by `backoff_factor` per attempt from
/// `initial_interval`, capped at `max_interval`, then stretched by the
/// deterministic `jitter` fraction. All intervals are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Minimum 1.
    pub max_attempts: usize,
    /// Backoff before the second attempt, in seconds.
    pub initial_interval: f64,
    /// Multiplier applied per further attempt.
    pub backoff_factor: f64,
    /// Upper bound on a single backoff, in seconds.
    pub max_interval: f64,
    /// Fraction added on top of each backoff (0.25 = +25%). Zero by
    /// default; kept deterministic so simulation runs reproduce.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-indexed).
    pub fn delay_for(&self, attempt: usize) -> f64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped = raw.min(self.max_interval);
        capped * (1.0 + self.jitter)
    }
}

/// Run `factory(attempt)` up to `policy.max_attempts` times, sleeping
/// the policy's backoff between attempts. The first success wins; the
/// last failure propagates.
///
/// The factory receives the 1-indexed attempt number, so callers can
/// vary the program per attempt (weaker model, smaller batch, ...).
pub fn retry(
    factory: impl Fn(usize) -> Program + Send + Sync + 'static,
    policy: RetryPolicy,
) -> Program {
    attempt(Arc::new(factory), policy, 1)
}

fn attempt(
    factory: Arc<dyn Fn(usize) -> Program + Send + Sync>,
    policy: RetryPolicy,
    n: usize,
) -> Program {
    safe(factory(n)).flat_map(move |wrapped| match wrapped.as_outcome() {
        Some(Outcome::Ok(v)) => pure(v.clone()),
        Some(Outcome::Err(e)) => {
            if n >= policy.max_attempts.max(1) {
                raise_error(e.clone())
            } else {
                delay(policy.delay_for(n)).then(attempt(Arc::clone(&factory), policy.clone(), n + 1))
            }
        }
        None => raise_error(EffectError::raised("safe returned a non-outcome")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_interval: 1.0,
            backoff_factor: 2.0,
            max_interval: 5.0,
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(1), 1.0);
        assert_eq!(policy.delay_for(2), 2.0);
        assert_eq!(policy.delay_for(3), 4.0);
        assert_eq!(policy.delay_for(4), 5.0);
    }

    #[test]
    fn jitter_stretches_deterministically() {
        let policy = RetryPolicy {
            jitter: 0.25,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), 0.5 * 1.25);
    }
}
