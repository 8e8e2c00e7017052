//! The prebuilt patterns, driven through the packaged entry points.

use std::time::{Duration, Instant};

use effrun_core::effect::{
    acquire_semaphore, await_future, create_promise, create_semaphore, modify, raise, safe, wait,
};
use effrun_core::handlers::{default_async_handlers, simulation_handlers};
use effrun_core::program::pure;
use effrun_core::{async_run, simulation_run, EffectError, Env, Program, StoreMap, Value};
use effrun_prebuilt::{fallback_chain, retry, timeout, with_permit, RetryPolicy};

fn flaky(succeed_at: i64) -> Program {
    modify("attempts", |v| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))).flat_map(move |n| {
        if n.as_i64().unwrap_or(0) >= succeed_at {
            pure("ok")
        } else {
            raise("flaky")
        }
    })
}

#[test]
fn retry_succeeds_after_transient_failures() {
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_interval: 1.0,
        backoff_factor: 2.0,
        max_interval: 60.0,
        jitter: 0.0,
    };
    let result = simulation_run(
        retry(move |_| flaky(3), policy),
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );

    assert_eq!(result.value(), Some(&Value::from("ok")));
    assert_eq!(result.store.get("attempts"), Some(&Value::from(3i64)));
    // Two backoffs advanced the virtual clock: 1s + 2s.
    assert_eq!(
        result.store.get("__current_time__"),
        Some(&Value::from(3.0)),
    );
}

#[test]
fn retry_gives_up_with_the_last_error() {
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    let result = simulation_run(
        retry(move |_| flaky(10), policy),
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );

    assert_eq!(result.error(), Some(&EffectError::raised("flaky")));
    assert_eq!(result.store.get("attempts"), Some(&Value::from(2i64)));
}

#[test]
fn with_permit_releases_on_failure() {
    let program = create_semaphore(1).flat_map(|sem| {
        safe(with_permit(sem.clone(), raise("inside")))
            .then(acquire_semaphore(sem.clone()))
            .then(pure("reacquired"))
    });

    let result = simulation_run(
        program,
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );

    assert_eq!(result.value(), Some(&Value::from("reacquired")));
}

#[test]
fn fallback_chain_stops_at_the_first_success() {
    let program = fallback_chain(vec![raise("a"), pure(7i64), raise("unreached")]);
    let result = simulation_run(
        program,
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );
    assert_eq!(result.value(), Some(&Value::from(7i64)));
}

#[test]
fn fallback_chain_propagates_the_last_failure() {
    let program = fallback_chain(vec![raise("a"), raise("b")]);
    let result = simulation_run(
        program,
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );
    assert_eq!(result.error(), Some(&EffectError::raised("b")));
}

#[test]
fn timeout_expires_on_virtual_time_under_simulation() {
    // The guarded program parks forever; the hour-long timer advances
    // the virtual clock instead of sleeping.
    let program = create_promise().flat_map(|pair| {
        let future = pair.field("future").cloned().expect("future field");
        timeout(wait(future), 3600.0)
    });

    let started = Instant::now();
    let result = simulation_run(
        program,
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        0.0,
    );

    match result.error() {
        Some(EffectError::Raised { message, .. }) => {
            assert!(message.contains("timed out"), "message: {message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        result.store.get("__current_time__"),
        Some(&Value::from(3600.0)),
    );
    assert!(started.elapsed().as_secs() < 1, "simulation slept for real");
}

#[tokio::test]
async fn timeout_passes_a_fast_program_through() {
    let program = timeout(pure("quick"), 5.0);
    let result = async_run(program, default_async_handlers(), Env::new(), StoreMap::new()).await;
    assert_eq!(result.value(), Some(&Value::from("quick")));
}

#[tokio::test]
async fn timeout_cancels_a_slow_program() {
    let slow = await_future(|| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Value::from("too late"))
        })
    });

    let program = timeout(slow, 0.05);
    let result = async_run(program, default_async_handlers(), Env::new(), StoreMap::new()).await;

    match result.error() {
        Some(EffectError::Raised { message, .. }) => {
            assert!(message.contains("timed out"), "message: {message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
