//! End-to-end scenarios through the packaged entry points.

use std::time::Instant;

use effrun_core::effect::{
    ask, complete_promise, create_promise, delay, gather, get, get_time, put, raise, safe, spawn,
    structured_log, tell, wait,
};
use effrun_core::handlers::{default_handlers, simulation_handlers};
use effrun_core::program::{first_success, gather_list, pure, sequence};
use effrun_core::{
    run, simulation_run, Effect, EffectError, Env, Outcome, StoreMap, Transformed, Value,
};

fn ok_value(result: &effrun_core::RunResult) -> Value {
    assert!(result.is_ok(), "run failed: {:?}", result.outcome);
    result.value().cloned().expect("ok outcome has a value")
}

#[test]
fn reader_plus_state() {
    let program = ask("multiplier").flat_map(|x| {
        get("counter").flat_map(move |c| {
            let sum = c.as_i64().unwrap_or(0) + x.as_i64().unwrap_or(0);
            put("counter", sum).then(get("counter"))
        })
    });

    let result = run(
        program,
        default_handlers(),
        Env::from_pairs([("multiplier", 3i64.into())]),
        StoreMap::from_pairs([("counter", 0i64)]),
    );

    assert_eq!(ok_value(&result), Value::from(3i64));
    assert_eq!(result.store.get("counter"), Some(&Value::from(3i64)));
}

#[test]
fn safe_preserves_state_written_before_the_error() {
    let program = put("c", 5i64)
        .then(safe(put("c", 9i64).then(raise("boom"))))
        .flat_map(|wrapped| {
            get("c").map(move |c| Value::List(vec![wrapped.clone(), c]))
        });

    let result = run(
        program,
        default_handlers(),
        Env::new(),
        StoreMap::from_pairs([("c", 0i64)]),
    );

    let items = ok_value(&result);
    let items = items.as_list().expect("list result");
    assert_eq!(
        items[0],
        Value::from(Outcome::Err(EffectError::raised("boom"))),
    );
    assert_eq!(items[1], Value::from(9i64));
}

#[test]
fn gather_collects_per_child_outcomes_under_safe() {
    let program = gather_list(vec![
        safe(pure(1i64)),
        safe(raise("x")),
        safe(pure(3i64)),
    ]);

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::List(vec![
            Value::from(Outcome::Ok(Value::from(1i64))),
            Value::from(Outcome::Err(EffectError::raised("x"))),
            Value::from(Outcome::Ok(Value::from(3i64))),
        ]),
    );
}

#[test]
fn promise_coordinates_two_tasks() {
    let program = create_promise().flat_map(|pair| {
        let promise = pair.field("promise").cloned().expect("promise field");
        let future = pair.field("future").cloned().expect("future field");
        spawn(wait(future)).flat_map(move |a| {
            let promise = promise.clone();
            spawn(complete_promise(promise, 42i64)).flat_map(move |b| {
                gather([a.clone(), b.clone()])
            })
        })
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::List(vec![Value::from(42i64), Value::null()]),
    );
}

#[test]
fn intercept_replaces_an_ask_without_consulting_the_env() {
    let program = ask("x").intercept(|effect| {
        Ok(match effect {
            Effect::Ask { .. } => Some(Transformed::Program(pure("replaced"))),
            _ => None,
        })
    });

    // "x" is unbound: reaching the reader handler would fail the run.
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from("replaced"));
}

#[test]
fn simulation_clock_advances_without_wall_time() {
    let program = get_time().flat_map(|t0| {
        delay(3600.0).then(get_time().map(move |t1| {
            Value::from(t1.as_f64().unwrap_or(0.0) - t0.as_f64().unwrap_or(0.0))
        }))
    });

    let started = Instant::now();
    let result = simulation_run(
        program,
        simulation_handlers(),
        Env::new(),
        StoreMap::new(),
        1_700_000_000.0,
    );

    assert_eq!(ok_value(&result), Value::from(3600.0));
    assert!(started.elapsed().as_secs() < 1, "simulation slept for real");
    assert_eq!(
        result.store.get("__current_time__"),
        Some(&Value::from(1_700_000_000.0 + 3600.0)),
    );
}

#[test]
fn empty_and_singleton_gather() {
    let result = run(
        gather(Vec::<Value>::new()),
        default_handlers(),
        Env::new(),
        StoreMap::new(),
    );
    assert_eq!(ok_value(&result), Value::List(vec![]));

    let result = run(
        gather_list(vec![pure(7i64)]),
        default_handlers(),
        Env::new(),
        StoreMap::new(),
    );
    assert_eq!(ok_value(&result), Value::List(vec![Value::from(7i64)]));
}

#[test]
fn missing_env_key_is_a_dedicated_error() {
    let result = run(ask("absent"), default_handlers(), Env::new(), StoreMap::new());
    match result.error() {
        Some(EffectError::MissingEnvKey { key, hint }) => {
            assert_eq!(key, "absent");
            assert!(!hint.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn log_accumulates_in_program_order() {
    let program = tell("first")
        .then(tell(2i64))
        .then(structured_log([("stage", Value::from("done"))]));

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert!(result.is_ok());
    assert_eq!(result.log.len(), 3);
    assert_eq!(result.log[0], Value::from("first"));
    assert_eq!(result.log[1], Value::from(2i64));
    assert_eq!(
        result.log[2],
        Value::record([("stage", Value::from("done"))]),
    );
}

#[test]
fn the_reserved_log_key_reads_the_run_log() {
    let program = tell("x").then(get("__log__"));
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert_eq!(ok_value(&result), Value::List(vec![Value::from("x")]));
}

#[test]
fn sequence_runs_left_to_right() {
    let program = sequence(vec![
        put("a", 1i64).then(pure("one")),
        get("a").map(|v| v),
        pure("three"),
    ]);

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::List(vec![
            Value::from("one"),
            Value::from(1i64),
            Value::from("three"),
        ]),
    );
}

#[test]
fn first_success_skips_failures_and_keeps_the_last_error() {
    let program = first_success(vec![raise("a"), pure(10i64), raise("never reached")]);
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert_eq!(ok_value(&result), Value::from(10i64));

    let program = first_success(vec![raise("a"), raise("b")]);
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert_eq!(result.error(), Some(&EffectError::raised("b")));
}

#[test]
fn nested_safe_wraps_twice() {
    let program = safe(safe(raise("inner")));
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::from(Outcome::Ok(Value::from(Outcome::Err(EffectError::raised(
            "inner"
        ))))),
    );
}

#[test]
fn failing_run_carries_diagnostics_and_a_trace() {
    let runtime = effrun_core::Runtime::sync().with_trace(true);
    let result = runtime.invoke(safe(pure(1i64)).then(ask("missing")));

    assert!(!result.is_ok());
    let diagnostics = result.diagnostics.as_deref().expect("diagnostics on failure");
    assert!(diagnostics.contains("missing env key"));
    assert!(diagnostics.contains("effect call tree"));
    let trace = result.trace.as_ref().expect("trace was enabled");
    assert!(!trace.is_empty());
}
