//! Tasks, promises, semaphores, cancellation and the external bridge.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use effrun_core::effect::{
    acquire_semaphore, ask, await_future, cancel_task, complete_promise, create_external_promise,
    create_promise, create_semaphore, gather, get, modify, put, race, release_semaphore, safe,
    spawn, task_done, tell, wait,
};
use effrun_core::handlers::{default_async_handlers, default_handlers};
use effrun_core::program::{gather_list, pure, Program};
use effrun_core::{
    async_run, run, Dispatch, Effect, EffectCx, EffectError, EffectHandler, EffectKind, Env,
    Outcome, StoreMap, Transformed, Value,
};

fn ok_value(result: &effrun_core::RunResult) -> Value {
    assert!(result.is_ok(), "run failed: {:?}", result.outcome);
    result.value().cloned().expect("ok outcome has a value")
}

#[test]
fn spawned_tasks_get_an_isolated_store_snapshot() {
    let program = put("c", 1i64)
        .then(spawn(put("c", 99i64)))
        .flat_map(|child| wait(child).then(get("c")));

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from(1i64));
}

#[test]
fn gather_children_share_the_parent_store() {
    let program = put("c", 1i64)
        .then(gather_list(vec![put("c", 99i64)]))
        .then(get("c"));

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from(99i64));
}

#[test]
fn semaphore_wakes_waiters_in_fifo_order() {
    fn worker(sem: Value, label: i64) -> Program {
        acquire_semaphore(sem.clone())
            .then(tell(label))
            .then(release_semaphore(sem))
    }

    let program = create_semaphore(1).flat_map(|sem| {
        acquire_semaphore(sem.clone()).flat_map(move |_| {
            let sem = sem.clone();
            spawn(worker(sem.clone(), 1)).flat_map(move |c1| {
                let sem = sem.clone();
                spawn(worker(sem.clone(), 2)).flat_map(move |c2| {
                    let sem = sem.clone();
                    let c1 = c1.clone();
                    spawn(worker(sem.clone(), 3)).flat_map(move |c3| {
                        release_semaphore(sem.clone())
                            .then(gather([c1.clone(), c2.clone(), c3.clone()]))
                    })
                })
            })
        })
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert!(result.is_ok(), "run failed: {:?}", result.outcome);
    assert_eq!(
        result.log,
        vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)],
    );
}

#[test]
fn over_release_raises() {
    let program = create_semaphore(1).flat_map(|sem| release_semaphore(sem));
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert!(matches!(
        result.error(),
        Some(EffectError::SemaphoreOverRelease { .. }),
    ));
}

#[test]
fn double_completion_raises_promise_already_completed() {
    let program = create_promise().flat_map(|pair| {
        let promise = pair.field("promise").cloned().expect("promise field");
        complete_promise(promise.clone(), 1i64).then(complete_promise(promise.clone(), 2i64))
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert!(matches!(
        result.error(),
        Some(EffectError::PromiseAlreadyCompleted { .. }),
    ));
}

#[test]
fn waiting_on_a_cancelled_task_raises_task_cancelled() {
    let program = create_promise().flat_map(|pair| {
        let future = pair.field("future").cloned().expect("future field");
        spawn(wait(future)).flat_map(|child| {
            let child = child.clone();
            cancel_task(child.clone())
                .then(safe(wait(child.clone())))
                .flat_map(move |wrapped| {
                    task_done(child.clone()).map(move |done| {
                        Value::List(vec![wrapped.clone(), done])
                    })
                })
        })
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    let items = ok_value(&result);
    let items = items.as_list().expect("list result");
    match items[0].as_outcome() {
        Some(Outcome::Err(EffectError::TaskCancelled { .. })) => {}
        other => panic!("unexpected wait outcome: {other:?}"),
    }
    assert_eq!(items[1], Value::from(true));
}

#[test]
fn race_returns_the_first_resolved_future() {
    let program = create_promise().flat_map(|pair| {
        let future = pair.field("future").cloned().expect("future field");
        spawn(pure(1i64)).flat_map(move |fast| {
            let future = future.clone();
            spawn(wait(future)).flat_map(move |slow| {
                let fast = fast.clone();
                race([fast.clone(), slow.clone()]).map(move |won| {
                    let first_is_fast = match (won.field("first"), fast.waitable()) {
                        (Some(Value::Future(f)), Some(expect)) => *f == expect,
                        _ => false,
                    };
                    let rest_len = won
                        .field("rest")
                        .and_then(|r| r.as_list().map(<[Value]>::len))
                        .unwrap_or_default();
                    Value::List(vec![
                        Value::from(first_is_fast),
                        won.field("value").cloned().unwrap_or_else(Value::null),
                        Value::from(rest_len as i64),
                    ])
                })
            })
        })
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::List(vec![Value::from(true), Value::from(1i64), Value::from(1i64)]),
    );
}

#[test]
fn deadlock_is_detected_when_nothing_can_wake_the_run() {
    let program = create_promise().flat_map(|pair| {
        wait(pair.field("future").cloned().expect("future field"))
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert!(matches!(result.error(), Some(EffectError::Deadlock { .. })));
}

#[test]
fn external_promise_completed_from_a_thread_wakes_a_sync_run() {
    let program = create_external_promise().flat_map(|pair| {
        if let Some(Value::External(ext)) = pair.field("promise") {
            let ext = ext.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                assert!(ext.complete(9i64));
                assert!(!ext.complete(10i64));
            });
        }
        wait(pair.field("future").cloned().expect("future field"))
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from(9i64));
}

#[test]
fn await_runs_on_the_background_bridge_in_a_sync_run() {
    let program = await_future(|| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Value::from("bridged"))
        })
    });

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from("bridged"));
}

#[tokio::test]
async fn awaits_overlap_under_the_async_preset() {
    fn sleeper(ms: u64, label: &'static str) -> Program {
        await_future(move || {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::from(label))
            })
        })
    }

    let program = spawn(sleeper(100, "a")).flat_map(|a| {
        spawn(sleeper(100, "b")).flat_map(move |b| gather([a.clone(), b.clone()]))
    });

    let started = Instant::now();
    let result = async_run(program, default_async_handlers(), Env::new(), StoreMap::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(
        ok_value(&result),
        Value::List(vec![Value::from("a"), Value::from("b")]),
    );
    assert!(
        elapsed < Duration::from_millis(180),
        "awaits ran sequentially: {elapsed:?}",
    );
}

#[tokio::test]
async fn async_delay_zero_is_a_noop_yield() {
    let program = effrun_core::effect::delay(0.0).then(pure("done"));
    let result = async_run(program, default_async_handlers(), Env::new(), StoreMap::new()).await;
    assert_eq!(ok_value(&result), Value::from("done"));
}

fn counted_lazy() -> Program {
    modify("evals", |v| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))).then(pure(42i64))
}

#[test]
fn lazy_env_entries_evaluate_once_and_share_across_spawns() {
    let env = Env::from_pairs([("expensive", Value::from(counted_lazy()))]);

    let program = ask("expensive").flat_map(|first| {
        ask("expensive").flat_map(move |second| {
            let first = first.clone();
            spawn(ask("expensive")).flat_map(move |child| {
                let first = first.clone();
                let second = second.clone();
                wait(child.clone()).flat_map(move |third| {
                    let items = vec![first.clone(), second.clone(), third];
                    get("evals").map(move |evals| {
                        let mut all = items.clone();
                        all.push(evals);
                        Value::List(all)
                    })
                })
            })
        })
    });

    let result = run(program, default_handlers(), env, StoreMap::new());

    assert_eq!(
        ok_value(&result),
        Value::List(vec![
            Value::from(42i64),
            Value::from(42i64),
            Value::from(42i64),
            Value::from(1i64),
        ]),
    );
}

#[test]
fn substitution_skips_its_own_frame_but_traverses_outer_ones() {
    let inner = |effect: &Effect| {
        Ok(match effect {
            Effect::Ask { key } if key == "a" => {
                Some(Transformed::Effect(Effect::Ask { key: "b".into() }))
            }
            _ => None,
        })
    };
    let outer = |effect: &Effect| {
        Ok(match effect {
            Effect::Ask { key } if key == "b" => Some(Transformed::Program(pure("outer-won"))),
            _ => None,
        })
    };

    let program = ask("a").intercept(inner).intercept(outer);
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert_eq!(ok_value(&result), Value::from("outer-won"));

    // With only the substituting frame, the substituted effect skips
    // that frame's remaining transforms and reads the env directly.
    let both = move |effect: &Effect| {
        if let Effect::Ask { key } = effect {
            if key == "a" {
                return Ok(Some(Transformed::Effect(Effect::Ask { key: "b".into() })));
            }
        }
        if matches!(effect, Effect::Ask { .. }) {
            return Ok(Some(Transformed::Program(pure("second-transform"))));
        }
        Ok(None)
    };
    let program = ask("a").intercept(both);
    let result = run(
        program,
        default_handlers(),
        Env::from_pairs([("b", "from-env".into())]),
        StoreMap::new(),
    );
    assert_eq!(ok_value(&result), Value::from("from-env"));
}

struct DoublingHandler;

impl EffectHandler for DoublingHandler {
    fn handle(&self, effect: Effect, _cx: &mut EffectCx<'_>) -> effrun_core::Result<Dispatch> {
        match effect {
            Effect::Custom { payload, .. } => Ok(Dispatch::Value(Value::from(
                payload.as_i64().unwrap_or(0) * 2,
            ))),
            other => Err(EffectError::invalid(format!("got {:?}", other.kind()))),
        }
    }
}

#[test]
fn custom_effects_dispatch_through_registered_handlers() {
    let handlers = default_handlers().with_handler(
        EffectKind::Custom("double".to_string()),
        Arc::new(DoublingHandler),
    );

    let program = effrun_core::effect::custom("double", 21i64);
    let result = run(program, handlers, Env::new(), StoreMap::new());
    assert_eq!(ok_value(&result), Value::from(42i64));
}

#[test]
fn unregistered_effects_fail_the_run() {
    let program = effrun_core::effect::custom("nope", Value::null());
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    assert!(matches!(
        result.error(),
        Some(EffectError::UnhandledEffect { .. }),
    ));
}

#[test]
fn modify_failure_leaves_the_store_unchanged() {
    let failing = Arc::new(Mutex::new(0u32));
    let observed = failing.clone();
    let program = put("n", 10i64)
        .then(safe(modify("n", move |_| {
            *observed.lock().unwrap() += 1;
            Err(EffectError::raised("transform refused"))
        })))
        .then(get("n"));

    let result = run(program, default_handlers(), Env::new(), StoreMap::new());

    assert_eq!(ok_value(&result), Value::from(10i64));
    assert_eq!(*failing.lock().unwrap(), 1);
}
