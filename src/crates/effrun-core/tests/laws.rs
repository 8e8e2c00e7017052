//! Algebraic laws of programs, checked generatively.

use proptest::prelude::*;

use effrun_core::effect::{ask, get, local, put, raise, safe, tell};
use effrun_core::program::{gather_list, pure, Program};
use effrun_core::{run, default_handlers, Env, Outcome, StoreMap, Value};

/// A small family of effectful continuations, indexed so proptest can
/// pick one.
fn denote(index: u8, v: i64) -> Program {
    match index % 3 {
        0 => pure(v.wrapping_mul(2)),
        1 => tell(v).then(pure(v.wrapping_add(1))),
        _ => put("k", v).then(get("k")),
    }
}

/// Everything observable about a run from a fixed initial context.
fn observe(program: Program) -> (Outcome, Vec<Value>, Option<Value>) {
    let result = run(program, default_handlers(), Env::new(), StoreMap::new());
    let store_k = result.store.get("k").cloned();
    (result.outcome, result.log, store_k)
}

fn as_i64(v: &Value) -> i64 {
    v.as_i64().unwrap_or(0)
}

proptest! {
    #[test]
    fn left_identity(v in any::<i64>(), f in 0u8..3) {
        let lhs = observe(pure(v).flat_map(move |x| denote(f, as_i64(&x))));
        let rhs = observe(denote(f, v));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn right_identity(v in any::<i64>(), f in 0u8..3) {
        let lhs = observe(denote(f, v).flat_map(|x| pure(x)));
        let rhs = observe(denote(f, v));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn associativity(v in any::<i64>(), f in 0u8..3, g in 0u8..3) {
        let lhs = observe(
            denote(f, v)
                .flat_map(move |x| denote(g, as_i64(&x)))
                .flat_map(move |x| denote(f, as_i64(&x))),
        );
        let rhs = observe(denote(f, v).flat_map(move |x| {
            denote(g, as_i64(&x)).flat_map(move |y| denote(f, as_i64(&y)))
        }));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn put_then_get_yields_the_put_value(key in "[a-z]{1,8}", v in any::<i64>()) {
        let program = put(key.clone(), v).then(get(key));
        let result = run(program, default_handlers(), Env::new(), StoreMap::new());
        prop_assert_eq!(result.value(), Some(&Value::from(v)));
    }

    #[test]
    fn log_contains_every_tell_in_order(values in proptest::collection::vec(any::<i64>(), 0..8)) {
        let mut program = pure(Value::null());
        for v in &values {
            program = program.then(tell(*v));
        }
        let result = run(program, default_handlers(), Env::new(), StoreMap::new());
        let expected: Vec<Value> = values.into_iter().map(Value::from).collect();
        prop_assert_eq!(result.log, expected);
    }

    #[test]
    fn gather_preserves_input_order(values in proptest::collection::vec(any::<i64>(), 0..6)) {
        let programs: Vec<Program> = values.iter().map(|v| pure(*v)).collect();
        let result = run(gather_list(programs), default_handlers(), Env::new(), StoreMap::new());
        let expected: Vec<Value> = values.into_iter().map(Value::from).collect();
        prop_assert_eq!(result.value(), Some(&Value::List(expected)));
    }

    #[test]
    fn local_restores_the_env_even_when_the_body_raises(v in any::<i64>()) {
        let program = safe(local([("x", Value::from(v.wrapping_add(1)))], raise("inside")))
            .then(ask("x"));
        let result = run(
            program,
            default_handlers(),
            Env::from_pairs([("x", Value::from(v))]),
            StoreMap::new(),
        );
        prop_assert_eq!(result.value(), Some(&Value::from(v)));
    }

    #[test]
    fn all_pass_intercepts_are_invisible(v in any::<i64>(), f in 0u8..3) {
        let traced = observe(denote(f, v).intercept(|_| Ok(None)));
        let plain = observe(denote(f, v));
        prop_assert_eq!(traced, plain);
    }
}
