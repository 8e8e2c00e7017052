//! Programs - lazy, composable, re-runnable computations
//!
//! A [`Program`] is a value the evaluator can execute. Nothing runs at
//! construction time: building a program builds a tree, and running it
//! walks that tree one step at a time. Because running never consumes
//! the tree, the same program can be executed any number of times and
//! each run is independent.
//!
//! Suspension is explicit: a [`Program::Bind`] node is one suspension
//! point - the evaluator runs the source, then delivers its value into
//! the [`Kleisli`] continuation to obtain the next program. Generator
//! `yield` syntax from dynamic hosts maps onto exactly this shape, with
//! one `Bind` per yield.
//!
//! [`KleisliCall`] is the named compound form: a body closure plus
//! bound arguments plus diagnostics metadata. Program-valued arguments
//! are resolved before the body runs unless the parameter position is
//! declared to receive programs.
//!
//! # Examples
//!
//! Combinator chaining:
//!
//! ```rust
//! use effrun_core::program::pure;
//!
//! let p = pure(2i64)
//!     .map(|v| (v.as_i64().unwrap_or(0) * 3).into())
//!     .flat_map(|v| pure(v));
//! ```
//!
//! A named compound program:
//!
//! ```rust
//! use effrun_core::program::{pure, KleisliFn};
//! use effrun_core::effect::{ask, put};
//!
//! let bump = KleisliFn::new("bump", |args| {
//!     let key = args[0].as_str().unwrap_or_default().to_string();
//!     Ok(ask(key.clone()).flat_map(move |v| put(key.clone(), v)))
//! });
//! let program = bump.apply(vec!["counter".into()]);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::effect::{Effect, InterceptFn, Transformed};
use crate::error::{EffectError, Result};
use crate::value::Value;

/// A continuation from a value to the next program.
#[derive(Clone)]
pub struct Kleisli(pub(crate) Arc<dyn Fn(Value) -> Result<Program> + Send + Sync>);

impl Kleisli {
    pub fn new(f: impl Fn(Value) -> Result<Program> + Send + Sync + 'static) -> Kleisli {
        Kleisli(Arc::new(f))
    }

    pub fn apply(&self, value: Value) -> Result<Program> {
        (self.0)(value)
    }
}

impl fmt::Debug for Kleisli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Kleisli")
    }
}

/// A value the evaluator can run.
#[derive(Debug, Clone)]
pub enum Program {
    /// An immediate value.
    Pure(Value),
    /// A primitive step.
    Effect(Effect),
    /// Run `src`, then continue with `k` applied to its value.
    Bind { src: Box<Program>, k: Kleisli },
    /// A named compound program with bound arguments.
    Call(KleisliCall),
}

impl Program {
    /// Sequence: run `self`, feed its value to `f`, run the result.
    pub fn flat_map(self, f: impl Fn(Value) -> Program + Send + Sync + 'static) -> Program {
        Program::Bind {
            src: Box::new(self),
            k: Kleisli::new(move |v| Ok(f(v))),
        }
    }

    /// Fallible sequencing; an `Err` from `f` raises into the run.
    pub fn flat_map_try(
        self,
        f: impl Fn(Value) -> Result<Program> + Send + Sync + 'static,
    ) -> Program {
        Program::Bind {
            src: Box::new(self),
            k: Kleisli::new(f),
        }
    }

    /// Transform the value without further effects.
    pub fn map(self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Program {
        self.flat_map(move |v| Program::Pure(f(v)))
    }

    /// Run `self`, discard its value, then run `next`.
    pub fn then(self, next: Program) -> Program {
        self.flat_map(move |_| next.clone())
    }

    /// Apply one intercept transform to every effect this program
    /// dispatches.
    pub fn intercept(
        self,
        transform: impl Fn(&Effect) -> Result<Option<Transformed>> + Send + Sync + 'static,
    ) -> Program {
        crate::effect::intercept_with(self, vec![InterceptFn::new(transform)])
    }
}

/// A program wrapping an immediate value.
pub fn pure(value: impl Into<Value>) -> Program {
    Program::Pure(value.into())
}

/// A program that raises `error` when run.
pub fn raise_error(error: EffectError) -> Program {
    Program::Bind {
        src: Box::new(Program::Pure(Value::null())),
        k: Kleisli::new(move |_| Err(error.clone())),
    }
}

/// Run programs left to right, collecting their values into a list.
pub fn sequence(programs: Vec<Program>) -> Program {
    let mut out = pure(Value::List(Vec::new()));
    for p in programs.into_iter().rev() {
        let rest = out;
        out = p.flat_map(move |head| {
            let head = head.clone();
            rest.clone().map(move |tail| {
                let mut items = vec![head.clone()];
                if let Value::List(t) = tail {
                    items.extend(t);
                }
                Value::List(items)
            })
        });
    }
    out
}

/// Run programs concurrently via `Gather`, collecting values in input
/// order.
pub fn gather_list(programs: Vec<Program>) -> Program {
    crate::effect::gather(programs.into_iter().map(Value::from))
}

/// Try programs in order; the first success wins, the last failure
/// propagates. Empty input raises.
pub fn first_success(programs: Vec<Program>) -> Program {
    let mut next: Option<Program> = None;
    for p in programs.into_iter().rev() {
        let fallback = next;
        next = Some(crate::effect::safe(p).flat_map(move |wrapped| {
            match wrapped.as_outcome() {
                Some(crate::outcome::Outcome::Ok(v)) => pure(v.clone()),
                Some(crate::outcome::Outcome::Err(e)) => match &fallback {
                    Some(alt) => alt.clone(),
                    None => raise_error(e.clone()),
                },
                None => raise_error(EffectError::raised("safe returned a non-outcome")),
            }
        }));
    }
    next.unwrap_or_else(|| {
        raise_error(EffectError::invalid("first_success of an empty list"))
    })
}

/// Diagnostics metadata attached to a [`KleisliCall`].
#[derive(Debug, Clone)]
pub struct CallMeta {
    /// Source-level name of the compound program.
    pub name: Arc<str>,
    /// Caller location, when the constructor recorded one.
    pub location: Option<Arc<str>>,
}

/// A bound invocation of a named compound program.
///
/// Cloning the call and executing both copies yields two independent,
/// equivalent runs: the body closure is pure with respect to the call
/// record, and argument resolution operates on a per-execution copy.
#[derive(Clone)]
pub struct KleisliCall {
    pub(crate) meta: CallMeta,
    pub(crate) args: Vec<Value>,
    pub(crate) program_params: Arc<[usize]>,
    pub(crate) body: Arc<dyn Fn(Vec<Value>) -> Result<Program> + Send + Sync>,
}

impl KleisliCall {
    /// Source-level name of the call, for diagnostics and traces.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The first argument still awaiting resolution: a program-valued
    /// argument in a position not declared as a program parameter.
    pub(crate) fn first_unresolved(&self) -> Option<(usize, Arc<Program>)> {
        self.args.iter().enumerate().find_map(|(i, arg)| {
            let declared = self.program_params.contains(&i);
            match arg {
                Value::Program(p) if !declared => Some((i, Arc::clone(p))),
                _ => None,
            }
        })
    }

    pub(crate) fn invoke(&self) -> Result<Program> {
        (self.body)(self.args.clone())
    }
}

impl fmt::Debug for KleisliCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KleisliCall")
            .field("name", &self.meta.name)
            .field("args", &self.args)
            .finish()
    }
}

/// Factory for [`KleisliCall`] programs: the Rust rendition of a
/// decorated generator function. Construct once, apply many times.
#[derive(Clone)]
pub struct KleisliFn {
    meta: CallMeta,
    program_params: Arc<[usize]>,
    body: Arc<dyn Fn(Vec<Value>) -> Result<Program> + Send + Sync>,
}

impl KleisliFn {
    /// Define a compound program. The body receives the bound
    /// arguments (program-valued ones already resolved, unless
    /// declared) and returns the program to run.
    pub fn new(
        name: impl Into<Arc<str>>,
        body: impl Fn(Vec<Value>) -> Result<Program> + Send + Sync + 'static,
    ) -> KleisliFn {
        KleisliFn {
            meta: CallMeta {
                name: name.into(),
                location: None,
            },
            program_params: Arc::new([]),
            body: Arc::new(body),
        }
    }

    /// Record the caller location for diagnostics.
    pub fn with_location(mut self, location: impl Into<Arc<str>>) -> KleisliFn {
        self.meta.location = Some(location.into());
        self
    }

    /// Declare parameter positions that receive programs verbatim,
    /// exempting them from auto-resolution.
    pub fn program_params(mut self, positions: impl Into<Arc<[usize]>>) -> KleisliFn {
        self.program_params = positions.into();
        self
    }

    /// Bind arguments, producing a runnable program.
    pub fn apply(&self, args: Vec<Value>) -> Program {
        Program::Call(KleisliCall {
            meta: self.meta.clone(),
            args,
            program_params: self.program_params.clone(),
            body: self.body.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_map_builds_a_bind_node() {
        let p = pure(1i64).flat_map(|v| pure(v));
        assert!(matches!(p, Program::Bind { .. }));
    }

    #[test]
    fn kleisli_call_reports_unresolved_program_args() {
        let f = KleisliFn::new("f", |args| Ok(Program::Pure(args[0].clone())));
        match f.apply(vec![Value::from(pure(1i64))]) {
            Program::Call(call) => {
                assert_eq!(call.first_unresolved().map(|(i, _)| i), Some(0));
            }
            other => panic!("unexpected program: {other:?}"),
        }
    }

    #[test]
    fn declared_program_params_are_exempt_from_resolution() {
        let f = KleisliFn::new("f", |args| Ok(Program::Pure(args[0].clone())))
            .program_params([0usize]);
        match f.apply(vec![Value::from(pure(1i64))]) {
            Program::Call(call) => assert!(call.first_unresolved().is_none()),
            other => panic!("unexpected program: {other:?}"),
        }
    }

    #[test]
    fn calls_are_rerunnable() {
        let f = KleisliFn::new("f", |args| Ok(Program::Pure(args[0].clone())));
        let call = match f.apply(vec![Value::from(5i64)]) {
            Program::Call(c) => c,
            other => panic!("unexpected program: {other:?}"),
        };
        let first = call.invoke().expect("first run");
        let second = call.invoke().expect("second run");
        assert!(matches!(first, Program::Pure(ref v) if *v == Value::from(5i64)));
        assert!(matches!(second, Program::Pure(ref v) if *v == Value::from(5i64)));
    }
}
