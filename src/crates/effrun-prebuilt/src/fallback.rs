//! Ordered fallbacks
//!
//! Each arm runs under its own `Safe`, so a failing arm never unwinds
//! past the chain - control simply moves to the next arm. The core
//! crate owns the underlying combinator; this module names the pattern
//! alongside the other prebuilt shapes.

use effrun_core::program::{first_success, Program};

/// Try `programs` in order; the first success wins and later arms
/// never run. If every arm fails, the last failure propagates. An
/// empty chain raises.
///
/// The classic shape: primary provider, then a cheaper fallback, then
/// a canned default.
pub fn fallback_chain(programs: Vec<Program>) -> Program {
    first_success(programs)
}
