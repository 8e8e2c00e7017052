//! The `Ok`/`Err` result ADT
//!
//! [`Outcome`] is the wrap type of `Safe`, the completion value of a
//! task, and the top-level result of a run. It is deliberately distinct
//! from `std::result::Result`: both sides carry runtime types
//! ([`Value`] / [`EffectError`]) and the ADT itself is a [`Value`]
//! variant, so programs can pattern it like any other data.

use crate::error::EffectError;
use crate::value::Value;

/// Result of a program: a value, or the error that escaped it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The program returned normally.
    Ok(Value),
    /// An error unwound past the program.
    Err(EffectError),
}

impl Outcome {
    /// Whether this outcome is `Ok`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Whether this outcome is `Err`.
    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Err(_) => None,
        }
    }

    /// The error, if any.
    pub fn error(&self) -> Option<&EffectError> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Err(e) => Some(e),
        }
    }

    /// Convert into a `std::result::Result`.
    pub fn into_result(self) -> Result<Value, EffectError> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(e),
        }
    }
}

impl From<Result<Value, EffectError>> for Outcome {
    fn from(r: Result<Value, EffectError>) -> Self {
        match r {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_equality_is_on_payload() {
        assert_eq!(Outcome::Ok(Value::from(1i64)), Outcome::Ok(Value::from(1i64)));
        assert_ne!(Outcome::Ok(Value::from(1i64)), Outcome::Ok(Value::from(2i64)));
        assert_eq!(
            Outcome::Err(EffectError::raised("x")),
            Outcome::Err(EffectError::raised("x")),
        );
    }

    #[test]
    fn round_trips_through_result() {
        let o = Outcome::Ok(Value::from("done"));
        assert_eq!(Outcome::from(o.clone().into_result()), o);
    }
}
