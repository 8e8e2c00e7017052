//! The dynamic value universe programs compute with
//!
//! Every value a program yields, binds or stores is a [`Value`]. Plain
//! data rides in the [`Value::Json`] variant; the remaining variants
//! carry what JSON cannot: runtime handles, [`Outcome`] results from
//! `Safe`, and deferred [`Program`]s (lazy environment entries,
//! unresolved call arguments).
//!
//! Equality is structural on payloads, by id on handles, and by pointer
//! identity on programs - two values are equal when a program could not
//! tell them apart.
//!
//! # Examples
//!
//! ```rust
//! use effrun_core::Value;
//! use serde_json::json;
//!
//! let a: Value = 3i64.into();
//! let b = Value::from(json!(3));
//! assert_eq!(a, b);
//! assert_eq!(a.as_i64(), Some(3));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::handle::{ExternalPromise, FutureHandle, PromiseHandle, SemaphoreHandle, TaskHandle};
use crate::outcome::Outcome;
use crate::program::Program;

/// A dynamic runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Plain data: null, booleans, numbers, strings, arrays, objects.
    Json(serde_json::Value),
    /// A list that may contain handles and other non-JSON values.
    List(Vec<Value>),
    /// A small named record, e.g. the result of `Listen` or `Race`.
    Record(BTreeMap<String, Value>),
    /// An `Ok`/`Err` outcome, produced by `Safe`.
    Outcome(Box<Outcome>),
    /// Read-side handle of a promise pair.
    Future(FutureHandle),
    /// A spawned task.
    Task(TaskHandle),
    /// Write-side handle of a promise pair.
    Promise(PromiseHandle),
    /// Write-side handle completed from outside the VM.
    External(ExternalPromise),
    /// A counting semaphore.
    Semaphore(SemaphoreHandle),
    /// A deferred program, evaluated lazily where the contract allows.
    Program(Arc<Program>),
}

impl Value {
    /// The JSON null value.
    pub fn null() -> Value {
        Value::Json(serde_json::Value::Null)
    }

    /// Whether this is JSON null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Json(serde_json::Value::Null))
    }

    /// Build a record from key/value pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Integer view of a JSON number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Float view of a JSON number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    /// String view of a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Json(v) => v.as_str(),
            _ => None,
        }
    }

    /// Boolean view of a JSON boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    /// The items of a [`Value::List`].
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// A field of a [`Value::Record`].
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    /// The outcome carried by a [`Value::Outcome`].
    pub fn as_outcome(&self) -> Option<&Outcome> {
        match self {
            Value::Outcome(o) => Some(o),
            _ => None,
        }
    }

    /// The future a program can wait on, if this value names one.
    ///
    /// Both futures and tasks are waitable; everything else is not.
    pub fn waitable(&self) -> Option<FutureHandle> {
        match self {
            Value::Future(f) => Some(*f),
            Value::Task(t) => Some(t.future()),
            Value::External(e) => Some(e.future()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Outcome(a), Value::Outcome(b)) => a == b,
            (Value::Future(a), Value::Future(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a == b,
            (Value::External(a), Value::External(b)) => a == b,
            (Value::Semaphore(a), Value::Semaphore(b)) => a == b,
            (Value::Program(a), Value::Program(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Json(serde_json::Value::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Json(serde_json::Value::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Json(serde_json::Value::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Json(serde_json::Value::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Json(serde_json::Value::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Outcome> for Value {
    fn from(o: Outcome) -> Self {
        Value::Outcome(Box::new(o))
    }
}

impl From<Program> for Value {
    fn from(p: Program) -> Self {
        Value::Program(Arc::new(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_compare_structurally() {
        assert_eq!(Value::from(json!({"a": 1})), Value::from(json!({"a": 1})));
        assert_ne!(Value::from(json!({"a": 1})), Value::from(json!({"a": 2})));
    }

    #[test]
    fn programs_compare_by_identity() {
        let p = Arc::new(crate::program::pure(1i64));
        let q = Arc::new(crate::program::pure(1i64));
        assert_eq!(Value::Program(p.clone()), Value::Program(p.clone()));
        assert_ne!(Value::Program(p), Value::Program(q));
    }

    #[test]
    fn record_field_access() {
        let r = Value::record([("value", Value::from(1i64)), ("log", Value::List(vec![]))]);
        assert_eq!(r.field("value"), Some(&Value::from(1i64)));
        assert_eq!(r.field("missing"), None);
    }
}
