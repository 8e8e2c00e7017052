//! The immutable environment and the run-shared resolution cache
//!
//! The environment is configuration: an immutable key→value map read by
//! `Ask` and scoped by `Local`. Updates are functional - [`Env::with`]
//! and [`Env::merged`] return a new map and leave the original alone,
//! which is what lets `Local` restore the outer scope by simply keeping
//! the old handle.
//!
//! A binding may be a deferred [`Program`](crate::Program). Such lazy
//! entries are evaluated at most once per distinct binding; the
//! [`EnvCache`] is shared across every task of a run (spawned children
//! included) so concurrent `Ask`s coordinate instead of recomputing.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::PromiseId;
use crate::program::Program;
use crate::value::Value;

/// Immutable key→value configuration map.
#[derive(Debug, Clone, Default)]
pub struct Env {
    map: Arc<HashMap<String, Value>>,
}

impl Env {
    /// An empty environment.
    pub fn new() -> Env {
        Env::default()
    }

    /// Build an environment from key/value pairs.
    ///
    /// ```rust
    /// use effrun_core::Env;
    ///
    /// let env = Env::from_pairs([("multiplier", 3i64.into())]);
    /// assert!(env.contains("multiplier"));
    /// ```
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Env {
        Env {
            map: Arc::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Look up a binding.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Whether a binding exists.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A new environment with one extra binding.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Env {
        let mut map = (*self.map).clone();
        map.insert(key.into(), value.into());
        Env { map: Arc::new(map) }
    }

    /// A new environment with `overrides` layered on top.
    pub fn merged<'a>(&self, overrides: impl IntoIterator<Item = &'a (String, Value)>) -> Env {
        let mut map = (*self.map).clone();
        for (k, v) in overrides {
            map.insert(k.clone(), v.clone());
        }
        Env { map: Arc::new(map) }
    }

    /// Iterate the bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }
}

/// State of one lazy binding in the cache.
#[derive(Debug, Clone)]
pub(crate) enum CacheState {
    /// Someone is evaluating; park on this future for the result.
    InFlight(PromiseId),
    /// Evaluated; reuse the value.
    Ready(Value),
}

/// Run-shared cache of lazy environment resolutions.
///
/// Keyed by env key *and* binding identity: a `Local` override that
/// rebinds a key to a different program gets its own entry, so scoping
/// never observes a stale resolution.
#[derive(Debug, Clone, Default)]
pub struct EnvCache {
    entries: Arc<Mutex<HashMap<String, Vec<(Arc<Program>, CacheState)>>>>,
}

impl EnvCache {
    pub fn new() -> EnvCache {
        EnvCache::default()
    }

    pub(crate) fn lookup(&self, key: &str, program: &Arc<Program>) -> Option<CacheState> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|slots| {
            slots
                .iter()
                .find(|(p, _)| Arc::ptr_eq(p, program))
                .map(|(_, state)| state.clone())
        })
    }

    /// Mark a binding as being evaluated by the calling task.
    pub(crate) fn begin(&self, key: &str, program: Arc<Program>, promise: PromiseId) {
        let mut entries = self.entries.lock();
        entries
            .entry(key.to_string())
            .or_default()
            .push((program, CacheState::InFlight(promise)));
    }

    /// Record the resolved value for a binding.
    pub(crate) fn finish(&self, key: &str, program: &Arc<Program>, value: Value) {
        let mut entries = self.entries.lock();
        if let Some(slots) = entries.get_mut(key) {
            for slot in slots.iter_mut() {
                if Arc::ptr_eq(&slot.0, program) {
                    slot.1 = CacheState::Ready(value);
                    return;
                }
            }
        }
    }

    /// Drop an in-flight entry after a failed evaluation so a later Ask
    /// can retry.
    pub(crate) fn clear(&self, key: &str, program: &Arc<Program>) {
        let mut entries = self.entries.lock();
        if let Some(slots) = entries.get_mut(key) {
            slots.retain(|(p, _)| !Arc::ptr_eq(p, program));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::pure;

    #[test]
    fn with_does_not_touch_the_original() {
        let base = Env::from_pairs([("a", 1i64.into())]);
        let derived = base.with("b", 2i64);
        assert!(!base.contains("b"));
        assert!(derived.contains("a") && derived.contains("b"));
    }

    #[test]
    fn merged_layers_overrides_on_top() {
        let base = Env::from_pairs([("a", 1i64.into()), ("b", 2i64.into())]);
        let overrides = vec![("b".to_string(), Value::from(9i64))];
        let scoped = base.merged(&overrides);
        assert_eq!(scoped.get("a"), Some(&Value::from(1i64)));
        assert_eq!(scoped.get("b"), Some(&Value::from(9i64)));
        assert_eq!(base.get("b"), Some(&Value::from(2i64)));
    }

    #[test]
    fn cache_distinguishes_bindings_of_the_same_key() {
        let cache = EnvCache::new();
        let p1 = Arc::new(pure(1i64));
        let p2 = Arc::new(pure(2i64));

        cache.begin("k", p1.clone(), PromiseId(1));
        cache.finish("k", &p1, Value::from(1i64));

        assert!(matches!(
            cache.lookup("k", &p1),
            Some(CacheState::Ready(v)) if v == Value::from(1i64)
        ));
        assert!(cache.lookup("k", &p2).is_none());
    }

    #[test]
    fn clear_allows_retry_after_failure() {
        let cache = EnvCache::new();
        let p = Arc::new(pure(1i64));
        cache.begin("k", p.clone(), PromiseId(4));
        cache.clear("k", &p);
        assert!(cache.lookup("k", &p).is_none());
    }
}
