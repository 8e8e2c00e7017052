//! The mutable per-run store and the shared append-only log
//!
//! The store is working state: a mutable key→value map read and written
//! through the `Get` / `Put` / `Modify` effects. Each task holds a
//! [`SharedStore`] handle; `Spawn` snapshots the map so a spawned child
//! mutates its own copy, while `Gather` children share the parent's
//! handle and interleave writes at yield boundaries.
//!
//! The log is separate from the store map: one append-only sequence per
//! run, shared by every task regardless of store snapshots. `Tell`
//! appends; `Listen` records an offset and later reads the slice
//! appended after it. Entries are never removed within a run.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

/// Reserved store key through which `Get` reads the run log.
pub const LOG_KEY: &str = "__log__";

/// The mutable key→value map of one store.
#[derive(Debug, Clone, Default)]
pub struct StoreMap {
    entries: HashMap<String, Value>,
}

impl StoreMap {
    /// An empty store.
    pub fn new() -> StoreMap {
        StoreMap::default()
    }

    /// Build a store from key/value pairs.
    pub fn from_pairs<K: Into<String>, V: Into<Value>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> StoreMap {
        StoreMap {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a key. Absent keys are simply absent - the `Get` effect
    /// maps that to JSON null rather than an error.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Write a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove a key, returning the previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Whether a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// A task's handle on its store.
pub type SharedStore = Arc<Mutex<StoreMap>>;

/// Wrap a map into a fresh shared handle.
pub fn share(map: StoreMap) -> SharedStore {
    Arc::new(Mutex::new(map))
}

/// Snapshot a shared store into an independent handle.
///
/// This is the `Spawn` isolation boundary: the child gets a deep copy,
/// so neither side observes the other's later writes.
pub fn snapshot(store: &SharedStore) -> SharedStore {
    share(store.lock().clone())
}

/// The run-global append-only log.
#[derive(Debug, Clone, Default)]
pub struct SharedLog {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl SharedLog {
    pub fn new() -> SharedLog {
        SharedLog::default()
    }

    /// Append one entry, returning its offset.
    pub fn append(&self, value: Value) -> usize {
        let mut entries = self.entries.lock();
        entries.push(value);
        entries.len() - 1
    }

    /// Current length; used by `Listen` to record its start offset.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the entries appended at or after `from`.
    pub fn slice_from(&self, from: usize) -> Vec<Value> {
        let entries = self.entries.lock();
        entries.get(from..).map(<[Value]>::to_vec).unwrap_or_default()
    }

    /// Copy of the whole log.
    pub fn snapshot(&self) -> Vec<Value> {
        self.entries.lock().clone()
    }
}
