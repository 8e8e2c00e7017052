//! Effect-call trace capture
//!
//! When tracing is enabled, the evaluator records every effect dispatch
//! and every compound-program invocation with the task and kontinuation
//! depth at that moment. [`EffectTrace::render`] turns the recording
//! into an indented call tree rooted at the entry program - the
//! effect-level complement of a host stack trace.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::handle::TaskId;

/// One recorded dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// The dispatching task.
    pub task: TaskId,
    /// Kontinuation depth at dispatch time.
    pub depth: usize,
    /// Effect kind or compound-program name.
    pub label: String,
}

/// A completed recording.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EffectTrace {
    /// Events in dispatch order.
    pub events: Vec<TraceEvent>,
}

impl EffectTrace {
    /// Render the recording as an indented tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            let _ = writeln!(
                out,
                "{:indent$}[{}] {}",
                "",
                event.task.0,
                event.label,
                indent = event.depth * 2,
            );
        }
        out
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Shared recorder handed to the evaluator.
#[derive(Clone, Default)]
pub struct TraceRecorder {
    inner: Arc<Mutex<EffectTrace>>,
}

impl TraceRecorder {
    pub fn new() -> TraceRecorder {
        TraceRecorder::default()
    }

    pub(crate) fn record(&self, task: TaskId, depth: usize, label: impl Into<String>) {
        self.inner.lock().events.push(TraceEvent {
            task,
            depth,
            label: label.into(),
        });
    }

    /// Copy of the recording so far.
    pub fn snapshot(&self) -> EffectTrace {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_indents_by_depth() {
        let recorder = TraceRecorder::new();
        recorder.record(TaskId(0), 0, "call main");
        recorder.record(TaskId(0), 1, "Ask");
        let rendered = recorder.snapshot().render();
        assert!(rendered.contains("[0] call main"));
        assert!(rendered.contains("  [0] Ask"));
    }
}
