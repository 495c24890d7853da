//! In-memory event log
//!
//! Records every published event in order. Useful as a sink for embedding
//! hosts that poll rather than subscribe, and for inspecting what an
//! invocation emitted.

use std::sync::Mutex;

use super::bus::{EventFilter, EventSink};
use super::types::MultimodalEvent;

/// Ordered in-memory record of published events
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<MultimodalEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<MultimodalEvent> {
        self.lock().clone()
    }

    /// Events matching a filter
    pub fn query(&self, filter: &EventFilter) -> Vec<MultimodalEvent> {
        self.lock()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Number of recorded events of the given type
    pub fn count(&self, event_type: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MultimodalEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: MultimodalEvent) {
        self.lock().push(event);
    }
}
