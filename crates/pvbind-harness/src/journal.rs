//! Ordered event journal shared between probes and tests.

use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only list of event strings. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        let event = event.into();
        tracing::trace!(event = event.as_str(), "journal");
        self.events.lock().push(event);
    }

    /// Copy of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Events ending with `suffix`, in order.
    #[must_use]
    pub fn events_ending_with(&self, suffix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Index of the first occurrence of `event`.
    #[must_use]
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    /// Drain all events.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let journal = Journal::new();
        let shared = journal.clone();
        journal.record("a-setup");
        shared.record("b-setup");
        journal.record("b-teardown");
        assert_eq!(journal.events_ending_with("-setup"), vec!["a-setup", "b-setup"]);
        assert_eq!(journal.position("b-teardown"), Some(2));
        assert_eq!(shared.take().len(), 3);
        assert!(journal.events().is_empty());
    }
}
