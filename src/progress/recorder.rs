//! In-memory progress history.

use std::sync::Mutex;

use super::ProgressSink;
use crate::types::ProgressEvent;

/// Keeps every event it receives, in arrival order.
#[derive(Debug, Default)]
pub struct ProgressRecorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.lock().iter().map(|e| e.progress).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn last(&self) -> Option<ProgressEvent> {
        self.lock().last().cloned()
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

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProgressSink for ProgressRecorder {
    fn report(&self, event: &ProgressEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let recorder = ProgressRecorder::new();
        recorder.report(&ProgressEvent::new("first", 0.1));
        recorder.report(&ProgressEvent::new("second", 0.2));

        assert_eq!(recorder.messages(), vec!["first", "second"]);
        assert_eq!(recorder.last().map(|e| e.progress), Some(0.2));
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
