//! Fan-out of progress events to several sinks.

use std::sync::{Arc, RwLock};

use super::{report_isolated, ProgressSink, SharedProgress};
use crate::types::ProgressEvent;

/// Delivers each event to every registered sink.
///
/// A sink that panics is logged and skipped; the remaining sinks still
/// receive the event.
#[derive(Default)]
pub struct ProgressBroadcaster {
    sinks: RwLock<Vec<SharedProgress>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: impl ProgressSink + 'static) {
        self.subscribe_shared(Arc::new(sink));
    }

    pub fn subscribe_shared(&self, sink: SharedProgress) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(poisoned) => poisoned.into_inner().push(sink),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Clone the list so no lock is held while sinks run.
    fn snapshot(&self) -> Vec<SharedProgress> {
        match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for ProgressBroadcaster {
    fn report(&self, event: &ProgressEvent) {
        for sink in self.snapshot() {
            report_isolated(sink.as_ref(), event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressRecorder;

    #[test]
    fn failing_sink_does_not_block_others() {
        let first = Arc::new(ProgressRecorder::new());
        let last = Arc::new(ProgressRecorder::new());
        let broadcaster = ProgressBroadcaster::new();
        broadcaster.subscribe_shared(first.clone());
        broadcaster.subscribe(|_: &ProgressEvent| panic!("consumer crashed"));
        broadcaster.subscribe_shared(last.clone());

        broadcaster.report(&ProgressEvent::new("polling", 0.4));
        broadcaster.report(&ProgressEvent::new("done", 1.0));

        assert_eq!(broadcaster.len(), 3);
        assert_eq!(first.len(), 2);
        assert_eq!(last.messages(), vec!["polling", "done"]);
    }

    #[test]
    fn empty_broadcaster_is_fine() {
        let broadcaster = ProgressBroadcaster::new();
        assert!(broadcaster.is_empty());
        broadcaster.report(&ProgressEvent::new("nobody listening", 0.5));
    }
}
