//! Progress reporting: sinks, throttling and fan-out.
//!
//! A [`ProgressSink`] receives [`ProgressEvent`]s from the orchestrator's
//! worker task. Sinks must not block for long and never propagate failures;
//! wrappers in this module contain panics from user-supplied sinks.

pub mod broadcast;
pub mod channel;
pub mod recorder;
pub mod throttle;

pub use broadcast::ProgressBroadcaster;
pub use channel::ChannelProgress;
pub use recorder::ProgressRecorder;
pub use throttle::ThrottledProgress;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::types::ProgressEvent;

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Shared, type-erased sink.
pub type SharedProgress = Arc<dyn ProgressSink>;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Deliver `event` to `sink`, logging instead of unwinding if it panics.
///
/// Returns `false` when the sink panicked.
pub fn report_isolated(sink: &dyn ProgressSink, event: &ProgressEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.report(event))) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(reason = %reason, message = %event.message, "Progress sink failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sink = move |_: &ProgressEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        sink.report(&ProgressEvent::new("a", 0.1));
        let shared: SharedProgress = Arc::new(sink);
        shared.report(&ProgressEvent::new("b", 0.2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_sink_is_contained() {
        let sink = |_: &ProgressEvent| panic!("display went away");
        assert!(!report_isolated(&sink, &ProgressEvent::new("x", 0.5)));
        assert!(report_isolated(&NoopProgress, &ProgressEvent::new("y", 0.5)));
    }
}
