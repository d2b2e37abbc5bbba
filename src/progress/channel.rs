//! Progress delivered over a tokio channel.

use tokio::sync::mpsc;

use super::ProgressSink;
use crate::types::ProgressEvent;

/// Queues events for a single consumer, decoupling producer and consumer pace.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: &ProgressEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(message = %event.message, "Progress receiver dropped");
        }
    }
}
