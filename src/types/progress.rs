//! Progress events surfaced to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to progress events.
pub type ProgressMetadata = serde_json::Map<String, serde_json::Value>;

/// A single progress update. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    /// Always within `[0.0, 1.0]`.
    pub progress: f64,
    #[serde(default)]
    pub metadata: ProgressMetadata,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, progress: f64) -> Self {
        Self {
            message: message.into(),
            progress: clamp_progress(progress),
            metadata: ProgressMetadata::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: ProgressMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_completion(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Clamp into `[0, 1]`; NaN becomes `0.0`.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
