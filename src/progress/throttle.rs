//! Rate limiting for progress sinks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::{report_isolated, ProgressSink, SharedProgress};
use crate::types::{clamp_progress, ProgressEvent};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MIN_DELTA: f64 = 0.01;

#[derive(Debug, Default)]
struct ThrottleState {
    last_call: Option<Instant>,
    last_progress: f64,
}

/// Forwards an event when enough time has passed, when progress moved by
/// more than `min_delta`, or when it marks the start (`0.0`) or end (`1.0`).
pub struct ThrottledProgress {
    inner: SharedProgress,
    min_interval: Duration,
    min_delta: f64,
    state: Mutex<ThrottleState>,
}

impl ThrottledProgress {
    pub fn new(inner: impl ProgressSink + 'static) -> Self {
        Self::from_shared(Arc::new(inner))
    }

    pub fn from_shared(inner: SharedProgress) -> Self {
        Self {
            inner,
            min_interval: DEFAULT_MIN_INTERVAL,
            min_delta: DEFAULT_MIN_DELTA,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Decide under the lock; the inner sink runs after it is released.
    fn should_forward(&self, progress: f64) -> bool {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed_ok = state
            .last_call
            .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        let delta = ((progress - state.last_progress).abs() * 1e9).round() / 1e9;
        let forward = elapsed_ok || delta > self.min_delta || progress == 0.0 || progress >= 1.0;

        if forward {
            state.last_call = Some(now);
            state.last_progress = progress;
        }
        forward
    }
}

impl ProgressSink for ThrottledProgress {
    fn report(&self, event: &ProgressEvent) {
        let progress = clamp_progress(event.progress);
        if !self.should_forward(progress) {
            return;
        }
        if progress == event.progress {
            report_isolated(self.inner.as_ref(), event);
        } else {
            let mut clamped = event.clone();
            clamped.progress = progress;
            report_isolated(self.inner.as_ref(), &clamped);
        }
    }
}
