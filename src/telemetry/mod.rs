//! Tracing spans for the major research operations.
//!
//! A [`Telemetry`] handle is passed explicitly to the components that emit
//! spans. When disabled every span is [`Span::none`], so instrumented code
//! runs unchanged at no cost.

use std::time::Duration;

use tracing::field::Empty;
use tracing::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    enabled: bool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Telemetry {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn execute_span(&self, query_length: usize, max_iterations: u32) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!(
            "research.execute",
            query_length,
            max_iterations,
            agent_id = Empty,
            thread_id = Empty,
            run_id = Empty,
            success = Empty,
            execution_time_ms = Empty,
            error = Empty,
        )
    }

    pub fn poll_span(&self, run_id: &str, max_iterations: u32) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!(
            "research.poll",
            run_id,
            max_iterations,
            iterations = Empty,
            final_status = Empty,
        )
    }

    pub fn fetch_response_span(&self, thread_id: &str) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!(
            "research.fetch_response",
            thread_id,
            message_count = Empty,
            content_length = Empty,
        )
    }

    pub fn citations_span(&self, content_length: usize) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!(
            "citations.convert",
            content_length,
            citation_count = Empty,
            superscript_count = Empty,
        )
    }

    pub fn report_span(&self, reference_count: usize) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!("report.create", reference_count, output_length = Empty)
    }

    pub fn persist_span(&self, file_name: &str) -> Span {
        if !self.enabled {
            return Span::none();
        }
        tracing::info_span!("persist.save_log", file_name, bytes = Empty, success = Empty)
    }
}

/// Record success and elapsed time on a span opened by [`Telemetry::execute_span`].
pub fn record_outcome(span: &Span, success: bool, elapsed: Duration, error: Option<&str>) {
    span.record("success", success);
    span.record("execution_time_ms", elapsed.as_millis() as u64);
    if let Some(error) = error {
        span.record("error", error);
    }
}
