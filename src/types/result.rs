//! Research outcomes and their persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Citation, ResearchRequest, RunState};
use crate::error::{FailureKind, ResearchError};

/// Identifiers and budget information for one research attempt.
///
/// The remote identifiers are filled in as they become known, so a failure
/// halfway through still reports the agent and thread it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchMetadata {
    pub agent_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub query: String,
    pub max_iterations: u32,
    #[serde(default)]
    pub iterations: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub run_status: Option<RunState>,
}

impl ResearchMetadata {
    pub fn for_request(request: &ResearchRequest) -> Self {
        Self {
            agent_id: None,
            thread_id: None,
            run_id: None,
            query: request.query().to_string(),
            max_iterations: request.max_iterations(),
            iterations: 0,
            timestamp: Utc::now(),
            run_status: None,
        }
    }
}

/// Terminal outcome of one research attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub content: String,
    pub citations: Vec<Citation>,
    pub metadata: ResearchMetadata,
    pub execution_time_seconds: f64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, rename = "failure_kind")]
    pub failure: Option<FailureKind>,
}

impl ResearchResult {
    pub fn succeeded(
        content: String,
        citations: Vec<Citation>,
        metadata: ResearchMetadata,
        execution_time_seconds: f64,
    ) -> Self {
        Self {
            content,
            citations,
            metadata,
            execution_time_seconds,
            success: true,
            error_message: None,
            failure: None,
        }
    }

    /// A failed attempt. A cancelled one always records the run as `Cancelled`,
    /// whether or not a remote run was ever created.
    pub fn failed(
        error: &ResearchError,
        mut metadata: ResearchMetadata,
        execution_time_seconds: f64,
    ) -> Self {
        if matches!(error, ResearchError::Cancelled) {
            metadata.run_status = Some(RunState::Cancelled);
        }
        Self {
            content: String::new(),
            citations: Vec::new(),
            metadata,
            execution_time_seconds,
            success: false,
            error_message: Some(format!("Research failed: {error}")),
            failure: Some(error.failure_kind()),
        }
    }

    /// Snapshot for persistence, stamped with the current time.
    pub fn to_record(&self) -> ResearchLogRecord {
        ResearchLogRecord {
            result: self.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// The JSON document written for each research log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchLogRecord {
    #[serde(flatten)]
    pub result: ResearchResult,
    pub timestamp: DateTime<Utc>,
}
