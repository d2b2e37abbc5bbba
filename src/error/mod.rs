//! Error types for deep-research.

pub mod unified;

pub use unified::{ErrorCategory, FailureKind, RemoteErrorKind};

use thiserror::Error;

use crate::types::RunState;

/// Primary error type for all research operations.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote service error ({kind}): {message}")]
    RemoteService {
        kind: RemoteErrorKind,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Research run {status}: {detail}")]
    RunTerminalFailure { status: RunState, detail: String },

    #[error("Research did not complete within {max_iterations} iterations")]
    RunBudgetExceeded { max_iterations: u32 },

    #[error("Research did not complete within {0}ms")]
    Timeout(u64),

    #[error("Research cancelled")]
    Cancelled,

    #[error("No research content found in agent response")]
    NoContent,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResearchError {
    /// Create a remote service error without an underlying cause.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::RemoteService {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a remote service error that keeps the original cause.
    pub fn remote_with_source(
        kind: RemoteErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteService {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::RemoteService { kind, .. } => match kind {
                RemoteErrorKind::Authentication => ErrorCategory::Authentication,
                RemoteErrorKind::Network => ErrorCategory::Network,
                RemoteErrorKind::NotFound
                | RemoteErrorKind::InvalidRequest
                | RemoteErrorKind::Service => ErrorCategory::Remote,
            },
            Self::RunTerminalFailure { .. } | Self::NoContent => ErrorCategory::RunFailed,
            Self::RunBudgetExceeded { .. } => ErrorCategory::Budget,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Persistence(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorCategory::Persistence
            }
        }
    }

    /// Whether a single remote call that produced this error may be retried.
    ///
    /// Only transport faults and transient service faults qualify; a run that
    /// the service reported as failed is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteService {
                kind: RemoteErrorKind::Network | RemoteErrorKind::Service,
                ..
            }
        )
    }

    /// The failure kind recorded on a failed research result.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) | Self::Configuration(_) => FailureKind::Validation,
            Self::RemoteService { .. } => FailureKind::RemoteService,
            Self::RunTerminalFailure { .. } => FailureKind::RunTerminalFailure,
            Self::RunBudgetExceeded { .. } => FailureKind::RunBudgetExceeded,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            Self::NoContent => FailureKind::NoContent,
            Self::Persistence(_) | Self::Io(_) | Self::Serialization(_) => {
                FailureKind::Persistence
            }
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ResearchError>;
