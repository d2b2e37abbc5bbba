//! Convenience re-exports for common use.

pub use crate::citations::{CitationProcessor, ResearchReport};
pub use crate::config::ResearchConfig;
pub use crate::error::{FailureKind, ResearchError, Result};
pub use crate::progress::{NoopProgress, ProgressSink, SharedProgress};
pub use crate::research::{ResearchExecutor, ResearchHandle, ResearchOrchestrator, ResearchService};
pub use crate::service::AgentService;
pub use crate::types::{
    Citation, ProgressEvent, ResearchMetadata, ResearchRequest, ResearchResult, RunState,
};
