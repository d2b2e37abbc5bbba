//! Core data types shared across the pipeline.

pub mod citation;
pub mod progress;
pub mod request;
pub mod result;
pub mod run;

pub use citation::{is_valid_url, url_host, Citation, UrlAnnotation};
pub use progress::{clamp_progress, ProgressEvent, ProgressMetadata};
pub use request::{
    ResearchRequest, DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECONDS, MAX_ITERATIONS_LIMIT,
    TIMEOUT_SECONDS_LIMIT,
};
pub use result::{ResearchLogRecord, ResearchMetadata, ResearchResult};
pub use run::RunState;
