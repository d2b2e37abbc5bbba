//! Validated research requests.

use serde::Serialize;

use crate::error::{ResearchError, Result};
use crate::security::{validate_research_query, DEFAULT_MAX_INPUT_LENGTH};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const MAX_ITERATIONS_LIMIT: u32 = 50;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const TIMEOUT_SECONDS_LIMIT: u64 = 3600;

/// An immutable, validated research request.
///
/// ```
/// use deep_research::types::ResearchRequest;
///
/// let request = ResearchRequest::builder()
///     .query("Latest advances in solid-state batteries")
///     .max_iterations(5)
///     .build()
///     .unwrap();
/// assert_eq!(request.max_iterations(), 5);
/// assert!(request.enable_citations());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchRequest {
    query: String,
    max_iterations: u32,
    timeout_seconds: u64,
    enable_citations: bool,
}

#[bon::bon]
impl ResearchRequest {
    /// Validate every field; no instance exists when validation fails.
    #[builder]
    pub fn new(
        #[builder(into)] query: String,
        #[builder(default = DEFAULT_MAX_ITERATIONS)] max_iterations: u32,
        #[builder(default = DEFAULT_TIMEOUT_SECONDS)] timeout_seconds: u64,
        #[builder(default = true)] enable_citations: bool,
        #[builder(default = DEFAULT_MAX_INPUT_LENGTH)] max_query_length: usize,
    ) -> Result<Self> {
        let query = validate_research_query(&query, max_query_length)?;

        if !(1..=MAX_ITERATIONS_LIMIT).contains(&max_iterations) {
            return Err(ResearchError::Validation(format!(
                "max_iterations must be between 1 and {MAX_ITERATIONS_LIMIT}, got {max_iterations}"
            )));
        }
        if !(1..=TIMEOUT_SECONDS_LIMIT).contains(&timeout_seconds) {
            return Err(ResearchError::Validation(format!(
                "timeout_seconds must be between 1 and {TIMEOUT_SECONDS_LIMIT}, got {timeout_seconds}"
            )));
        }

        Ok(Self {
            query,
            max_iterations,
            timeout_seconds,
            enable_citations,
        })
    }
}

impl ResearchRequest {
    /// Request with default budget and citations enabled.
    pub fn from_query(query: impl Into<String>) -> Result<Self> {
        Self::builder().query(query).build()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn enable_citations(&self) -> bool {
        self.enable_citations
    }
}
