//! Research execution: the run orchestrator, the worker pool and the
//! service facade used by the CLI.

pub mod executor;
pub mod orchestrator;

pub use executor::{ResearchExecutor, ResearchHandle};
pub use orchestrator::{
    OrchestratorSettings, ResearchOrchestrator, AGENT_NAME_MARKER, DEFAULT_AGENT_INSTRUCTIONS,
    DEFAULT_AGENT_NAME, REASONING_PREFIX,
};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::citations::ResearchReport;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::persist::{ResearchLogStore, SecureFileStore};
use crate::progress::SharedProgress;
use crate::service::{AgentService, HttpAgentService};
use crate::telemetry::Telemetry;
use crate::types::{ResearchLogRecord, ResearchRequest, ResearchResult};

/// Health snapshot for `--status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub status: &'static str,
    pub config: serde_json::Value,
    pub pool_size: usize,
    pub available_slots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ServiceStatus {
    /// Status for a configuration the service could not be built from.
    pub fn unavailable(config: &ResearchConfig, error: &ResearchError) -> Self {
        Self {
            service: "ResearchService",
            status: "unhealthy",
            config: config.redacted(),
            pool_size: config.max_concurrent_runs,
            available_slots: 0,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration, orchestrator, pool and log store wired together.
pub struct ResearchService {
    config: ResearchConfig,
    executor: ResearchExecutor,
    logs: ResearchLogStore,
}

impl ResearchService {
    /// Build a service talking to the configured HTTP endpoint.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: ResearchConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config
            .project_endpoint
            .clone()
            .ok_or_else(|| ResearchError::Configuration("PROJECT_ENDPOINT is required".into()))?;
        let token = config.api_key.clone().ok_or_else(|| {
            ResearchError::Configuration(
                "PROJECT_API_KEY or AZURE_AI_TOKEN environment variable is required".into(),
            )
        })?;
        let service: Arc<dyn AgentService> = Arc::new(HttpAgentService::new(endpoint, token));
        Self::with_service(config, service)
    }

    /// Build a service over any [`AgentService`] implementation.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_service(config: ResearchConfig, service: Arc<dyn AgentService>) -> Result<Self> {
        config.validate_local()?;
        let telemetry = Telemetry::new(config.enable_tracing);
        let orchestrator = ResearchOrchestrator::new(service, OrchestratorSettings::from_config(&config))
            .with_telemetry(telemetry);
        let executor = ResearchExecutor::new(Arc::new(orchestrator))
            .with_pool_size(config.max_concurrent_runs);

        let files = SecureFileStore::new(&config.log_directory)?
            .with_max_read_bytes(config.max_file_size_bytes());
        let logs = ResearchLogStore::from_store(files).with_telemetry(telemetry);

        tracing::info!(pool_size = executor.pool_size(), "ResearchService initialized");
        Ok(Self {
            config,
            executor,
            logs,
        })
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn executor(&self) -> &ResearchExecutor {
        &self.executor
    }

    pub fn logs(&self) -> &ResearchLogStore {
        &self.logs
    }

    /// Validate `query` against the configured input limit and build a request.
    pub fn request(
        &self,
        query: &str,
        max_iterations: u32,
        timeout_seconds: u64,
        enable_citations: bool,
    ) -> Result<ResearchRequest> {
        ResearchRequest::builder()
            .query(query)
            .max_iterations(max_iterations)
            .timeout_seconds(timeout_seconds)
            .enable_citations(enable_citations)
            .max_query_length(self.config.max_input_length)
            .build()
    }

    pub async fn research(&self, request: ResearchRequest, progress: SharedProgress) -> ResearchResult {
        self.executor.run(request, progress).await
    }

    /// Markdown report with a numbered reference section.
    pub fn report(&self, result: &ResearchResult) -> String {
        let span = self
            .executor
            .orchestrator()
            .telemetry()
            .report_span(result.citations.len());
        let _enter = span.enter();
        let markdown = ResearchReport::from_result(result).to_markdown();
        span.record("output_length", markdown.len());
        markdown
    }

    pub fn save_log(&self, result: &ResearchResult) -> Result<PathBuf> {
        self.logs.save(result)
    }

    pub fn load_logs(&self) -> Result<Vec<ResearchLogRecord>> {
        self.logs.load_logs()
    }

    pub fn status(&self) -> ServiceStatus {
        let error = self.config.validate().err().map(|e| e.to_string());
        ServiceStatus {
            service: "ResearchService",
            status: if error.is_none() { "healthy" } else { "unhealthy" },
            config: self.config.redacted(),
            pool_size: self.executor.pool_size(),
            available_slots: self.executor.available_slots(),
            error,
            timestamp: Utc::now(),
        }
    }
}
