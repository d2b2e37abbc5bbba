//! Configuration system (layered: setters > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ResearchError, Result};
use crate::security::{validate_model_name, validate_project_name, DEFAULT_MAX_INPUT_LENGTH};

pub const DEFAULT_MODEL_DEPLOYMENT: &str = "gpt-4o";
pub const DEFAULT_DEEP_RESEARCH_MODEL: &str = "o3-deep-research";
pub const DEFAULT_BING_RESOURCE: &str = "bingsearch";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 2;
const REDACTED: &str = "***REDACTED***";
const LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL"];

/// Everything the service and CLI need to run research.
///
/// Missing keys in a TOML file fall back to the defaults.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchConfig {
    pub project_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model_deployment_name: String,
    pub deep_research_model_deployment_name: String,
    pub bing_resource_name: String,
    pub log_level: String,
    pub log_directory: PathBuf,
    pub max_input_length: usize,
    pub max_file_size_mb: u64,
    pub sanitize_output: bool,
    pub enable_tracing: bool,
    pub poll_interval_ms: u64,
    pub max_concurrent_runs: usize,
}

impl std::fmt::Debug for ResearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchConfig")
            .field("project_endpoint", &self.project_endpoint.as_ref().map(|_| REDACTED))
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("model_deployment_name", &self.model_deployment_name)
            .field(
                "deep_research_model_deployment_name",
                &self.deep_research_model_deployment_name,
            )
            .field("bing_resource_name", &self.bing_resource_name)
            .field("log_level", &self.log_level)
            .field("log_directory", &self.log_directory)
            .field("max_input_length", &self.max_input_length)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("sanitize_output", &self.sanitize_output)
            .field("enable_tracing", &self.enable_tracing)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_concurrent_runs", &self.max_concurrent_runs)
            .finish()
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            project_endpoint: None,
            api_key: None,
            model_deployment_name: DEFAULT_MODEL_DEPLOYMENT.to_string(),
            deep_research_model_deployment_name: DEFAULT_DEEP_RESEARCH_MODEL.to_string(),
            bing_resource_name: DEFAULT_BING_RESOURCE.to_string(),
            log_level: "INFO".to_string(),
            log_directory: PathBuf::from("logs"),
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            max_file_size_mb: 50,
            sanitize_output: true,
            enable_tracing: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

impl ResearchConfig {
    /// Load `.env`, then the config file, then the process environment.
    ///
    /// An explicit `config_path` must exist; the default path is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded environment file");
        }

        let base = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        base.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ResearchError::Configuration(format!(
                "Configuration file not readable: {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| ResearchError::Configuration(format!("Invalid configuration file: {e}")))
    }

    /// Overlay variables returned by `lookup` (keys as in the process
    /// environment, e.g. `PROJECT_ENDPOINT`).
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PROJECT_ENDPOINT") {
            self.project_endpoint = Some(v);
        }
        if let Some(v) = get("PROJECT_API_KEY").or_else(|| get("AZURE_AI_TOKEN")) {
            self.api_key = Some(v);
        }
        if let Some(v) = get("MODEL_DEPLOYMENT_NAME") {
            self.model_deployment_name = v;
        }
        if let Some(v) = get("DEEP_RESEARCH_MODEL_DEPLOYMENT_NAME") {
            self.deep_research_model_deployment_name = v;
        }
        if let Some(v) = get("BING_RESOURCE_NAME") {
            self.bing_resource_name = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v.to_uppercase();
        }
        if let Some(v) = get("LOG_DIRECTORY") {
            self.log_directory = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_INPUT_LENGTH") {
            self.max_input_length = parse_number("MAX_INPUT_LENGTH", &v)?;
        }
        if let Some(v) = get("MAX_FILE_SIZE_MB") {
            self.max_file_size_mb = parse_number("MAX_FILE_SIZE_MB", &v)?;
        }
        if let Some(v) = get("SANITIZE_OUTPUT") {
            self.sanitize_output = parse_flag(&v);
        }
        if let Some(v) = get("ENABLE_TRACING") {
            self.enable_tracing = parse_flag(&v);
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("POLL_INTERVAL_MS", &v)?;
        }
        Ok(self)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.project_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into().to_uppercase();
        self
    }

    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// First host label of the project endpoint, e.g. `my-project` for
    /// `https://my-project.services.ai.azure.com/...`.
    pub fn project_name(&self) -> Option<String> {
        let endpoint = self.project_endpoint.as_deref()?;
        let url = reqwest::Url::parse(endpoint).ok()?;
        let host = url.host_str()?;
        host.split('.').next().map(str::to_string)
    }

    /// Check the settings needed to talk to the remote service.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.project_endpoint.as_deref().ok_or_else(|| {
            ResearchError::Configuration("PROJECT_ENDPOINT environment variable is required".into())
        })?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ResearchError::Configuration(
                "project_endpoint must be a valid URL".into(),
            ));
        }
        let project = self.project_name().ok_or_else(|| {
            ResearchError::Configuration(format!("Cannot derive project name from {endpoint}"))
        })?;
        validate_project_name(&project)?;
        validate_model_name(&self.model_deployment_name)?;
        validate_model_name(&self.deep_research_model_deployment_name)?;
        if self.bing_resource_name.trim().is_empty() {
            return Err(ResearchError::Configuration(
                "bing_resource_name cannot be empty".into(),
            ));
        }
        self.validate_local()
    }

    /// Check only the settings that matter without a remote service.
    pub fn validate_local(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(ResearchError::Configuration(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }
        if self.max_input_length == 0 {
            return Err(ResearchError::Configuration("max_input_length must be positive".into()));
        }
        if self.max_file_size_mb == 0 {
            return Err(ResearchError::Configuration("max_file_size_mb must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ResearchError::Configuration("poll_interval_ms must be positive".into()));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ResearchError::Configuration(
                "max_concurrent_runs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// JSON view safe to print: endpoint and key are masked.
    pub fn redacted(&self) -> serde_json::Value {
        json!({
            "project_endpoint": self.project_endpoint.as_ref().map(|_| REDACTED),
            "project_name": self.project_name(),
            "api_key": self.api_key.as_ref().map(|_| REDACTED),
            "model_deployment_name": self.model_deployment_name,
            "deep_research_model_deployment_name": self.deep_research_model_deployment_name,
            "bing_resource_name": self.bing_resource_name,
            "log_level": self.log_level,
            "log_directory": self.log_directory.display().to_string(),
            "max_input_length": self.max_input_length,
            "max_file_size_mb": self.max_file_size_mb,
            "sanitize_output": self.sanitize_output,
            "enable_tracing": self.enable_tracing,
            "poll_interval_ms": self.poll_interval_ms,
            "max_concurrent_runs": self.max_concurrent_runs,
        })
    }
}

/// `~/.deep-research/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".deep-research").join("config.toml"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ResearchError::Configuration(format!("{key} must be a positive integer, got '{value}'")))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
