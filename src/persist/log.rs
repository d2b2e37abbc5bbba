//! Historical research logs.

use std::path::{Path, PathBuf};

use chrono::Local;

use super::SecureFileStore;
use crate::error::Result;
use crate::telemetry::Telemetry;
use crate::types::{ResearchLogRecord, ResearchResult};

pub const LOG_FILE_PATTERN: &str = "research_log_*.json";
const LOG_FILE_PREFIX: &str = "research_log_";
const MAX_NAME_COLLISIONS: u32 = 1000;

/// Writes one JSON document per research attempt and reads them back.
#[derive(Debug, Clone)]
pub struct ResearchLogStore {
    files: SecureFileStore,
    telemetry: Telemetry,
}

impl ResearchLogStore {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_store(SecureFileStore::new(log_dir)?))
    }

    pub fn from_store(files: SecureFileStore) -> Self {
        Self {
            files,
            telemetry: Telemetry::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn log_dir(&self) -> &Path {
        self.files.base_dir()
    }

    /// Persist `result` as `research_log_<YYYYMMDD_HHMMSS>.json`, adding a
    /// numeric suffix when a log with that second already exists.
    pub fn save(&self, result: &ResearchResult) -> Result<PathBuf> {
        let file_name = self.next_file_name()?;
        self.save_as(result, &file_name)
    }

    /// Persist `result` under an explicit relative file name.
    pub fn save_as(&self, result: &ResearchResult, file_name: &str) -> Result<PathBuf> {
        let span = self.telemetry.persist_span(file_name);
        let _enter = span.enter();

        let record = serde_json::to_value(result.to_record())?;
        match self.files.write_json(file_name, &record, true, true) {
            Ok(path) => {
                if let Ok(metadata) = std::fs::metadata(&path) {
                    span.record("bytes", metadata.len());
                }
                span.record("success", true);
                tracing::info!(path = %path.display(), success = result.success, "Research log saved");
                Ok(path)
            }
            Err(e) => {
                span.record("success", false);
                tracing::error!(file_name, error = %e, "Failed to save research log");
                Err(e)
            }
        }
    }

    fn next_file_name(&self) -> Result<String> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let base = format!("{LOG_FILE_PREFIX}{stamp}");
        let candidate = format!("{base}.json");
        if !self.files.resolve(&candidate)?.exists() {
            return Ok(candidate);
        }
        for n in 1..=MAX_NAME_COLLISIONS {
            let candidate = format!("{base}_{n}.json");
            if !self.files.resolve(&candidate)?.exists() {
                return Ok(candidate);
            }
        }
        Ok(format!("{base}_{}.json", uuid::Uuid::new_v4().simple()))
    }

    /// Log files, most recent first.
    pub fn list_logs(&self) -> Result<Vec<PathBuf>> {
        let mut logs = self.files.list_files(LOG_FILE_PATTERN)?;
        logs.sort_by_cached_key(|path| std::cmp::Reverse(sort_key(path)));
        Ok(logs)
    }

    /// Parse every log, most recent first. Unreadable files are skipped.
    pub fn load_logs(&self) -> Result<Vec<ResearchLogRecord>> {
        let mut records = Vec::new();
        for path in self.list_logs()? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let parsed = self
                .files
                .read_json(name)
                .and_then(|value| Ok(serde_json::from_value::<ResearchLogRecord>(value)?));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable research log");
                }
            }
        }
        Ok(records)
    }
}

/// `(timestamp, collision suffix)` so `_10` sorts after `_9`.
fn sort_key(path: &Path) -> (String, u64) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim_start_matches(LOG_FILE_PREFIX);
    // YYYYMMDD_HHMMSS is 15 chars; anything after is `_n`.
    match stem.get(..15) {
        Some(stamp) => {
            let suffix = stem[15..].trim_start_matches('_').parse().unwrap_or(0);
            (stamp.to_string(), suffix)
        }
        None => (stem.to_string(), 0),
    }
}
