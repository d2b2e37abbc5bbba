//! Sandboxed, atomic file storage for research artefacts.

pub mod log;

pub use log::{ResearchLogStore, LOG_FILE_PATTERN};

use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ResearchError, Result};
use crate::security::{
    sanitize_log_value, validate_file_extension, validate_relative_path,
    DEFAULT_ALLOWED_EXTENSIONS,
};

pub const DEFAULT_MAX_READ_BYTES: u64 = 50 * 1024 * 1024;
pub const MAX_LISTED_FILES: usize = 1000;
const FORCE_DELETE_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;
const BACKUP_SUFFIX: &str = ".backup";

/// Metadata about a stored file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_file: bool,
}

/// File access confined to one base directory and an extension allow-list.
#[derive(Debug, Clone)]
pub struct SecureFileStore {
    base_dir: PathBuf,
    allowed_extensions: Vec<String>,
    max_read_bytes: u64,
}

impl SecureFileStore {
    /// Open (creating if needed) a store rooted at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir).map_err(|e| {
            ResearchError::Persistence(format!(
                "Failed to create directory {}: {e}",
                base_dir.display()
            ))
        })?;
        let base_dir = base_dir.canonicalize()?;
        if !base_dir.is_dir() {
            return Err(ResearchError::Persistence(format!(
                "Base path is not a directory: {}",
                base_dir.display()
            )));
        }
        tracing::debug!(dir = %base_dir.display(), "File store initialized");
        Ok(Self {
            base_dir,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        })
    }

    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    pub fn with_max_read_bytes(mut self, max_read_bytes: u64) -> Self {
        self.max_read_bytes = max_read_bytes;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate a relative path and join it onto the base directory.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = validate_relative_path(path)?;
        let resolved = self.base_dir.join(relative);
        if !resolved.starts_with(&self.base_dir) {
            return Err(ResearchError::Validation(format!(
                "File path outside base directory: {path}"
            )));
        }
        validate_file_extension(&resolved, &self.allowed_extensions)?;
        Ok(resolved)
    }

    /// Write a JSON object, optionally sanitized and atomically.
    pub fn write_json(&self, path: &str, data: &Value, sanitize: bool, atomic: bool) -> Result<PathBuf> {
        let target = self.resolve(path)?;
        let data = if sanitize {
            sanitize_log_value(data)
        } else {
            data.clone()
        };
        if !data.is_object() {
            return Err(ResearchError::Validation(
                "Data must be a JSON object".into(),
            ));
        }
        let bytes = serde_json::to_vec_pretty(&data)?;
        self.write_bytes(&target, &bytes, atomic)?;
        tracing::debug!(path = %target.display(), atomic, "JSON written");
        Ok(target)
    }

    pub fn write_text(&self, path: &str, content: &str, atomic: bool) -> Result<PathBuf> {
        let target = self.resolve(path)?;
        self.write_bytes(&target, content.as_bytes(), atomic)?;
        tracing::debug!(path = %target.display(), atomic, "Text written");
        Ok(target)
    }

    fn write_bytes(&self, target: &Path, bytes: &[u8], atomic: bool) -> Result<()> {
        if atomic {
            atomic_write(target, bytes)
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)?;
            Ok(())
        }
    }

    /// Read a JSON object, refusing files above the size limit.
    pub fn read_json(&self, path: &str) -> Result<Value> {
        let target = self.resolve(path)?;
        let size = fs::metadata(&target)
            .map_err(|e| ResearchError::Persistence(format!("File not found: {}: {e}", target.display())))?
            .len();
        if size > self.max_read_bytes {
            return Err(ResearchError::Validation(format!(
                "File size ({:.2} MB) exceeds maximum ({:.0} MB)",
                size as f64 / (1024.0 * 1024.0),
                self.max_read_bytes as f64 / (1024.0 * 1024.0)
            )));
        }
        let bytes = fs::read(&target)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        if !value.is_object() {
            return Err(ResearchError::Validation(format!(
                "{} does not contain a JSON object",
                target.display()
            )));
        }
        Ok(value)
    }

    /// Files in the base directory whose names match `pattern`, sorted by
    /// name, restricted to allowed extensions and capped.
    pub fn list_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| ResearchError::Validation(format!("Invalid file pattern '{pattern}': {e}")))?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() {
                continue;
            }
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| matcher.matches(name));
            if matches && validate_file_extension(&path, &self.allowed_extensions).is_ok() {
                files.push(path);
            }
        }
        files.sort();

        if files.len() > MAX_LISTED_FILES {
            tracing::warn!(found = files.len(), limit = MAX_LISTED_FILES, "Too many files, truncating listing");
            files.truncate(MAX_LISTED_FILES);
        }
        Ok(files)
    }

    /// Delete a file; `false` when it did not exist. Files above 100 MB need `force`.
    pub fn delete_file(&self, path: &str, force: bool) -> Result<bool> {
        let target = self.resolve(path)?;
        let metadata = match fs::metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %target.display(), "File does not exist for deletion");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if !force && metadata.len() > FORCE_DELETE_THRESHOLD_BYTES {
            return Err(ResearchError::Persistence(
                "File too large for deletion without force flag".into(),
            ));
        }
        fs::remove_file(&target)?;
        tracing::info!(path = %target.display(), "File deleted");
        Ok(true)
    }

    pub fn file_info(&self, path: &str) -> Result<FileInfo> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target)
            .map_err(|e| ResearchError::Persistence(format!("File not found: {}: {e}", target.display())))?;
        Ok(FileInfo {
            name: target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: target
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            size_bytes: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_file: metadata.is_file(),
            path: target,
        })
    }

    /// Snapshot `path` so a failed update can be rolled back.
    ///
    /// The returned guard restores the snapshot when dropped unless
    /// [`BackupGuard::commit`] is called.
    pub fn backup(&self, path: &str) -> Result<BackupGuard> {
        let target = self.resolve(path)?;
        let backup = if target.exists() {
            let backup = backup_path(&target);
            fs::copy(&target, &backup)?;
            tracing::debug!(backup = %backup.display(), "Backup created");
            Some(backup)
        } else {
            None
        };
        Ok(BackupGuard {
            target,
            backup,
            committed: false,
        })
    }

    /// Run `update` against `path`, restoring the previous content if it fails.
    pub fn with_backup<T>(&self, path: &str, update: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let guard = self.backup(path)?;
        let value = update(guard.path())?;
        guard.commit()?;
        Ok(value)
    }
}

/// Rolls a file back to its snapshot unless committed.
#[derive(Debug)]
pub struct BackupGuard {
    target: PathBuf,
    backup: Option<PathBuf>,
    committed: bool,
}

impl BackupGuard {
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Keep the new content and discard the snapshot.
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        if let Some(backup) = self.backup.take() {
            fs::remove_file(&backup)?;
            tracing::debug!(backup = %backup.display(), "Backup removed");
        }
        Ok(())
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let outcome = match self.backup.take() {
            Some(backup) => fs::rename(&backup, &self.target),
            None if self.target.exists() => fs::remove_file(&self.target),
            None => Ok(()),
        };
        match outcome {
            Ok(()) => tracing::info!(path = %self.target.display(), "File restored from backup"),
            Err(e) => tracing::error!(path = %self.target.display(), error = %e, "Failed to restore from backup"),
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(BACKUP_SUFFIX);
    target.with_file_name(name)
}

/// Write through a hidden temp file in the same directory, fsync, then rename.
///
/// On failure the temp file is removed and `path` keeps its previous content.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        ResearchError::Persistence(format!("Path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}-{}",
        file_name.to_string_lossy(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(ResearchError::Io(err));
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(ResearchError::Io(err));
    }

    Ok(())
}
