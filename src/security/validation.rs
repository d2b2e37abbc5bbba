//! Validation of user input and sanitization of anything rendered or stored.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ResearchError, Result};

/// Default upper bound on query length, in characters.
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 10_000;
/// Strings longer than this are truncated in sanitized log records.
pub const MAX_LOG_STRING_LENGTH: usize = 10_000;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".json", ".txt", ".md"];

const MIN_QUERY_LENGTH: usize = 3;
const MAX_PROJECT_NAME_LENGTH: usize = 255;
const MAX_MODEL_NAME_LENGTH: usize = 100;
const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

static FORBIDDEN_QUERY_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>"'&]"#).expect("forbidden query character regex must compile")
});
static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script tag regex must compile")
});
static JAVASCRIPT_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)javascript:").expect("javascript uri regex must compile")
});
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)on\w+\s*=").expect("event handler regex must compile")
});
static PROJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("project name regex must compile")
});
static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("model name regex must compile")
});
static LOG_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9_]").expect("log key regex must compile")
});

/// Trim, bound and strip markup characters from a research query.
///
/// Applying it twice yields the same string as applying it once.
pub fn validate_research_query(query: &str, max_length: usize) -> Result<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ResearchError::Validation(
            "Research query cannot be empty or whitespace only".into(),
        ));
    }
    if trimmed.chars().count() > max_length {
        return Err(ResearchError::Validation(format!(
            "Research query cannot exceed {max_length} characters"
        )));
    }

    let sanitized = FORBIDDEN_QUERY_CHARS.replace_all(trimmed, "");
    let sanitized = sanitized.trim();
    if sanitized.chars().count() < MIN_QUERY_LENGTH {
        return Err(ResearchError::Validation(
            "Research query too short after sanitization".into(),
        ));
    }
    Ok(sanitized.to_string())
}

pub fn validate_project_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ResearchError::Validation(
            "Project name cannot be empty or whitespace only".into(),
        ));
    }
    if name.len() > MAX_PROJECT_NAME_LENGTH {
        return Err(ResearchError::Validation(format!(
            "Project name cannot exceed {MAX_PROJECT_NAME_LENGTH} characters"
        )));
    }
    if !PROJECT_NAME.is_match(name) {
        return Err(ResearchError::Validation(
            "Project name can only contain alphanumeric characters, hyphens, and underscores"
                .into(),
        ));
    }
    Ok(())
}

pub fn validate_model_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ResearchError::Validation(
            "Model name cannot be empty or whitespace only".into(),
        ));
    }
    if name.len() > MAX_MODEL_NAME_LENGTH {
        return Err(ResearchError::Validation(format!(
            "Model name cannot exceed {MAX_MODEL_NAME_LENGTH} characters"
        )));
    }
    if !MODEL_NAME.is_match(name) {
        return Err(ResearchError::Validation(
            "Model name can only contain alphanumeric characters, dots, hyphens, and underscores"
                .into(),
        ));
    }
    Ok(())
}

/// Accept only relative paths that never climb out of their root.
pub fn validate_relative_path(path: &str) -> Result<PathBuf> {
    if path.trim().is_empty() {
        return Err(ResearchError::Validation("File path cannot be empty".into()));
    }
    let candidate = Path::new(path);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ResearchError::Validation(format!(
                    "File path contains invalid directory traversal: {path}"
                )));
            }
        }
    }
    let normalized: PathBuf = candidate
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        return Err(ResearchError::Validation(format!("File path names no file: {path}")));
    }
    Ok(normalized)
}

/// Case-insensitive match of the path's extension against `allowed` (`.json` form).
pub fn validate_file_extension(path: &Path, allowed: &[String]) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(())
    } else {
        Err(ResearchError::Validation(format!(
            "File extension '{extension}' not allowed. Allowed: {}",
            allowed.join(", ")
        )))
    }
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape HTML, then remove script blocks, `javascript:` and inline handlers.
pub fn sanitize_html_output(content: &str) -> String {
    let escaped = html_escape(content);
    let stripped = SCRIPT_TAG.replace_all(&escaped, "");
    let stripped = JAVASCRIPT_URI.replace_all(&stripped, "");
    EVENT_HANDLER.replace_all(&stripped, "").into_owned()
}

/// Remove script blocks, `javascript:` and inline handlers until none remain.
///
/// Unlike [`sanitize_html_output`] nothing is escaped, and the result is a
/// fixed point: sanitizing it again strips nothing further.
pub fn strip_active_content(content: &str) -> String {
    let mut current = content.to_string();
    loop {
        let stripped = SCRIPT_TAG.replace_all(&current, "");
        let stripped = JAVASCRIPT_URI.replace_all(&stripped, "");
        let stripped = EVENT_HANDLER.replace_all(&stripped, "").into_owned();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

/// Sanitize a JSON value for storage: keys are normalized to `[A-Za-z0-9_]`,
/// strings are HTML-sanitized and truncated, nesting is walked recursively.
pub fn sanitize_log_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_log_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_log_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (LOG_KEY.replace_all(key, "_").into_owned(), sanitize_log_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sanitize_log_string(s: &str) -> String {
    let clean = sanitize_html_output(s);
    if clean.chars().count() > MAX_LOG_STRING_LENGTH {
        let mut truncated: String = clean.chars().take(MAX_LOG_STRING_LENGTH).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        clean
    }
}
