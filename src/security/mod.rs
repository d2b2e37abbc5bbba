//! Input validation and output sanitization.

pub mod validation;

pub use validation::{
    html_escape, sanitize_html_output, sanitize_log_value, strip_active_content, validate_file_extension,
    validate_model_name, validate_project_name, validate_relative_path, validate_research_query,
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_INPUT_LENGTH, MAX_LOG_STRING_LENGTH,
};
