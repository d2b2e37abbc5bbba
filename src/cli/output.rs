//! Rendering research results for the terminal or a file.

use super::OutputFormat;
use crate::citations::ResearchReport;
use crate::error::Result;
use crate::types::{ResearchLogRecord, ResearchResult};

const RULE: &str = "----------------------------------------";
const LOG_QUERY_PREVIEW: usize = 50;

pub fn render(result: &ResearchResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_text(result),
        OutputFormat::Markdown => format_markdown(result),
        OutputFormat::Json => format_json(result)?,
        OutputFormat::Report => ResearchReport::from_result(result).to_markdown(),
    })
}

pub fn format_text(result: &ResearchResult) -> String {
    let mut lines = vec!["Content:".to_string(), RULE.to_string(), result.content.clone(), String::new()];

    if !result.citations.is_empty() {
        lines.push("Citations:".to_string());
        lines.push(RULE.to_string());
        for (i, citation) in result.citations.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, citation.title()));
            lines.push(format!("   {}", citation.url()));
        }
        lines.push(String::new());
    }

    lines.push("Metadata:".to_string());
    lines.push(RULE.to_string());
    lines.push(format!("Execution time: {:.2}s", result.execution_time_seconds));
    lines.push(format!("Citations found: {}", result.citations.len()));
    lines.join("\n")
}

pub fn format_markdown(result: &ResearchResult) -> String {
    let mut lines = vec![
        "# Research Results".to_string(),
        String::new(),
        "## Content".to_string(),
        String::new(),
        result.content.clone(),
        String::new(),
    ];

    if !result.citations.is_empty() {
        lines.push("## Citations".to_string());
        lines.push(String::new());
        for (i, citation) in result.citations.iter().enumerate() {
            lines.push(format!("{}. [{}]({})", i + 1, citation.title(), citation.url()));
        }
        lines.push(String::new());
    }

    lines.push("## Metadata".to_string());
    lines.push(String::new());
    lines.push(format!("- **Execution time**: {:.2}s", result.execution_time_seconds));
    lines.push(format!("- **Citations found**: {}", result.citations.len()));
    lines.join("\n")
}

pub fn format_json(result: &ResearchResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&result.to_record())?)
}

/// One line per saved log: `" 1. ✅ <timestamp> - <query preview>..."`.
pub fn format_log_listing(records: &[ResearchLogRecord]) -> String {
    if records.is_empty() {
        return "No log files found".to_string();
    }
    let mut out = format!("Found {} log files:\n", records.len());
    for (i, record) in records.iter().enumerate() {
        let marker = if record.result.success { "✅" } else { "❌" };
        let preview: String = record
            .result
            .metadata
            .query
            .chars()
            .take(LOG_QUERY_PREVIEW)
            .collect();
        out.push_str(&format!(
            "{:2}. {marker} {} - {preview}...\n",
            i + 1,
            record.timestamp.to_rfc3339()
        ));
    }
    out
}
