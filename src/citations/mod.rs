//! Citation extraction, validation and rendering.

pub mod matchers;
pub mod report;
pub mod superscript;

pub use matchers::{default_matchers, CitationCandidate, CitationMatcher, PatternMatcher};
pub use report::{Reference, ResearchReport};
pub use superscript::{consolidate, convert_to_superscript, count_superscripts};

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::security::{sanitize_html_output, strip_active_content};
use crate::types::{is_valid_url, url_host, Citation, UrlAnnotation};

pub const DEFAULT_MAX_CITATIONS: usize = 50;

const SNIPPET_CONTEXT_CHARS: usize = 100;
const MAX_SNIPPET_CHARS: usize = 300;
const MAX_TITLE_CHARS: usize = 200;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));
static TITLE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,:;-]").expect("title noise regex must compile"));

/// Aggregate figures over a citation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationStatistics {
    pub total: usize,
    pub domains: BTreeMap<String, usize>,
    pub avg_title_length: f64,
    pub unique_domains: usize,
}

/// Extracts citations from agent output and renders them.
pub struct CitationProcessor {
    max_citations: usize,
    matchers: Vec<Box<dyn CitationMatcher>>,
}

impl Default for CitationProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CITATIONS)
    }
}

impl CitationProcessor {
    pub fn new(max_citations: usize) -> Self {
        Self {
            max_citations,
            matchers: default_matchers(),
        }
    }

    /// Replace the matching strategies; they are tried in the given order.
    pub fn with_matchers(mut self, matchers: Vec<Box<dyn CitationMatcher>>) -> Self {
        self.matchers = matchers;
        self
    }

    pub fn max_citations(&self) -> usize {
        self.max_citations
    }

    /// Extract unique, validated citations, indexed from 1 in acceptance order.
    ///
    /// A candidate is rejected when its URL is invalid, when it duplicates an
    /// accepted citation, or when its URL overlaps one already accepted.
    pub fn extract_citations(&self, content: &str) -> Vec<Citation> {
        if content.trim().is_empty() {
            tracing::warn!("Empty content provided for citation extraction");
            return Vec::new();
        }

        let sanitized = sanitize_html_output(content);
        let mut citations: Vec<Citation> = Vec::new();
        let mut accepted_spans: Vec<Range<usize>> = Vec::new();

        'matchers: for matcher in &self.matchers {
            for candidate in matcher.try_match(&sanitized) {
                if citations.len() >= self.max_citations {
                    tracing::warn!(max = self.max_citations, "Maximum citations limit reached");
                    break 'matchers;
                }
                if accepted_spans.iter().any(|span| candidate.overlaps(span)) {
                    continue;
                }

                let next_index = citations.len() as u32 + 1;
                let citation = match build_citation(&sanitized, &candidate, next_index) {
                    Ok(citation) => citation,
                    Err(e) => {
                        tracing::debug!(matcher = matcher.name(), error = %e, "Dropping citation candidate");
                        continue;
                    }
                };
                if citations.iter().any(|existing| citation.is_duplicate_of(existing)) {
                    continue;
                }
                accepted_spans.push(candidate.url_span.clone());
                citations.push(citation);
            }
        }

        tracing::info!(count = citations.len(), "Extracted citations from content");
        citations
    }

    pub fn convert_to_superscript(&self, content: &str) -> String {
        convert_to_superscript(content)
    }

    /// Fold structured URL annotations into `citations`, skipping duplicates.
    pub fn merge_annotations(
        &self,
        mut citations: Vec<Citation>,
        annotations: &[UrlAnnotation],
    ) -> Vec<Citation> {
        for annotation in annotations {
            if citations.len() >= self.max_citations {
                break;
            }
            let index = citations.len() as u32 + 1;
            let title = clean_title(annotation.display_title());
            let url = strip_active_content(annotation.url.trim());
            let snippet = strip_active_content(annotation.text.as_deref().unwrap_or_default());
            match Citation::new(title, url, snippet, index) {
                Ok(citation) if !citations.iter().any(|c| citation.is_duplicate_of(c)) => {
                    citations.push(citation);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(url = %annotation.url, error = %e, "Skipping annotation"),
            }
        }
        citations
    }
}

/// `"{index}. {title} - {url}"` lines.
pub fn format_citation_list(citations: &[Citation]) -> String {
    citations
        .iter()
        .map(|c| format_line(i64::from(c.index()), c.title(), c.url()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same as [`format_citation_list`] for loosely-typed records.
pub fn format_citation_values(citations: &[Value]) -> String {
    citations
        .iter()
        .map(|c| {
            let index = c.get("index").and_then(Value::as_i64).unwrap_or(0);
            let title = c.get("title").and_then(Value::as_str).unwrap_or("Untitled");
            let url = c.get("url").and_then(Value::as_str).unwrap_or("");
            format_line(index, title, url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_line(index: i64, title: &str, url: &str) -> String {
    if url.is_empty() {
        format!("{index}. {title}")
    } else {
        format!("{index}. {title} - {url}")
    }
}

/// Validate raw records, returning the valid citations and one message per
/// rejected entry.
pub fn validate_citations(records: &[Value]) -> (Vec<Citation>, Vec<String>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (i, record) in records.iter().enumerate() {
        if !record.is_object() {
            errors.push(format!("Citation {i}: Invalid data type"));
            continue;
        }
        match serde_json::from_value::<Citation>(record.clone()) {
            Ok(citation) => valid.push(citation),
            Err(e) => errors.push(format!("Citation {i}: {e}")),
        }
    }

    tracing::info!(valid = valid.len(), total = records.len(), "Validated citations");
    if !errors.is_empty() {
        tracing::warn!(?errors, "Citation validation errors");
    }
    (valid, errors)
}

pub fn citation_statistics(citations: &[Citation]) -> CitationStatistics {
    statistics(citations.iter().map(|c| (c.title(), c.url())))
}

/// Statistics over loosely-typed records; missing fields count as empty.
pub fn citation_statistics_from_values(citations: &[Value]) -> CitationStatistics {
    statistics(citations.iter().map(|c| {
        (
            c.get("title").and_then(Value::as_str).unwrap_or(""),
            c.get("url").and_then(Value::as_str).unwrap_or(""),
        )
    }))
}

fn statistics<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> CitationStatistics {
    let mut total = 0;
    let mut domains: BTreeMap<String, usize> = BTreeMap::new();
    let mut title_lengths = Vec::new();

    for (title, url) in entries {
        total += 1;
        *domains.entry(url_host(url).unwrap_or_default()).or_default() += 1;
        if !title.is_empty() {
            title_lengths.push(title.chars().count());
        }
    }

    let avg = if title_lengths.is_empty() {
        0.0
    } else {
        title_lengths.iter().sum::<usize>() as f64 / title_lengths.len() as f64
    };

    CitationStatistics {
        total,
        unique_domains: domains.len(),
        domains,
        avg_title_length: (avg * 10.0).round() / 10.0,
    }
}

fn build_citation(
    text: &str,
    candidate: &CitationCandidate,
    index: u32,
) -> crate::error::Result<Citation> {
    let url = strip_active_content(&unescape_entities(&candidate.url));
    if !is_valid_url(&url) {
        return Err(crate::error::ResearchError::Validation(format!(
            "Invalid URL in citation: {url}"
        )));
    }
    let title = clean_title(&unescape_entities(&candidate.title));
    let snippet = extract_snippet(text, candidate.span.start, candidate.span.end);
    Citation::new(title, url, snippet, index)
}

/// Collapse whitespace, drop punctuation noise and active content, cap the length.
pub fn clean_title(title: &str) -> String {
    let collapsed = WHITESPACE.replace_all(title.trim(), " ");
    let denoised = TITLE_NOISE.replace_all(&collapsed, "");
    let cleaned = strip_active_content(&denoised).trim().to_string();
    if cleaned.is_empty() {
        return "Untitled".to_string();
    }
    if cleaned.chars().count() > MAX_TITLE_CHARS {
        let mut truncated: String = cleaned.chars().take(MAX_TITLE_CHARS - 3).collect();
        truncated.push_str("...");
        return truncated;
    }
    cleaned
}

/// Context window of up to 100 characters on either side of `start..end`.
pub fn extract_snippet(text: &str, start: usize, end: usize) -> String {
    let window_start = text[..start]
        .char_indices()
        .rev()
        .nth(SNIPPET_CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window_end = text[end..]
        .char_indices()
        .nth(SNIPPET_CONTEXT_CHARS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut snippet = WHITESPACE
        .replace_all(&text[window_start..window_end], " ")
        .trim()
        .to_string();
    if window_start > 0 {
        snippet.insert_str(0, "...");
    }
    if window_end < text.len() {
        snippet.push_str("...");
    }
    snippet.chars().take(MAX_SNIPPET_CHARS).collect()
}

fn unescape_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REPORT: &str = "Solid-state cells are maturing [1]. Costs are falling [2].\n\n\
        [1] Nature Energy Review https://www.nature.com/articles/x\n\
        [2] IEA Battery Report https://www.iea.org/reports/y";

    #[test]
    fn extracts_numbered_references() {
        let citations = CitationProcessor::default().extract_citations(REPORT);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].title(), "Nature Energy Review");
        assert_eq!(citations[0].url(), "https://www.nature.com/articles/x");
        assert_eq!(citations[0].index(), 1);
        assert_eq!(citations[1].title(), "IEA Battery Report");
        assert_eq!(citations[1].index(), 2);
    }

    #[test]
    fn same_url_different_title_kept_once() {
        let text = "[1] First Title https://example.com/a\n[2] Second Title https://example.com/a";
        let citations = CitationProcessor::default().extract_citations(text);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].title(), "First Title");
    }

    #[test]
    fn labelled_url_after_numbered_reference_is_kept() {
        let text = "[1] Paper https://a.example/p\nDataset: https://b.example/d";
        let citations = CitationProcessor::default().extract_citations(text);
        let urls: Vec<&str> = citations.iter().map(Citation::url).collect();
        assert_eq!(urls, vec!["https://a.example/p", "https://b.example/d"]);
        assert_eq!(citations[1].index(), 2);
    }

    #[test]
    fn same_reference_matched_twice_is_kept_once() {
        let text = "[1]: Storage Study https://example.com/study";
        let citations = CitationProcessor::default().extract_citations(text);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url(), "https://example.com/study");
    }

    #[test]
    fn invalid_urls_dropped_and_empty_input() {
        let processor = CitationProcessor::default();
        assert!(processor.extract_citations("").is_empty());
        assert!(processor.extract_citations("[1] Title http:// nothing").is_empty());
    }

    #[test]
    fn cap_is_respected() {
        let text: String = (1..=10)
            .map(|i| format!("[{i}] Source {i} https://site{i}.example.com/p\n"))
            .collect();
        let citations = CitationProcessor::new(3).extract_citations(&text);
        assert_eq!(citations.len(), 3);
        assert_eq!(
            citations.iter().map(Citation::index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn escaped_ampersand_in_url_is_restored() {
        let citations = CitationProcessor::default()
            .extract_citations("[1] Query Docs https://example.com/search?a=1&b=2");
        assert_eq!(citations[0].url(), "https://example.com/search?a=1&b=2");
    }

    #[test]
    fn title_cleaning() {
        assert_eq!(clean_title("  A   <b>bold</b>\n title! "), "A bboldb title");
        assert_eq!(clean_title("***"), "Untitled");
        assert_eq!(clean_title("JavaScript:"), "Untitled");
        let long = "t".repeat(250);
        let cleaned = clean_title(&long);
        assert_eq!(cleaned.chars().count(), 200);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn snippet_window() {
        let text = format!("{}MARK{}", "a".repeat(150), "b".repeat(150));
        let snippet = extract_snippet(&text, 150, 154);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 3 + 100 + 4 + 100 + 3);

        let short = extract_snippet("see MARK now", 4, 8);
        assert_eq!(short, "see MARK now");
    }

    #[test]
    fn merge_annotations_dedupes() {
        let processor = CitationProcessor::default();
        let extracted = processor.extract_citations(REPORT);
        let annotations = vec![
            UrlAnnotation {
                text: None,
                title: Some("Duplicate".into()),
                url: "https://www.nature.com/articles/x".into(),
            },
            UrlAnnotation {
                text: Some("marker".into()),
                title: Some("Benchmark (2025)".into()),
                url: "https://bench.example.com".into(),
            },
            UrlAnnotation {
                text: None,
                title: None,
                url: "mailto:nobody".into(),
            },
        ];
        let merged = processor.merge_annotations(extracted, &annotations);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].title(), "Benchmark 2025");
        assert_eq!(merged[2].index(), 3);
    }

    #[test]
    fn list_formatting() {
        let citations = CitationProcessor::default().extract_citations(REPORT);
        assert_eq!(
            format_citation_list(&citations),
            "1. Nature Energy Review - https://www.nature.com/articles/x\n\
             2. IEA Battery Report - https://www.iea.org/reports/y"
        );
        assert_eq!(
            format_citation_values(&[json!({"index": 4, "title": "No link"})]),
            "4. No link"
        );
    }

    #[test]
    fn validation_collects_errors() {
        let records = vec![
            json!({"title": "Good", "url": "https://ok.example", "snippet": "", "index": 1}),
            json!({"title": "", "url": "https://ok.example", "index": 2}),
            json!("not an object"),
            json!({"title": "Bad", "url": "nope", "index": 3}),
        ];
        let (valid, errors) = validate_citations(&records);
        assert_eq!(valid.len(), 1);
        assert_eq!(errors.len(), 3);
        assert!(errors[2].starts_with("Citation 3:"));
    }

    #[test]
    fn statistics() {
        let records = vec![
            json!({"title": "abc", "url": "https://a.example/1"}),
            json!({"title": "abcd", "url": "https://a.example/2"}),
            json!({"url": "https://b.example"}),
        ];
        let stats = citation_statistics_from_values(&records);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.domains["a.example"], 2);
        assert_eq!(stats.unique_domains, 2);
        assert_eq!(stats.avg_title_length, 3.5);

        let empty = citation_statistics(&[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.avg_title_length, 0.0);
    }
}
