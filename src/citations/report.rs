//! Markdown research reports with a numbered reference section.

use std::collections::HashSet;

use super::superscript::convert_to_superscript;
use crate::types::{ResearchResult, UrlAnnotation};

/// A rendered reference entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

/// Body text plus the unique sources it cites, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchReport {
    pub body: String,
    pub references: Vec<Reference>,
}

impl ResearchReport {
    /// Build from the text parts and URL annotations of an agent message.
    ///
    /// Parts are trimmed and joined by blank lines, then markers are turned
    /// into superscripts. Annotations are deduplicated by URL and by the
    /// marker text they replace.
    pub fn from_annotations(text_parts: &[String], annotations: &[UrlAnnotation]) -> Self {
        let body = text_parts
            .iter()
            .map(|part| part.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let body = convert_to_superscript(&body);

        let mut seen_urls = HashSet::new();
        let mut seen_markers = HashSet::new();
        let mut references = Vec::new();
        for annotation in annotations {
            if !seen_urls.insert(annotation.url.as_str()) {
                continue;
            }
            let marker = annotation
                .text
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("fallback_{}", annotation.url));
            if seen_markers.insert(marker) {
                references.push(Reference {
                    title: annotation.display_title().to_string(),
                    url: annotation.url.clone(),
                });
            }
        }

        Self { body, references }
    }

    /// Build from a finished result whose content is already annotated.
    pub fn from_result(result: &ResearchResult) -> Self {
        let mut seen = HashSet::new();
        let references = result
            .citations
            .iter()
            .filter(|c| seen.insert(c.url().to_string()))
            .map(|c| Reference {
                title: c.title().to_string(),
                url: c.url().to_string(),
            })
            .collect();
        Self {
            body: result.content.clone(),
            references,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = self.body.clone();
        if !self.references.is_empty() {
            out.push_str("\n\n## Citations\n");
            for (i, reference) in self.references.iter().enumerate() {
                out.push_str(&format!("{}. [{}]({})\n", i + 1, reference.title, reference.url));
            }
        }
        out
    }
}
