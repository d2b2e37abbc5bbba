//! Validated citation records.

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// One source referenced by a research report.
///
/// Construction validates the record, so a `Citation` always has a non-empty
/// title and an http(s) URL with a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCitation")]
pub struct Citation {
    title: String,
    url: String,
    snippet: String,
    index: u32,
}

#[derive(Deserialize)]
struct RawCitation {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    index: i64,
}

impl TryFrom<RawCitation> for Citation {
    type Error = ResearchError;

    fn try_from(raw: RawCitation) -> Result<Self> {
        let index = u32::try_from(raw.index).map_err(|_| {
            ResearchError::Validation("Citation index must be non-negative".into())
        })?;
        Citation::new(raw.title, raw.url, raw.snippet, index)
    }
}

impl Citation {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        index: u32,
    ) -> Result<Self> {
        let title = title.into();
        let url = url.into();
        if title.trim().is_empty() {
            return Err(ResearchError::Validation(
                "Citation title must be a non-empty string".into(),
            ));
        }
        if !is_valid_url(&url) {
            return Err(ResearchError::Validation(format!("Invalid citation URL: {url}")));
        }
        Ok(Self {
            title,
            url,
            snippet: snippet.into(),
            index,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Same URL, or titles equal ignoring case.
    pub fn is_duplicate_of(&self, other: &Citation) -> bool {
        self.url == other.url || self.title.to_lowercase() == other.title.to_lowercase()
    }

    /// Copy of this citation with a different index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Host part of the URL.
    pub fn domain(&self) -> Option<String> {
        url_host(&self.url)
    }
}

/// A structured URL citation attached to an agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlAnnotation {
    /// The marker text the annotation replaces in the message body.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
}

impl UrlAnnotation {
    /// Title, falling back to the URL.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.url,
        }
    }
}

/// True for `http`/`https` URLs that have a non-empty host.
pub fn is_valid_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Host of a URL, `None` when the string does not parse.
pub fn url_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_title_and_bad_urls() {
        assert!(Citation::new("", "https://example.com", "", 1).is_err());
        assert!(Citation::new("Title", "ftp://example.com/file", "", 1).is_err());
        assert!(Citation::new("Title", "not a url", "", 1).is_err());
        assert!(Citation::new("Title", "https://", "", 1).is_err());
        assert!(Citation::new("Title", "https://example.com/a", "", 1).is_ok());
    }

    #[test]
    fn duplicate_by_url_or_title_case() {
        let a = Citation::new("Quantum Review", "https://a.example/x", "", 1).unwrap();
        let same_url = Citation::new("Other", "https://a.example/x", "", 2).unwrap();
        let same_title = Citation::new("quantum review", "https://b.example/y", "", 3).unwrap();
        let distinct = Citation::new("Else", "https://c.example/z", "", 4).unwrap();
        assert!(same_url.is_duplicate_of(&a));
        assert!(same_title.is_duplicate_of(&a));
        assert!(!distinct.is_duplicate_of(&a));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Citation = serde_json::from_str(
            r#"{"title":"T","url":"https://example.com","snippet":"s","index":2}"#,
        )
        .unwrap();
        assert_eq!(ok.index(), 2);
        assert_eq!(ok.domain().as_deref(), Some("example.com"));

        let bad = serde_json::from_str::<Citation>(
            r#"{"title":"T","url":"https://example.com","snippet":"s","index":-1}"#,
        );
        assert!(bad.is_err());
    }
}
