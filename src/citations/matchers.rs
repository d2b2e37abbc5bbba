//! Citation matching strategies.
//!
//! Each strategy recognises one textual shape of a reference and yields raw
//! candidates. Cleaning, validation and deduplication happen in
//! [`super::CitationProcessor`].

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A raw title/URL pair found in text.
///
/// `span` covers the whole match and drives the snippet; `url_span` covers
/// only the URL and decides whether two candidates claim the same reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCandidate {
    pub title: String,
    pub url: String,
    pub span: Range<usize>,
    pub url_span: Range<usize>,
}

impl CitationCandidate {
    /// Whether this candidate's URL overlaps `other`.
    pub fn overlaps(&self, other: &Range<usize>) -> bool {
        self.url_span.start < other.end && other.start < self.url_span.end
    }
}

/// One citation shape.
pub trait CitationMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// All candidates in `text`, in order of appearance.
    fn try_match(&self, text: &str) -> Vec<CitationCandidate>;
}

static NUMBERED_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\[(\d+)\]\s*([^\[\]]+?)(?:\s+)?(https?://[^\s\]]+)")
        .expect("numbered bracket regex must compile")
});
static NUMBERED_BRACKET_COLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\[(\d+)\]:\s*([^\[\]]+?)(?:\s+)?(https?://[^\s\]]+)")
        .expect("numbered bracket colon regex must compile")
});
static NUMBERED_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(\d+)\.\s*([^\[\]]+?)(?:\s+)?(https?://[^\s\]]+)")
        .expect("numbered list regex must compile")
});
// Matches on HTML-escaped text, so the quote may appear as `&quot;`.
static QUOTED_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)(?:"|&quot;)([^"&]+?)(?:"|&quot;)\s*-?\s*(https?://[^\s\]]+)"#)
        .expect("quoted title regex must compile")
});
static LABELLED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)([^:\[\]]+):\s*(https?://[^\s\]]+)").expect("labelled url regex must compile")
});

/// A regex strategy; `title_group` and `url_group` pick the capture groups.
pub struct PatternMatcher {
    name: &'static str,
    regex: &'static LazyLock<Regex>,
    title_group: usize,
    url_group: usize,
}

impl PatternMatcher {
    /// `[n] title URL`
    pub fn numbered_bracket() -> Self {
        Self {
            name: "numbered_bracket",
            regex: &NUMBERED_BRACKET,
            title_group: 2,
            url_group: 3,
        }
    }

    /// `[n]: title URL`
    pub fn numbered_bracket_colon() -> Self {
        Self {
            name: "numbered_bracket_colon",
            regex: &NUMBERED_BRACKET_COLON,
            title_group: 2,
            url_group: 3,
        }
    }

    /// `n. title URL`
    pub fn numbered_list() -> Self {
        Self {
            name: "numbered_list",
            regex: &NUMBERED_LIST,
            title_group: 2,
            url_group: 3,
        }
    }

    /// `"title" - URL`
    pub fn quoted_title() -> Self {
        Self {
            name: "quoted_title",
            regex: &QUOTED_TITLE,
            title_group: 1,
            url_group: 2,
        }
    }

    /// `label: URL`
    pub fn labelled_url() -> Self {
        Self {
            name: "labelled_url",
            regex: &LABELLED_URL,
            title_group: 1,
            url_group: 2,
        }
    }
}

impl CitationMatcher for PatternMatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn try_match(&self, text: &str) -> Vec<CitationCandidate> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let title = caps.get(self.title_group)?.as_str().trim().to_string();
                let url = caps.get(self.url_group)?;
                Some(CitationCandidate {
                    title,
                    url: url.as_str().trim().to_string(),
                    span: whole.range(),
                    url_span: url.range(),
                })
            })
            .collect()
    }
}

/// The strategies in the order they are tried.
pub fn default_matchers() -> Vec<Box<dyn CitationMatcher>> {
    vec![
        Box::new(PatternMatcher::numbered_bracket()),
        Box::new(PatternMatcher::numbered_bracket_colon()),
        Box::new(PatternMatcher::numbered_list()),
        Box::new(PatternMatcher::quoted_title()),
        Box::new(PatternMatcher::labelled_url()),
    ]
}
