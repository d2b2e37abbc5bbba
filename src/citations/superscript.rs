//! Inline citation markers rendered as consolidated superscripts.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static SOURCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x{3010}\d+:(\d+)\x{2020}source\x{3011}").expect("source marker regex must compile")
});
static BRACKET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("bracket marker regex must compile"));
static SUPERSCRIPT_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(<sup>\d+</sup>)(\s*,?\s*<sup>\d+</sup>)+").expect("superscript run regex must compile")
});
static SUPERSCRIPT_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sup>(\d+)</sup>").expect("superscript index regex must compile"));
static ANY_SUPERSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sup>[^<>]+</sup>").expect("superscript regex must compile"));

/// Replace `【n:m†source】` and `[n]` markers with `<sup>` tags, then merge
/// every run of adjacent tags into one sorted, deduplicated tag.
pub fn convert_to_superscript(content: &str) -> String {
    let marked = SOURCE_MARKER.replace_all(content, "<sup>$1</sup>");
    let marked = BRACKET_MARKER.replace_all(&marked, "<sup>$1</sup>");
    consolidate(&marked)
}

/// Merge runs like `<sup>5</sup>, <sup>4</sup><sup>5</sup>` into `<sup>4,5</sup>`.
pub fn consolidate(content: &str) -> String {
    SUPERSCRIPT_RUN
        .replace_all(content, |caps: &Captures<'_>| {
            let indices: BTreeSet<(usize, String)> = SUPERSCRIPT_INDEX
                .captures_iter(&caps[0])
                .map(|c| numeric_key(&c[1]))
                .collect();
            let joined = indices
                .into_iter()
                .map(|(_, digits)| digits)
                .collect::<Vec<_>>()
                .join(",");
            format!("<sup>{joined}</sup>")
        })
        .into_owned()
}

/// Orders digit strings numerically without parsing, so indices of any width survive.
fn numeric_key(digits: &str) -> (usize, String) {
    let trimmed = digits.trim_start_matches('0');
    let normalized = if trimmed.is_empty() { "0" } else { trimmed };
    (normalized.len(), normalized.to_string())
}

/// Number of superscript tags in `content`.
pub fn count_superscripts(content: &str) -> usize {
    ANY_SUPERSCRIPT.find_iter(content).count()
}
