//! Text canonicalization for duplicate detection and chunking.
//!
//! [`normalize`] runs, in order:
//!
//! 1. HTML entity decoding and markup removal (via an HTML5 fragment parse,
//!    then a second pass for tags that were entity-encoded in the source).
//! 2. Unicode lowercasing.
//! 3. Collapsing every run of characters that are neither letters nor
//!    digits (`[^\p{L}\p{N}]+`) into a single space.
//! 4. Trimming.
//!
//! The output contains only letters, digits and single spaces, so
//! normalizing it again is a no-op.
//!
//! [`clean_markup`] stops after step 1 and only collapses whitespace. It
//! keeps case and punctuation, which the chunk splitter relies on for
//! sentence boundaries.

use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tokens shorter than this (in code points) are ignored by [`token_set`].
pub const MIN_TOKEN_CHARS: usize = 3;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid tag regex"));
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid non-word regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Canonicalize document text for comparison.
///
/// ```rust
/// use archive_core::normalize::normalize;
///
/// let canonical = normalize("<p>Section&nbsp;1 &mdash; ZONING Rules!</p>");
/// assert_eq!(canonical, "section 1 zoning rules");
/// assert_eq!(normalize(&canonical), canonical);
/// ```
pub fn normalize(raw: &str) -> String {
    let text = strip_markup(raw);
    let lowered = text.to_lowercase();
    NON_WORD_RE.replace_all(&lowered, " ").trim().to_string()
}

/// The set of distinct tokens of at least [`MIN_TOKEN_CHARS`] code points
/// in already normalized text.
pub fn token_set(canonical: &str) -> HashSet<String> {
    canonical
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Normalized text with all whitespace removed. Two documents that differ
/// only in line wrapping or spacing share this form.
pub fn compact(canonical: &str) -> String {
    canonical.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Decode entities, strip tags and collapse whitespace, preserving case and
/// punctuation.
pub fn clean_markup(raw: &str) -> String {
    let text = strip_markup(raw);
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn strip_markup(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(raw);
    let decoded: String = fragment.root_element().text().collect();
    if decoded.contains('<') {
        TAG_RE.replace_all(&decoded, "").into_owned()
    } else {
        decoded
    }
}
