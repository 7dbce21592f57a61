//! Search request model and query-intent classification.
//!
//! Classification drives both routing (which providers to call) and cache
//! key shape, so it must be deterministic. Order matters: identifier
//! shapes win outright, then title-exclusion signals are checked before
//! the author patterns, because descriptive titles ("The Name of the
//! Wind") otherwise look like author names.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Query intent category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Isbn,
    Author,
    Title,
    Mixed,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Isbn => "isbn",
            QueryKind::Author => "author",
            QueryKind::Title => "title",
            QueryKind::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// "First Last" with an optional middle initial, or "Last, First"
static NAME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z][a-z]+ (?:[A-Z]\.? )?[A-Z][a-z]+|[A-Z][a-z]+, [A-Z][a-z]+)$")
        .expect("name shape regex")
});

/// Prolific-author surnames that short-circuit the author check
static KNOWN_AUTHORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(king|sanderson|rowling|tolkien|christie|grisham|patterson|atwood|gaiman|weir|ishiguro|murakami|le guin)\b",
    )
    .expect("known author regex")
});

/// Classify a raw query into isbn / author / title / mixed.
pub fn classify(raw: &str) -> QueryKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return QueryKind::Mixed;
    }

    // Identifier shapes win outright; an ISBN-10 with an X check digit
    // would otherwise trip the embedded-digit title signal below.
    if is_isbn_shape(trimmed) {
        return QueryKind::Isbn;
    }

    // Title-exclusion signals come before the author patterns so
    // descriptive titles never fall through to them. They only apply to
    // queries with alphabetic text, otherwise digit runs that merely
    // look ISBN-ish would all classify as titles.
    if trimmed.chars().any(|c| c.is_alphabetic()) && has_title_signal(trimmed) {
        return QueryKind::Title;
    }

    if is_author_shape(trimmed) {
        return QueryKind::Author;
    }

    QueryKind::Mixed
}

fn has_title_signal(query: &str) -> bool {
    let lower = query.to_lowercase();

    // Leading article
    if lower.starts_with("the ") || lower.starts_with("a ") || lower.starts_with("an ") {
        return true;
    }

    // Subtitle separator
    if lower.contains(':') {
        return true;
    }

    // Digit embedded in otherwise-textual input ("Fahrenheit 451")
    if lower.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }

    // Series/format suffix words
    let last = lower.split_whitespace().last().unwrap_or("");
    matches!(last, "series" | "book" | "novel" | "trilogy")
}

/// ISBN shape: digits only after stripping separators, length 10 or 13,
/// a 13-digit form must carry the 978/979 bookland prefix. A trailing X
/// check digit is allowed on ISBN-10.
pub fn is_isbn_shape(query: &str) -> bool {
    let stripped: String = query
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '.'))
        .collect();

    match stripped.len() {
        10 => {
            stripped[..9].chars().all(|c| c.is_ascii_digit())
                && stripped
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_ascii_digit() || c == 'X' || c == 'x')
        }
        13 => {
            stripped.chars().all(|c| c.is_ascii_digit())
                && (stripped.starts_with("978") || stripped.starts_with("979"))
        }
        _ => false,
    }
}

fn is_author_shape(query: &str) -> bool {
    let tokens: Vec<&str> = query.split_whitespace().collect();

    // Exactly two alphabetic tokens is the common "First Last" case
    if tokens.len() == 2
        && tokens
            .iter()
            .all(|t| t.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-'))
    {
        return true;
    }

    if KNOWN_AUTHORS.is_match(query) && tokens.len() <= 4 {
        return true;
    }

    NAME_SHAPE.is_match(query)
}

/// Normalized ISBN: separators stripped, uppercase check digit
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | ' ' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Request parameters accepted on every search
///
/// This is the fixed allow-list that feeds cache key construction; every
/// field has a stable default so logically identical requests produce
/// identical keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    #[serde(default = "default_search_type")]
    pub search_type: String,

    #[serde(default)]
    pub show_all_editions: bool,
}

fn default_max_results() -> usize {
    20
}

fn default_sort_by() -> String {
    "relevance".to_string()
}

fn default_search_type() -> String {
    "mixed".to_string()
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            sort_by: default_sort_by(),
            search_type: default_search_type(),
            show_all_editions: false,
        }
    }
}

/// A parsed search request, created per call and discarded after response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Raw query text as received
    pub query: String,

    /// Parameter set
    #[serde(default)]
    pub params: SearchParams,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: SearchParams::default(),
        }
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.params.max_results = max;
        self
    }

    pub fn show_all_editions(mut self, show: bool) -> Self {
        self.params.show_all_editions = show;
        self
    }

    /// Classification of the raw query
    pub fn kind(&self) -> QueryKind {
        classify(&self.query)
    }
}
