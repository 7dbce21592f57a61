//! Canonical book models shared by every provider adapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The upstream provider a record came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    OpenLibrary,
    Isbndb,
    #[serde(untagged)]
    Other(String),
}

impl ProviderKind {
    /// Returns the display name of the provider
    pub fn name(&self) -> &str {
        match self {
            ProviderKind::Google => "Google Books",
            ProviderKind::OpenLibrary => "Open Library",
            ProviderKind::Isbndb => "ISBNdb",
            ProviderKind::Other(s) => s,
        }
    }

    /// Returns the provider identifier (used in registry keys and tags)
    pub fn id(&self) -> &str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenLibrary => "openlibrary",
            ProviderKind::Isbndb => "isbndb",
            ProviderKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Physical binding of an edition, ordered by aggregation preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Hardcover,
    TradePaperback,
    Paperback,
    Ebook,
    Audio,
    #[default]
    Unknown,
}

impl Binding {
    /// Parse a free-form binding/format string from an upstream
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("hardcover") || lower.contains("hardback") {
            Binding::Hardcover
        } else if lower.contains("trade paper") {
            Binding::TradePaperback
        } else if lower.contains("paperback") || lower.contains("softcover") {
            Binding::Paperback
        } else if lower.contains("ebook") || lower.contains("kindle") || lower.contains("epub") {
            Binding::Ebook
        } else if lower.contains("audio") {
            Binding::Audio
        } else {
            Binding::Unknown
        }
    }
}

/// A single published edition of a work
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Edition {
    /// ISBN-10, digits only
    pub isbn10: Option<String>,

    /// ISBN-13, digits only
    pub isbn13: Option<String>,

    /// Publisher name
    pub publisher: Option<String>,

    /// Publication date (ISO or year, as reported upstream)
    pub published_date: Option<String>,

    /// Cover image URL
    pub cover_url: Option<String>,

    /// Page count
    pub page_count: Option<u32>,

    /// Binding/format
    #[serde(default)]
    pub binding: Binding,

    /// Synopsis/description text, when the upstream carries one
    pub synopsis: Option<String>,

    /// Subject headings
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl Edition {
    /// Best available identifier for this edition (ISBN-13 preferred)
    pub fn primary_isbn(&self) -> Option<&str> {
        self.isbn13.as_deref().or(self.isbn10.as_deref())
    }

    /// Publication year, if the date parses
    pub fn published_year(&self) -> Option<i32> {
        self.published_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

/// A work: the abstract book, independent of any one printing
///
/// This is the canonical shape every provider adapter normalizes into,
/// so the aggregator never needs provider-specific branching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    /// Provider-scoped identifier (Google volume id, OL work key, ISBN, ...)
    pub work_id: String,

    /// Work title
    pub title: String,

    /// Author names
    #[serde(default)]
    pub authors: Vec<String>,

    /// External identifier map ("olid" -> "OL123W", "isbn13" -> "978...", ...)
    #[serde(default)]
    pub identifiers: HashMap<String, String>,

    /// Known editions of this work
    #[serde(default)]
    pub editions: Vec<Edition>,

    /// Subject headings at the work level
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Work-level synopsis
    pub synopsis: Option<String>,

    /// Provider the record came from
    pub provider: ProviderKind,
}

impl Work {
    /// Create a new work with required fields
    pub fn new(work_id: String, title: String, provider: ProviderKind) -> Self {
        Self {
            work_id,
            title,
            authors: Vec::new(),
            identifiers: HashMap::new(),
            editions: Vec::new(),
            subjects: Vec::new(),
            synopsis: None,
            provider,
        }
    }

    /// Authors joined for display and comparison
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }

    /// First edition carrying an ISBN, if any
    pub fn any_isbn(&self) -> Option<&str> {
        self.editions.iter().find_map(|e| e.primary_isbn())
    }
}

/// Builder for constructing Work records in adapter code
#[derive(Debug, Clone)]
pub struct WorkBuilder {
    work: Work,
}

impl WorkBuilder {
    pub fn new(
        work_id: impl Into<String>,
        title: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        Self {
            work: Work::new(work_id.into(), title.into(), provider),
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.work.authors.push(author.into());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.work.authors.extend(authors.into_iter().map(Into::into));
        self
    }

    pub fn identifier(mut self, scheme: impl Into<String>, value: impl Into<String>) -> Self {
        self.work.identifiers.insert(scheme.into(), value.into());
        self
    }

    pub fn edition(mut self, edition: Edition) -> Self {
        self.work.editions.push(edition);
        self
    }

    pub fn subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.work
            .subjects
            .extend(subjects.into_iter().map(Into::into));
        self
    }

    pub fn synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.work.synopsis = Some(synopsis.into());
        self
    }

    pub fn build(self) -> Work {
        self.work
    }
}

/// Builder for Edition records
#[derive(Debug, Clone, Default)]
pub struct EditionBuilder {
    edition: Edition,
}

impl EditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isbn10(mut self, isbn: impl Into<String>) -> Self {
        self.edition.isbn10 = Some(isbn.into());
        self
    }

    pub fn isbn13(mut self, isbn: impl Into<String>) -> Self {
        self.edition.isbn13 = Some(isbn.into());
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.edition.publisher = Some(publisher.into());
        self
    }

    pub fn published_date(mut self, date: impl Into<String>) -> Self {
        self.edition.published_date = Some(date.into());
        self
    }

    pub fn cover_url(mut self, url: impl Into<String>) -> Self {
        self.edition.cover_url = Some(url.into());
        self
    }

    pub fn page_count(mut self, pages: u32) -> Self {
        self.edition.page_count = Some(pages);
        self
    }

    pub fn binding(mut self, binding: Binding) -> Self {
        self.edition.binding = binding;
        self
    }

    pub fn synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.edition.synopsis = Some(synopsis.into());
        self
    }

    pub fn subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edition
            .subjects
            .extend(subjects.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Edition {
        self.edition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_builder() {
        let work = WorkBuilder::new("OL123W", "The Martian", ProviderKind::OpenLibrary)
            .author("Andy Weir")
            .identifier("olid", "OL123W")
            .edition(
                EditionBuilder::new()
                    .isbn13("9780553418026")
                    .publisher("Broadway Books")
                    .published_date("2014-02-11")
                    .binding(Binding::Paperback)
                    .build(),
            )
            .build();

        assert_eq!(work.work_id, "OL123W");
        assert_eq!(work.authors, vec!["Andy Weir"]);
        assert_eq!(work.any_isbn(), Some("9780553418026"));
        assert_eq!(work.editions[0].published_year(), Some(2014));
    }

    #[test]
    fn test_edition_defaults_to_unknown_binding() {
        let edition = Edition::default();
        assert_eq!(edition.binding, Binding::Unknown);

        // Wire payloads without a binding field land on the same default
        let parsed: Edition = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.binding, Binding::Unknown);
    }

    #[test]
    fn test_binding_parse() {
        assert_eq!(Binding::parse("Hardcover"), Binding::Hardcover);
        assert_eq!(Binding::parse("Trade Paperback"), Binding::TradePaperback);
        assert_eq!(Binding::parse("Mass Market Paperback"), Binding::Paperback);
        assert_eq!(Binding::parse("Kindle Edition"), Binding::Ebook);
        assert_eq!(Binding::parse("???"), Binding::Unknown);
    }

    #[test]
    fn test_primary_isbn_prefers_isbn13() {
        let edition = EditionBuilder::new()
            .isbn10("0553418025")
            .isbn13("9780553418026")
            .build();
        assert_eq!(edition.primary_isbn(), Some("9780553418026"));
    }

    #[test]
    fn test_provider_kind_ids() {
        assert_eq!(ProviderKind::Google.id(), "google");
        assert_eq!(ProviderKind::OpenLibrary.id(), "openlibrary");
        assert_eq!(ProviderKind::Isbndb.name(), "ISBNdb");
    }
}
