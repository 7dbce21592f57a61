//! Merging and deduplication of multi-provider result sets.
//!
//! Providers return overlapping catalogs with slightly different titles
//! and author formatting. The aggregator collapses near-duplicates with
//! token-Jaccard similarity over normalized title+author keys, keeps the
//! first-seen record per cluster in provider-priority order, and ranks
//! each cluster's editions with an additive heuristic score so the best
//! edition leads the list.

use std::collections::HashSet;

use chrono::Datelike;

use crate::models::{Binding, Edition, ProviderResult, Work};

/// Fixed priority order for duplicate-cluster ownership. Earlier wins.
const PROVIDER_PRIORITY: [&str; 3] = ["google", "openlibrary", "isbndb"];

/// Publishers that indicate self-published or vanity output
const VANITY_PUBLISHERS: [&str; 6] = [
    "createspace",
    "lulu",
    "xlibris",
    "authorhouse",
    "iuniverse",
    "independently published",
];

/// Title markers for derivative study/companion material
const STUDY_GUIDE_MARKERS: [&str; 6] = [
    "study guide",
    "summary",
    "companion",
    "workbook",
    "sparknotes",
    "analysis of",
];

/// Which shapes are being merged; cross-provider author formatting
/// diverges more, so the duplicate bar is higher there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationContext {
    /// Records from a single upstream (author bibliographies)
    SameShape,
    /// Records from structurally different upstreams (fan-out search)
    CrossProvider,
}

impl AggregationContext {
    /// Similarity at or above this collapses two records into one cluster
    pub fn duplicate_threshold(&self) -> f64 {
        match self {
            AggregationContext::SameShape => 0.85,
            AggregationContext::CrossProvider => 0.90,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultAggregator {
    context: AggregationContext,
    requested_isbn: Option<String>,
}

impl ResultAggregator {
    pub fn new(context: AggregationContext) -> Self {
        Self {
            context,
            requested_isbn: None,
        }
    }

    /// Boost editions matching the identifier the caller asked for
    pub fn with_requested_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.requested_isbn = Some(isbn.into());
        self
    }

    /// Merge successful provider results into a deduplicated item list.
    ///
    /// Failed results are skipped; the caller decides whether zero
    /// successes is an error. Output order follows provider priority,
    /// then arrival order within a provider.
    pub fn aggregate(&self, results: &[ProviderResult]) -> Vec<Work> {
        let mut ordered: Vec<&ProviderResult> = results.iter().filter(|r| r.success).collect();
        ordered.sort_by_key(|r| priority_rank(&r.provider));

        let threshold = self.context.duplicate_threshold();
        let mut accepted: Vec<(String, Work)> = Vec::new();

        for result in ordered {
            for work in &result.works {
                let key = comparison_key(work);
                match accepted
                    .iter_mut()
                    .find(|(existing, _)| is_duplicate(existing, &key, threshold))
                {
                    Some((_, head)) => merge_into(head, work),
                    None => accepted.push((key, work.clone())),
                }
            }
        }

        let mut items: Vec<Work> = accepted.into_iter().map(|(_, w)| w).collect();
        for work in &mut items {
            rank_editions(work, self.requested_isbn.as_deref());
        }
        items
    }
}

/// Order a work's editions best-first by additive score.
///
/// Stable sort keeps first-seen order among ties.
pub fn rank_editions(work: &mut Work, requested_isbn: Option<&str>) {
    let title = work.title.clone();
    work.editions.sort_by_key(|edition| {
        std::cmp::Reverse(score_edition(edition, &title, requested_isbn))
    });
}

pub(crate) fn priority_rank(provider: &str) -> usize {
    PROVIDER_PRIORITY
        .iter()
        .position(|p| *p == provider)
        .unwrap_or(PROVIDER_PRIORITY.len())
}

/// Normalized composite key: title and joined authors, lowercased, with
/// punctuation stripped and whitespace collapsed
pub fn comparison_key(work: &Work) -> String {
    let title = normalize_text(&work.title);
    let authors = normalize_text(&work.author_line());
    if authors.is_empty() {
        title
    } else {
        format!("{title} {authors}")
    }
}

fn normalize_text(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token overlap is the primary signal; Jaro-Winkler catches
/// character-level variants (spelling differences, transpositions) that
/// whole-token sets miss
fn is_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    token_jaccard(a, b) >= threshold || strsim::jaro_winkler(a, b) >= 0.97
}

/// Intersection-over-union of whitespace tokens
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Fold a duplicate record into its cluster head: unseen editions are
/// appended, missing metadata is filled, identifiers and subjects union.
fn merge_into(head: &mut Work, duplicate: &Work) {
    let known_isbns: HashSet<String> = head
        .editions
        .iter()
        .filter_map(|e| e.primary_isbn().map(str::to_string))
        .collect();

    for edition in &duplicate.editions {
        let novel = match edition.primary_isbn() {
            Some(isbn) => !known_isbns.contains(isbn),
            // ISBN-less editions carry no identity to dedup on
            None => true,
        };
        if novel {
            head.editions.push(edition.clone());
        }
    }

    for (scheme, value) in &duplicate.identifiers {
        head.identifiers
            .entry(scheme.clone())
            .or_insert_with(|| value.clone());
    }

    for subject in &duplicate.subjects {
        if !head.subjects.contains(subject) {
            head.subjects.push(subject.clone());
        }
    }

    if head.synopsis.is_none() {
        head.synopsis = duplicate.synopsis.clone();
    }
    if head.authors.is_empty() {
        head.authors = duplicate.authors.clone();
    }
}

/// Additive edition score; higher is a better representative.
pub fn score_edition(edition: &Edition, work_title: &str, requested_isbn: Option<&str>) -> i32 {
    let mut score = 0;

    if let Some(requested) = requested_isbn {
        let requested = strip_isbn_separators(requested);
        let matches = edition
            .primary_isbn()
            .map(strip_isbn_separators)
            .is_some_and(|isbn| isbn == requested)
            || edition
                .isbn10
                .as_deref()
                .map(strip_isbn_separators)
                .is_some_and(|isbn| isbn == requested);
        if matches {
            score += 100;
        }
    }

    let vanity = edition
        .publisher
        .as_deref()
        .map(str::to_lowercase)
        .is_some_and(|p| VANITY_PUBLISHERS.iter().any(|v| p.contains(v)));
    if !vanity {
        score += 20;
    }

    let title_lc = work_title.to_lowercase();
    if !STUDY_GUIDE_MARKERS.iter().any(|m| title_lc.contains(m)) {
        score += 15;
    }

    score += match edition.binding {
        Binding::Hardcover => 10,
        Binding::TradePaperback => 9,
        Binding::Paperback => 8,
        Binding::Ebook | Binding::Audio | Binding::Unknown => 0,
    };

    if let Some(year) = edition.published_year() {
        let current = chrono::Utc::now().year();
        score += match current.saturating_sub(year) {
            age if age <= 2 => 8,
            age if age <= 5 => 7,
            age if age <= 10 => 6,
            _ => 5,
        };
    }

    if edition.synopsis.is_some() {
        score += 3;
    }
    if !edition.subjects.is_empty() {
        score += 3;
    }

    score
}

fn strip_isbn_separators(isbn: &str) -> String {
    isbn.chars().filter(|c| !matches!(c, '-' | ' ')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditionBuilder, ProviderKind, WorkBuilder};

    fn work(provider: ProviderKind, title: &str, author: &str) -> Work {
        WorkBuilder::new(format!("{title}-{}", provider.id()), title, provider)
            .author(author)
            .build()
    }

    #[test]
    fn test_near_duplicates_collapse() {
        let results = vec![
            ProviderResult::ok(
                "google",
                vec![work(ProviderKind::Google, "A Little Life", "Hanya Yanagihara")],
            ),
            ProviderResult::ok(
                "openlibrary",
                vec![work(
                    ProviderKind::OpenLibrary,
                    "a little life.",
                    "Hanya Yanagihara",
                )],
            ),
        ];

        let items = ResultAggregator::new(AggregationContext::CrossProvider).aggregate(&results);
        assert_eq!(items.len(), 1);
        // Cluster head comes from the higher-priority provider
        assert_eq!(items[0].provider, ProviderKind::Google);
    }

    #[test]
    fn test_distinct_titles_survive() {
        let results = vec![ProviderResult::ok(
            "google",
            vec![
                work(ProviderKind::Google, "The Martian", "Andy Weir"),
                work(ProviderKind::Google, "Project Hail Mary", "Andy Weir"),
            ],
        )];

        let items = ResultAggregator::new(AggregationContext::SameShape).aggregate(&results);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_failed_results_skipped() {
        let results = vec![
            ProviderResult::failed("google", "timeout"),
            ProviderResult::ok(
                "openlibrary",
                vec![work(ProviderKind::OpenLibrary, "Dune", "Frank Herbert")],
            ),
        ];

        let items = ResultAggregator::new(AggregationContext::CrossProvider).aggregate(&results);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Dune");
    }

    #[test]
    fn test_merge_unions_editions_and_metadata() {
        let with_edition = WorkBuilder::new("g1", "The Martian", ProviderKind::Google)
            .author("Andy Weir")
            .edition(EditionBuilder::new().isbn13("9780553418026").build())
            .build();
        let with_more = WorkBuilder::new("ol1", "The Martian", ProviderKind::OpenLibrary)
            .author("Andy Weir")
            .identifier("olid", "OL17091839W")
            .edition(EditionBuilder::new().isbn13("9780804139021").build())
            .edition(EditionBuilder::new().isbn13("9780553418026").build())
            .synopsis("Stranded on Mars.")
            .build();

        let results = vec![
            ProviderResult::ok("google", vec![with_edition]),
            ProviderResult::ok("openlibrary", vec![with_more]),
        ];
        let items = ResultAggregator::new(AggregationContext::CrossProvider).aggregate(&results);

        assert_eq!(items.len(), 1);
        let merged = &items[0];
        assert_eq!(merged.editions.len(), 2);
        assert_eq!(
            merged.identifiers.get("olid").map(String::as_str),
            Some("OL17091839W")
        );
        assert_eq!(merged.synopsis.as_deref(), Some("Stranded on Mars."));
    }

    #[test]
    fn test_edition_scoring_prefers_rich_recent_hardcover() {
        let weak = EditionBuilder::new()
            .isbn13("9780000000001")
            .binding(Binding::Paperback)
            .published_date("1999")
            .build();
        let strong = EditionBuilder::new()
            .isbn13("9780000000002")
            .binding(Binding::Hardcover)
            .published_date("2025-01-01")
            .publisher("Crown")
            .synopsis("A synopsis")
            .subjects(["Fiction"])
            .build();

        let title = "The Martian";
        assert!(score_edition(&strong, title, None) > score_edition(&weak, title, None));
    }

    #[test]
    fn test_requested_isbn_dominates() {
        let requested = EditionBuilder::new()
            .isbn13("9780553418026")
            .binding(Binding::Paperback)
            .build();
        let shiny = EditionBuilder::new()
            .isbn13("9780804139021")
            .binding(Binding::Hardcover)
            .published_date("2025")
            .synopsis("s")
            .subjects(["x"])
            .build();

        let title = "The Martian";
        let isbn = Some("978-0-553-41802-6");
        assert!(
            score_edition(&requested, title, isbn) > score_edition(&shiny, title, isbn)
        );
    }

    #[test]
    fn test_study_guide_penalized() {
        let edition = EditionBuilder::new().build();
        let real = score_edition(&edition, "The Martian", None);
        let guide = score_edition(&edition, "Study Guide: The Martian", None);
        assert_eq!(real - guide, 15);
    }

    #[test]
    fn test_representative_edition_leads() {
        let work = WorkBuilder::new("g1", "The Martian", ProviderKind::Google)
            .edition(
                EditionBuilder::new()
                    .isbn13("9780000000001")
                    .binding(Binding::Paperback)
                    .build(),
            )
            .edition(
                EditionBuilder::new()
                    .isbn13("9780000000002")
                    .binding(Binding::Hardcover)
                    .synopsis("s")
                    .build(),
            )
            .build();

        let items = ResultAggregator::new(AggregationContext::SameShape)
            .aggregate(&[ProviderResult::ok("google", vec![work])]);
        assert_eq!(items[0].editions[0].isbn13.as_deref(), Some("9780000000002"));
    }

    #[test]
    fn test_token_jaccard() {
        assert_eq!(token_jaccard("a little life", "a little life"), 1.0);
        assert!(token_jaccard("a little life", "a little life extra") > 0.7);
        assert!(token_jaccard("the martian", "project hail mary") < 0.1);
    }
}
