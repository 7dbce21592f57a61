//! Open Library provider: general search and author bibliographies.
//!
//! Open Library's search documents are duck-typed and sparse; everything
//! is normalized into canonical works here so downstream code never sees
//! the raw doc shape.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpClient;
use super::{Provider, ProviderCapabilities, ProviderError};
use crate::models::{EditionBuilder, ProviderKind, SearchRequest, Work, WorkBuilder};

const DEFAULT_API_BASE: &str = "https://openlibrary.org";

/// Maximum subjects carried over per work; OL subject lists can run to
/// hundreds of entries
const MAX_SUBJECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct OpenLibraryProvider {
    client: HttpClient,
    api_base: String,
}

impl OpenLibraryProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            client: HttpClient::new()?,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the adapter at a different base URL (tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn fetch_docs(&self, url: &str) -> Result<Vec<SearchDoc>, ProviderError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.docs)
    }
}

#[async_trait]
impl Provider for OpenLibraryProvider {
    fn id(&self) -> &str {
        "openlibrary"
    }

    fn name(&self) -> &str {
        "Open Library"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH | ProviderCapabilities::AUTHOR_WORKS
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Work>, ProviderError> {
        let limit = request.params.max_results.clamp(1, 100);
        let url = format!(
            "{}/search.json?q={}&limit={}",
            self.api_base,
            urlencoding::encode(&request.query),
            limit
        );

        let docs = self.fetch_docs(&url).await?;
        Ok(docs.into_iter().filter_map(parse_doc).collect())
    }

    async fn get_author_works(&self, author: &str) -> Result<Vec<Work>, ProviderError> {
        if author.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("empty author".to_string()));
        }

        let url = format!(
            "{}/search.json?author={}&limit=100&sort=editions",
            self.api_base,
            urlencoding::encode(author)
        );

        let docs = self.fetch_docs(&url).await?;
        Ok(docs.into_iter().filter_map(parse_doc).collect())
    }
}

fn parse_doc(doc: SearchDoc) -> Option<Work> {
    let title = doc.title?;
    let work_key = doc.key.unwrap_or_else(|| format!("ol:{title}"));

    let mut builder = WorkBuilder::new(work_key.clone(), title, ProviderKind::OpenLibrary)
        .authors(doc.author_name.unwrap_or_default())
        .identifier("olid", work_key.trim_start_matches("/works/").to_string());

    if let Some(isbns) = doc.isbn {
        // Surface one edition per leading ISBN pair; the full list is
        // kept on the identifier map for dedup
        if let Some(first) = isbns.first() {
            builder = builder.identifier("isbn", first.clone());
        }
        let mut edition = EditionBuilder::new();
        for isbn in isbns.iter().take(2) {
            edition = match isbn.len() {
                13 => edition.isbn13(isbn.clone()),
                10 => edition.isbn10(isbn.clone()),
                _ => edition,
            };
        }
        if let Some(year) = doc.first_publish_year {
            edition = edition.published_date(year.to_string());
        }
        if let Some(publisher) = doc.publisher.as_ref().and_then(|p| p.first()) {
            edition = edition.publisher(publisher.clone());
        }
        if let Some(cover) = doc.cover_i {
            edition = edition.cover_url(format!(
                "https://covers.openlibrary.org/b/id/{cover}-M.jpg"
            ));
        }
        builder = builder.edition(edition.build());
    }

    if let Some(subjects) = doc.subject {
        builder = builder.subjects(subjects.into_iter().take(MAX_SUBJECTS));
    }

    Some(builder.build())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    author_name: Option<Vec<String>>,
    first_publish_year: Option<i32>,
    isbn: Option<Vec<String>>,
    publisher: Option<Vec<String>>,
    subject: Option<Vec<String>>,
    cover_i: Option<u64>,
}
