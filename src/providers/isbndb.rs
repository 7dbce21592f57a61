//! ISBNdb provider: ISBN lookup and edition catalogs.
//!
//! ISBNdb is quota-limited on the cheap plans, so this adapter is
//! registered with a tighter breaker threshold and fewer retry attempts
//! than the free upstreams. Requests authenticate with a bare API key in
//! the `Authorization` header.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpClient;
use super::{Provider, ProviderCapabilities, ProviderError};
use crate::models::{Binding, Edition, EditionBuilder, ProviderKind, Work, WorkBuilder};

const DEFAULT_API_BASE: &str = "https://api2.isbndb.com";

#[derive(Debug, Clone)]
pub struct IsbndbProvider {
    client: HttpClient,
    api_base: String,
    api_key: String,
}

impl IsbndbProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: HttpClient::new()?,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Point the adapter at a different base URL (tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Provider for IsbndbProvider {
    fn id(&self) -> &str {
        "isbndb"
    }

    fn name(&self) -> &str {
        "ISBNdb"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::ISBN_LOOKUP | ProviderCapabilities::EDITIONS
    }

    async fn get_by_isbn(&self, isbn: &str) -> Result<Work, ProviderError> {
        if isbn.is_empty() {
            return Err(ProviderError::InvalidRequest("empty isbn".to_string()));
        }

        let url = format!("{}/book/{}", self.api_base, urlencoding::encode(isbn));
        let body: BookResponse = self.get_json(&url).await?;
        parse_book(body.book)
            .ok_or_else(|| ProviderError::Parse(format!("book record missing title for {isbn}")))
    }

    async fn get_editions_for_work(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Vec<Edition>, ProviderError> {
        if title.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("empty title".to_string()));
        }

        let url = format!(
            "{}/books/{}?pageSize=50&column=title",
            self.api_base,
            urlencoding::encode(title)
        );
        let body: BooksResponse = self.get_json(&url).await?;

        let author_lc = author.to_lowercase();
        let editions = body
            .books
            .into_iter()
            .filter(|b| {
                author_lc.is_empty()
                    || b.authors
                        .as_ref()
                        .is_some_and(|a| a.iter().any(|name| name.to_lowercase().contains(&author_lc)))
            })
            .map(parse_edition)
            .collect();
        Ok(editions)
    }
}

fn parse_edition(record: BookRecord) -> Edition {
    let mut edition = EditionBuilder::new();
    if let Some(isbn13) = record.isbn13 {
        edition = edition.isbn13(isbn13);
    }
    if let Some(isbn10) = record.isbn {
        edition = edition.isbn10(isbn10);
    }
    if let Some(publisher) = record.publisher {
        edition = edition.publisher(publisher);
    }
    if let Some(date) = record.date_published {
        edition = edition.published_date(date);
    }
    if let Some(pages) = record.pages {
        edition = edition.page_count(pages);
    }
    if let Some(image) = record.image {
        edition = edition.cover_url(image);
    }
    if let Some(synopsis) = record.synopsis {
        edition = edition.synopsis(synopsis);
    }
    if let Some(subjects) = record.subjects {
        edition = edition.subjects(subjects);
    }
    edition = edition.binding(
        record
            .binding
            .as_deref()
            .map(Binding::parse)
            .unwrap_or(Binding::Unknown),
    );
    edition.build()
}

fn parse_book(record: BookRecord) -> Option<Work> {
    let title = record.title.clone()?;
    let work_id = record
        .isbn13
        .clone()
        .or_else(|| record.isbn.clone())
        .unwrap_or_else(|| title.clone());

    let authors = record.authors.clone().unwrap_or_default();
    let subjects = record.subjects.clone().unwrap_or_default();
    let synopsis = record.synopsis.clone();
    let isbn = record.isbn13.clone().or_else(|| record.isbn.clone());

    let edition = parse_edition(record);

    let mut builder = WorkBuilder::new(work_id, title, ProviderKind::Isbndb)
        .authors(authors)
        .subjects(subjects)
        .edition(edition);
    if let Some(synopsis) = synopsis {
        builder = builder.synopsis(synopsis);
    }
    if let Some(isbn) = isbn {
        builder = builder.identifier("isbn", isbn);
    }
    Some(builder.build())
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    book: BookRecord,
}

#[derive(Debug, Deserialize)]
struct BooksResponse {
    #[serde(default)]
    books: Vec<BookRecord>,
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    title: Option<String>,
    authors: Option<Vec<String>>,
    publisher: Option<String>,
    date_published: Option<String>,
    isbn: Option<String>,
    isbn13: Option<String>,
    binding: Option<String>,
    pages: Option<u32>,
    image: Option<String>,
    synopsis: Option<String>,
    subjects: Option<Vec<String>>,
}
