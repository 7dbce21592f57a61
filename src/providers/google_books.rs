//! Google Books provider: general volume search.
//!
//! Normalizes `volumeInfo` records into canonical works at this boundary.
//! The adapter itself performs no retries; the orchestrator wraps every
//! call in the provider's retry policy and circuit breaker.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpClient;
use super::{Provider, ProviderCapabilities, ProviderError};
use crate::models::{Binding, EditionBuilder, ProviderKind, SearchRequest, Work, WorkBuilder};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/books/v1";

/// Google Books volumes API
#[derive(Debug, Clone)]
pub struct GoogleBooksProvider {
    client: HttpClient,
    api_base: String,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    pub fn new(api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: HttpClient::new()?,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key,
        })
    }

    /// Point the adapter at a different base URL (tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[async_trait]
impl Provider for GoogleBooksProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn name(&self) -> &str {
        "Google Books"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Work>, ProviderError> {
        let max_results = request.params.max_results.clamp(1, 40);
        let mut url = format!(
            "{}/volumes?q={}&maxResults={}",
            self.api_base,
            urlencoding::encode(&request.query),
            max_results
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&key={}", urlencoding::encode(key)));
        }

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let body: VolumesResponse = response.json().await?;

        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_volume)
            .collect())
    }
}

fn parse_volume(item: VolumeItem) -> Option<Work> {
    let info = item.volume_info?;
    let title = info.title?;

    let mut edition = EditionBuilder::new();
    let mut best_isbn = None;
    for ident in info.industry_identifiers.unwrap_or_default() {
        match ident.id_type.as_str() {
            "ISBN_10" => {
                best_isbn.get_or_insert_with(|| ident.identifier.clone());
                edition = edition.isbn10(ident.identifier);
            }
            "ISBN_13" => {
                best_isbn = Some(ident.identifier.clone());
                edition = edition.isbn13(ident.identifier);
            }
            _ => {}
        }
    }
    if let Some(publisher) = info.publisher {
        edition = edition.publisher(publisher);
    }
    if let Some(date) = info.published_date {
        edition = edition.published_date(date);
    }
    if let Some(pages) = info.page_count {
        edition = edition.page_count(pages);
    }
    if let Some(links) = info.image_links {
        if let Some(thumb) = links.thumbnail {
            edition = edition.cover_url(thumb);
        }
    }
    if let Some(desc) = &info.description {
        edition = edition.synopsis(desc.clone());
    }
    edition = edition.binding(Binding::Unknown);

    let mut builder = WorkBuilder::new(item.id, title, ProviderKind::Google)
        .authors(info.authors.unwrap_or_default())
        .edition(edition.build());

    if let Some(categories) = info.categories {
        builder = builder.subjects(categories);
    }
    if let Some(desc) = info.description {
        builder = builder.synopsis(desc);
    }
    if let Some(isbn) = best_isbn {
        builder = builder.identifier("isbn", isbn);
    }

    Some(builder.build())
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[allow(dead_code)]
    #[serde(rename = "totalItems")]
    total_items: Option<u64>,
    items: Option<Vec<VolumeItem>>,
}

#[derive(Debug, Deserialize)]
struct VolumeItem {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "industryIdentifiers")]
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
    #[serde(rename = "pageCount")]
    page_count: Option<u32>,
    categories: Option<Vec<String>>,
    #[serde(rename = "imageLinks")]
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    id_type: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}
