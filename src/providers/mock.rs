//! Configurable mock provider for exercising the pipeline without HTTP.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Provider, ProviderCapabilities, ProviderError};
use crate::models::{Edition, SearchRequest, Work};

type ErrorFactory = Arc<dyn Fn() -> ProviderError + Send + Sync>;

/// Scripted stand-in for a real upstream.
///
/// Counts every call per operation, can fail the next N calls with
/// queued errors, or fail persistently via a factory. Defaults to
/// advertising every capability so tests opt down, not up.
pub struct MockProvider {
    id: String,
    capabilities: ProviderCapabilities,
    search_results: Vec<Work>,
    author_works: Vec<Work>,
    isbn_work: Option<Work>,
    editions: Vec<Edition>,
    scripted_errors: Mutex<VecDeque<ProviderError>>,
    persistent_error: Option<ErrorFactory>,
    search_calls: AtomicUsize,
    author_calls: AtomicUsize,
    isbn_calls: AtomicUsize,
    edition_calls: AtomicUsize,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("persistent_error", &self.persistent_error.is_some())
            .finish()
    }
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: ProviderCapabilities::all(),
            search_results: Vec::new(),
            author_works: Vec::new(),
            isbn_work: None,
            editions: Vec::new(),
            scripted_errors: Mutex::new(VecDeque::new()),
            persistent_error: None,
            search_calls: AtomicUsize::new(0),
            author_calls: AtomicUsize::new(0),
            isbn_calls: AtomicUsize::new(0),
            edition_calls: AtomicUsize::new(0),
        }
    }

    pub fn capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_search_results(mut self, works: Vec<Work>) -> Self {
        self.search_results = works;
        self
    }

    pub fn with_author_works(mut self, works: Vec<Work>) -> Self {
        self.author_works = works;
        self
    }

    pub fn with_isbn_work(mut self, work: Work) -> Self {
        self.isbn_work = Some(work);
        self
    }

    pub fn with_editions(mut self, editions: Vec<Edition>) -> Self {
        self.editions = editions;
        self
    }

    /// Queue an error for the next call; chain to script a sequence.
    /// Queued errors are consumed across all operations in call order.
    pub fn fail_next(self, error: ProviderError) -> Self {
        self.scripted_errors.lock().unwrap().push_back(error);
        self
    }

    /// Fail every call with a freshly built error
    pub fn always_failing<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.persistent_error = Some(Arc::new(factory));
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn author_calls(&self) -> usize {
        self.author_calls.load(Ordering::SeqCst)
    }

    pub fn isbn_calls(&self) -> usize {
        self.isbn_calls.load(Ordering::SeqCst)
    }

    pub fn edition_calls(&self) -> usize {
        self.edition_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls() + self.author_calls() + self.isbn_calls() + self.edition_calls()
    }

    fn next_failure(&self) -> Option<ProviderError> {
        if let Some(err) = self.scripted_errors.lock().unwrap().pop_front() {
            return Some(err);
        }
        self.persistent_error.as_ref().map(|f| f())
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<Work>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(self.search_results.clone())
    }

    async fn get_author_works(&self, _author: &str) -> Result<Vec<Work>, ProviderError> {
        self.author_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(self.author_works.clone())
    }

    async fn get_by_isbn(&self, isbn: &str) -> Result<Work, ProviderError> {
        self.isbn_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.isbn_work
            .clone()
            .ok_or_else(|| ProviderError::NotFound(isbn.to_string()))
    }

    async fn get_editions_for_work(
        &self,
        _title: &str,
        _author: &str,
    ) -> Result<Vec<Edition>, ProviderError> {
        self.edition_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(self.editions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderKind, WorkBuilder};

    fn work(title: &str) -> Work {
        WorkBuilder::new(title, title, ProviderKind::Other("mock".into())).build()
    }

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let provider = MockProvider::new("mock")
            .with_search_results(vec![work("a")])
            .fail_next(ProviderError::Timeout)
            .fail_next(ProviderError::ServerError("503".into()));

        assert!(provider.search(&SearchRequest::new("q")).await.is_err());
        assert!(provider.search(&SearchRequest::new("q")).await.is_err());
        let works = provider.search(&SearchRequest::new("q")).await.unwrap();
        assert_eq!(works.len(), 1);
        assert_eq!(provider.search_calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure() {
        let provider = MockProvider::new("mock").always_failing(|| ProviderError::RateLimit);
        for _ in 0..3 {
            assert!(matches!(
                provider.search(&SearchRequest::new("q")).await,
                Err(ProviderError::RateLimit)
            ));
        }
        assert_eq!(provider.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_isbn_defaults_to_not_found() {
        let provider = MockProvider::new("mock");
        let err = provider.get_by_isbn("9780553418026").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert_eq!(provider.isbn_calls(), 1);
    }
}
