//! Core data structures: works, editions, queries, responses.

mod book;
mod query;
mod response;

pub use book::{Binding, Edition, EditionBuilder, ProviderKind, Work, WorkBuilder};
pub use query::{
    classify, is_isbn_shape, normalize_isbn, QueryKind, SearchParams, SearchRequest,
};
pub use response::{AggregatedResponse, ProviderResult};
