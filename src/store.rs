//! The narrow capability the search engine needs from a log store.

use crate::error::Result;
use crate::index::IndexSet;
use crate::models::TIMESTAMP_FIELD;
use crate::query::Query;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Body of a search or scroll-open request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: Query,
    pub sort: Vec<BTreeMap<String, SortOrder>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    pub size: usize,
}

impl SearchRequest {
    /// Oldest-first by event time.
    pub fn by_timestamp(query: Query, size: usize) -> Self {
        SearchRequest {
            query,
            sort: vec![BTreeMap::from([(TIMESTAMP_FIELD.to_string(), SortOrder::asc())])],
            from: None,
            size,
        }
    }

    pub fn with_offset(mut self, from: usize) -> Self {
        self.from = Some(from);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortOrder {
    pub order: &'static str,
}

impl SortOrder {
    pub fn asc() -> Self {
        SortOrder { order: "asc" }
    }
}

/// One matched document as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub index: String,
    pub id: String,
    pub source: Value,
}

/// One page of hits. `scroll_id` is set when the page belongs to a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub hits: Vec<Hit>,
    pub total: Option<u64>,
    pub scroll_id: Option<String>,
}

impl ResultPage {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Operations a log store must support.
///
/// Implementations report connection trouble as
/// [`Error::StoreUnavailable`](crate::Error::StoreUnavailable) and rejected
/// requests as [`Error::StoreQuery`](crate::Error::StoreQuery).
pub trait LogStore {
    /// Runs a bounded search.
    fn search(&self, indices: &IndexSet, request: &SearchRequest) -> Result<ResultPage>;

    /// Runs a search that leaves a cursor open for `keep_alive`.
    ///
    /// The returned page carries the cursor id in `scroll_id`.
    fn open_scroll(
        &self,
        indices: &IndexSet,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<ResultPage>;

    /// Fetches the next page of an open cursor. An empty page means the
    /// cursor is exhausted.
    fn advance_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<ResultPage>;

    /// Releases a cursor early.
    fn clear_scroll(&self, scroll_id: &str) -> Result<()>;
}

impl<S: LogStore + ?Sized> LogStore for &S {
    fn search(&self, indices: &IndexSet, request: &SearchRequest) -> Result<ResultPage> {
        (**self).search(indices, request)
    }

    fn open_scroll(
        &self,
        indices: &IndexSet,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<ResultPage> {
        (**self).open_scroll(indices, request, keep_alive)
    }

    fn advance_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<ResultPage> {
        (**self).advance_scroll(scroll_id, keep_alive)
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        (**self).clear_scroll(scroll_id)
    }
}
