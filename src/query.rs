//! Query composition.
//!
//! Free text, must clauses and must-not clauses are passed through to the
//! store's own query-string syntax untouched. This module only decides how
//! they are combined with the timestamp range.

use crate::models::TIMESTAMP_FIELD;
use crate::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Free text that matches every document.
pub const MATCH_ALL: &str = "*";

/// Everything needed to run one search or one tail tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    free_text: String,
    must: Vec<String>,
    must_not: Vec<String>,
    page_size: usize,
    window: TimeWindow,
}

impl QuerySpec {
    /// Normalises the inputs: blank free text becomes [`MATCH_ALL`], blank
    /// clauses are dropped, and clause lists are sorted and de-duplicated.
    pub fn new(
        free_text: &str,
        must: &[String],
        must_not: &[String],
        page_size: usize,
        window: TimeWindow,
    ) -> Self {
        let free_text = match free_text.trim() {
            "" => MATCH_ALL.to_string(),
            text => text.to_string(),
        };
        QuerySpec {
            free_text,
            must: normalize_clauses(must),
            must_not: normalize_clauses(must_not),
            page_size: page_size.max(1),
            window,
        }
    }

    /// Same text and filters over another window.
    pub fn with_window(&self, window: TimeWindow) -> Self {
        QuerySpec {
            window,
            ..self.clone()
        }
    }

    pub fn free_text(&self) -> &str {
        &self.free_text
    }

    pub fn must(&self) -> &[String] {
        &self.must
    }

    pub fn must_not(&self) -> &[String] {
        &self.must_not
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn is_match_all(&self) -> bool {
        self.free_text == MATCH_ALL
    }

    /// Compiles to `text AND @timestamp in window AND must... AND NOT (must_not...)`.
    pub fn build_query(&self) -> Query {
        compose(
            &self.free_text,
            &self.must,
            &self.must_not,
            self.window.start(),
            Some(self.window.end()),
        )
    }
}

fn normalize_clauses(clauses: &[String]) -> Vec<String> {
    let mut out: Vec<String> = clauses
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Builds the boolean query directly from parts. A missing `end` means "now".
pub fn compose(
    free_text: &str,
    must: &[String],
    must_not: &[String],
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Query {
    let end = end.unwrap_or_else(Utc::now);

    let mut bool_query = BoolQuery::default();
    let text = free_text.trim();
    if !text.is_empty() && text != MATCH_ALL {
        bool_query.must.push(Clause::query_string(text));
    }
    bool_query.filter.push(Clause::Range(BTreeMap::from([(
        TIMESTAMP_FIELD.to_string(),
        RangeBounds::epoch_millis(start.timestamp_millis(), end.timestamp_millis()),
    )])));
    bool_query
        .filter
        .extend(must.iter().map(|c| Clause::query_string(c)));
    bool_query
        .must_not
        .extend(must_not.iter().map(|c| Clause::query_string(c)));

    Query::Bool(bool_query)
}

/// Top level of the store's JSON query DSL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Bool(BoolQuery),
}

impl Query {
    pub fn as_bool(&self) -> &BoolQuery {
        match self {
            Query::Bool(b) => b,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Clause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Clause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Clause>,
}

impl BoolQuery {
    /// Bounds of the range filter on `field`, if any.
    pub fn range_for(&self, field: &str) -> Option<&RangeBounds> {
        self.filter.iter().find_map(|clause| match clause {
            Clause::Range(ranges) => ranges.get(field),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    QueryString { query: String },
    Range(BTreeMap<String, RangeBounds>),
}

impl Clause {
    fn query_string(query: &str) -> Self {
        Clause::QueryString {
            query: query.to_string(),
        }
    }
}

/// Half-open `[gte, lt)` range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeBounds {
    pub gte: i64,
    pub lt: i64,
    pub format: &'static str,
}

impl RangeBounds {
    fn epoch_millis(gte: i64, lt: i64) -> Self {
        RangeBounds {
            gte,
            lt,
            format: "epoch_millis",
        }
    }

    pub fn contains(&self, millis: i64) -> bool {
        self.gte <= millis && millis < self.lt
    }
}
