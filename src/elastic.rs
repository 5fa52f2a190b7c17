//! HTTP client for an Elasticsearch-compatible store.

use crate::error::{Error, Result};
use crate::index::IndexSet;
use crate::store::{Hit, LogStore, ResultPage, SearchRequest};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Query parameters sent with every index search.
const SEARCH_PARAMS: [(&str, &str); 2] = [
    ("ignore_unavailable", "true"),
    ("allow_no_indices", "true"),
];

/// Connection settings for [`ElasticClient`].
#[derive(Debug, Clone)]
pub struct ElasticOptions {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` from the environment.
    pub system_proxy: bool,
}

impl Default for ElasticOptions {
    fn default() -> Self {
        ElasticOptions {
            timeout: Duration::from_secs(30),
            retries: 2,
            backoff: Duration::from_millis(250),
            system_proxy: true,
        }
    }
}

/// Which failures a request may be resent after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Idempotent: any transport failure, 429 or 5xx.
    Transient,
    /// Moves server-side cursor state: only failures to connect, where the
    /// request never reached the store.
    ConnectOnly,
}

pub struct ElasticClient {
    base_url: String,
    http: Client,
    options: ElasticOptions,
}

impl ElasticClient {
    /// Builds a client. No connection is made until the first request.
    pub fn new(base_url: &str, options: ElasticOptions) -> Result<Self> {
        let mut builder = Client::builder().timeout(options.timeout);
        if !options.system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        info!(url = base_url, "created store client");
        Ok(ElasticClient {
            base_url: trim_trailing_slash(base_url),
            http,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends a request, retrying the failures `retry` allows with
    /// exponential backoff.
    fn send<R, F>(&self, what: &str, retry: Retry, build: F) -> Result<R>
    where
        R: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut delay = self.options.backoff;
        let mut attempt = 0;
        loop {
            let (outcome, retryable) = match build().send() {
                Ok(response) => (classify(response), retry == Retry::Transient),
                Err(e) => (
                    Err(Error::StoreUnavailable(transport_message(&e))),
                    retry == Retry::Transient || e.is_connect(),
                ),
            };

            match outcome {
                Err(Error::StoreUnavailable(reason))
                    if retryable && attempt < self.options.retries =>
                {
                    attempt += 1;
                    warn!(
                        request = what,
                        attempt,
                        retries = self.options.retries,
                        error = %reason,
                        "store request failed, retrying"
                    );
                    thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
                Ok(response) => {
                    debug!(request = what, status = %response.status(), "store responded");
                    return response
                        .json::<R>()
                        .map_err(|e| Error::StoreQuery(format!("malformed {} response: {}", what, e)));
                }
            }
        }
    }
}

fn trim_trailing_slash(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

fn classify(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let reason = error_reason(&body).unwrap_or_else(|| body.trim().to_string());
    let message = if reason.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, reason)
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(Error::StoreUnavailable(message))
    } else {
        Err(Error::StoreQuery(message))
    }
}

/// Pulls the most specific reason out of an error body.
fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(s) = error.as_str() {
        return Some(s.to_string());
    }
    let root = error
        .get("root_cause")
        .and_then(|c| c.get(0))
        .unwrap_or(error);
    let kind = root.get("type").and_then(Value::as_str);
    let reason = root.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(k), Some(r)) => Some(format!("{}: {}", k, r)),
        (None, Some(r)) => Some(r.to_string()),
        (Some(k), None) => Some(k.to_string()),
        (None, None) => None,
    }
}

fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}s", keep_alive.as_secs().max(1))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl From<SearchResponse> for ResultPage {
    fn from(response: SearchResponse) -> Self {
        ResultPage {
            hits: response
                .hits
                .hits
                .into_iter()
                .map(|h| Hit {
                    index: h.index,
                    id: h.id,
                    source: h.source,
                })
                .collect(),
            total: response.hits.total.map(|t| match t {
                TotalHits::Count(n) | TotalHits::Object { value: n } => n,
            }),
            scroll_id: response.scroll_id,
        }
    }
}

#[derive(Serialize)]
struct ScrollBody<'a> {
    scroll: String,
    scroll_id: &'a str,
}

#[derive(Serialize)]
struct ClearScrollBody<'a> {
    scroll_id: [&'a str; 1],
}

#[derive(Deserialize)]
struct ClearScrollResponse {
    #[serde(default)]
    num_freed: u64,
}

impl LogStore for ElasticClient {
    fn search(&self, indices: &IndexSet, request: &SearchRequest) -> Result<ResultPage> {
        let url = self.url(&format!("{}/_search", indices.selector()));
        debug!(%url, size = request.size, "search");
        let response: SearchResponse = self.send("search", Retry::Transient, || {
            self.http.post(&url).query(&SEARCH_PARAMS).json(request)
        })?;
        Ok(response.into())
    }

    fn open_scroll(
        &self,
        indices: &IndexSet,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<ResultPage> {
        let url = self.url(&format!("{}/_search", indices.selector()));
        let scroll = keep_alive_param(keep_alive);
        debug!(%url, size = request.size, %scroll, "open scroll");
        let response: SearchResponse = self.send("open scroll", Retry::ConnectOnly, || {
            self.http
                .post(&url)
                .query(&SEARCH_PARAMS)
                .query(&[("scroll", scroll.as_str())])
                .json(request)
        })?;
        if response.scroll_id.is_none() {
            return Err(Error::StoreQuery("scroll response carried no scroll id".to_string()));
        }
        Ok(response.into())
    }

    fn advance_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<ResultPage> {
        let url = self.url("_search/scroll");
        let body = ScrollBody {
            scroll: keep_alive_param(keep_alive),
            scroll_id,
        };
        let response: SearchResponse =
            self.send("scroll", Retry::ConnectOnly, || self.http.post(&url).json(&body))?;
        Ok(response.into())
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let url = self.url("_search/scroll");
        let body = ClearScrollBody {
            scroll_id: [scroll_id],
        };
        let response: ClearScrollResponse = self.send("clear scroll", Retry::Transient, || {
            self.http.delete(&url).json(&body)
        })?;
        debug!(freed = response.num_freed, "cleared scroll");
        Ok(())
    }
}
