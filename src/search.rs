use crate::config::Config;
use crate::display::{self, OutputTemplate};
use crate::error::Result;
use crate::index::{IndexPattern, IndexSet};
use crate::query::QuerySpec;
use crate::store::{LogStore, ResultPage, SearchRequest};
use crate::window::TimeWindowResolver;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hits fetched per scroll round trip, independent of `--num`.
pub const SCROLL_BATCH_SIZE: usize = 500;

/// How long the store keeps an idle cursor alive between pages.
pub const SCROLL_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Handle to an open server-side cursor. Never outlives one tail tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollCursor {
    id: String,
    exhausted: bool,
}

impl ScrollCursor {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set once a short page shows the store has nothing more.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Outcome of one scroll call.
#[derive(Debug)]
pub enum ScrollStep {
    /// A non-empty page and the cursor to continue from.
    Page { page: ResultPage, cursor: ScrollCursor },
    /// No more hits; the cursor has been released.
    End,
}

/// Issues bounded searches and drives scroll cursors against a store.
pub struct SearchDispatcher<S> {
    store: S,
    batch_size: usize,
    keep_alive: Duration,
}

impl<S: LogStore> SearchDispatcher<S> {
    pub fn new(store: S) -> Self {
        SearchDispatcher {
            store,
            batch_size: SCROLL_BATCH_SIZE,
            keep_alive: SCROLL_KEEP_ALIVE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// First `page_size` hits, oldest first.
    pub fn search(&self, indices: &IndexSet, spec: &QuerySpec) -> Result<ResultPage> {
        let request = SearchRequest::by_timestamp(spec.build_query(), spec.page_size()).with_offset(0);
        info!(indices = %indices, size = spec.page_size(), "searching");
        let page = self.store.search(indices, &request)?;
        debug!(hits = page.len(), total = ?page.total, "search complete");
        Ok(page)
    }

    /// Opens a cursor when `cursor` is `None`, otherwise advances it.
    ///
    /// Returns [`ScrollStep::End`] once the store has no more hits, after
    /// releasing the cursor. The caller must not reuse a cursor after that.
    /// A failed advance also releases the cursor before the error is returned.
    pub fn scroll(
        &self,
        indices: &IndexSet,
        spec: &QuerySpec,
        cursor: Option<ScrollCursor>,
    ) -> Result<ScrollStep> {
        let page = match cursor {
            None => {
                let request = SearchRequest::by_timestamp(spec.build_query(), self.batch_size);
                info!(indices = %indices, "opening scroll cursor");
                self.store.open_scroll(indices, &request, self.keep_alive)?
            }
            Some(cursor) if cursor.exhausted => {
                self.release(&cursor.id);
                return Ok(ScrollStep::End);
            }
            Some(cursor) => {
                debug!(scroll_id = %cursor.id, "advancing scroll cursor");
                let mut page = match self.store.advance_scroll(&cursor.id, self.keep_alive) {
                    Ok(page) => page,
                    Err(e) => {
                        self.release(&cursor.id);
                        return Err(e);
                    }
                };
                if page.scroll_id.is_none() {
                    page.scroll_id = Some(cursor.id);
                }
                page
            }
        };

        let Some(id) = page.scroll_id.clone() else {
            return Ok(ScrollStep::End);
        };
        if page.is_empty() {
            info!("end of scroll cursor");
            self.release(&id);
            return Ok(ScrollStep::End);
        }

        let exhausted = page.len() < self.batch_size;
        Ok(ScrollStep::Page {
            page,
            cursor: ScrollCursor { id, exhausted },
        })
    }

    /// Releases a cursor the caller will not drain.
    pub fn abandon(&self, cursor: ScrollCursor) {
        debug!(scroll_id = %cursor.id, "abandoning scroll cursor");
        self.release(&cursor.id);
    }

    fn release(&self, scroll_id: &str) {
        if let Err(e) = self.store.clear_scroll(scroll_id) {
            warn!(scroll_id, error = %e, "failed to release scroll cursor");
        }
    }
}

/// One-shot search: resolve the window, query the store, print each event.
///
/// The window and patterns are validated before the store is contacted.
/// Returns the number of events written.
pub fn search<S: LogStore, W: Write>(
    store: S,
    config: &Config,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<usize> {
    let window =
        TimeWindowResolver::new(config.start.as_deref(), config.end.as_deref(), config.duration)
            .resolve(now)?;
    let pattern = IndexPattern::new(&config.index_format)?;
    let template = OutputTemplate::parse(&config.output_format)?;

    let indices = pattern.expand(&window);
    let spec = QuerySpec::new(
        &config.query,
        &config.must,
        &config.must_not,
        config.num,
        window,
    );
    debug!(query = spec.free_text(), must = ?spec.must(), must_not = ?spec.must_not(), "built query");
    debug!(fields = ?template.fields(), "output template");

    let dispatcher = SearchDispatcher::new(store);
    let page = dispatcher.search(&indices, &spec)?;
    let written = display::render_page(&template, &page, out)?;
    out.flush()?;
    Ok(written)
}
