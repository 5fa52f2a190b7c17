//! Continuous tailing.
//!
//! Each tick searches `[watermark, tick)` through a fresh scroll cursor,
//! drains the cursor, then moves the watermark to the tick time. Consecutive
//! windows therefore share an edge and never overlap.

use crate::config::Config;
use crate::display::{self, OutputTemplate};
use crate::error::{Error, Result};
use crate::index::IndexPattern;
use crate::query::QuerySpec;
use crate::search::{ScrollStep, SearchDispatcher};
use crate::store::{LogStore, ResultPage};
use crate::window::{TimeWindow, TimeWindowResolver};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Infinite stream of tick times, one every `interval`.
///
/// The first tick fires one interval after creation. A tick that is already
/// late when requested fires immediately and the schedule restarts from it.
pub struct IntervalTicker {
    interval: Duration,
    next: Instant,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        IntervalTicker {
            interval,
            next: Instant::now() + interval,
        }
    }
}

impl Iterator for IntervalTicker {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            self.next = now + self.interval;
        }
        Some(Utc::now())
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub window: TimeWindow,
    pub pages: usize,
    pub hits: usize,
}

/// Drives repeated scroll cycles over contiguous windows.
pub struct TailEngine<S> {
    dispatcher: SearchDispatcher<S>,
    pattern: IndexPattern,
    spec: QuerySpec,
    interval: TimeDelta,
    last_end: Option<DateTime<Utc>>,
}

impl<S: LogStore> TailEngine<S> {
    /// `spec` supplies the text, filters and page size; its window is
    /// replaced on every tick.
    pub fn new(
        dispatcher: SearchDispatcher<S>,
        pattern: IndexPattern,
        spec: QuerySpec,
        interval: TimeDelta,
    ) -> Self {
        TailEngine {
            dispatcher,
            pattern,
            spec,
            interval,
            last_end: None,
        }
    }

    /// End of the last completed window.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.last_end
    }

    /// Window for a tick at `tick`, or `None` if the tick does not move
    /// past the watermark.
    pub fn next_window(&self, tick: DateTime<Utc>) -> Option<TimeWindow> {
        let start = match self.last_end {
            Some(last) => last,
            None => tick.checked_sub_signed(self.interval).unwrap_or(tick),
        };
        if self.last_end.is_some() && tick <= start {
            return None;
        }
        TimeWindow::new(start, tick).ok()
    }

    /// Runs one tick: drain a fresh cursor over the next window, handing each
    /// page to `emit`, then advance the watermark. On error the cursor is
    /// released and the watermark stays put.
    pub fn tick<F>(&mut self, tick: DateTime<Utc>, emit: &mut F) -> Result<Option<TickReport>>
    where
        F: FnMut(&ResultPage) -> Result<()>,
    {
        let Some(window) = self.next_window(tick) else {
            warn!(tick = %tick, watermark = ?self.last_end, "tick did not advance past watermark, skipping");
            return Ok(None);
        };

        let indices = self.pattern.expand(&window);
        let spec = self.spec.with_window(window);
        info!(start = %window.start(), end = %window.end(), indices = %indices, "tail tick");

        let mut report = TickReport {
            window,
            pages: 0,
            hits: 0,
        };
        let mut cursor = None;
        loop {
            match self.dispatcher.scroll(&indices, &spec, cursor.take())? {
                ScrollStep::Page { page, cursor: next } => {
                    report.pages += 1;
                    report.hits += page.len();
                    if let Err(e) = emit(&page) {
                        self.dispatcher.abandon(next);
                        return Err(e);
                    }
                    cursor = Some(next);
                }
                ScrollStep::End => break,
            }
        }

        self.last_end = Some(tick);
        debug!(pages = report.pages, hits = report.hits, "tick drained");
        Ok(Some(report))
    }

    /// Runs one tick per item of `ticks`. Returns when the ticks run out or
    /// on the first error.
    pub fn run<I, F>(&mut self, ticks: I, mut emit: F) -> Result<()>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
        F: FnMut(&ResultPage) -> Result<()>,
    {
        for tick in ticks {
            self.tick(tick, &mut emit)?;
        }
        Ok(())
    }
}

/// Tail command: print every new event as it is indexed.
///
/// `--start`/`--end` are checked but not used; the first window covers the
/// interval before the first tick.
pub fn tail<S, I, W>(store: S, config: &Config, ticks: I, out: &mut W) -> Result<()>
where
    S: LogStore,
    I: IntoIterator<Item = DateTime<Utc>>,
    W: Write,
{
    let resolver =
        TimeWindowResolver::new(config.start.as_deref(), config.end.as_deref(), config.duration);
    resolver.validate()?;
    if config.start.is_some() || config.end.is_some() {
        warn!("--start and --end are ignored when tailing");
    }

    let pattern = IndexPattern::new(&config.index_format)?;
    let template = OutputTemplate::parse(&config.output_format)?;
    let interval = TimeDelta::from_std(config.tail_interval)
        .map_err(|e| Error::Config(format!("--interval out of range: {}", e)))?;

    // Placeholder window; each tick substitutes its own.
    let now = Utc::now();
    let spec = QuerySpec::new(
        &config.query,
        &config.must,
        &config.must_not,
        config.num,
        TimeWindow::new(now, now)?,
    );

    let mut engine = TailEngine::new(SearchDispatcher::new(store), pattern, spec, interval);
    engine.run(ticks, |page| {
        display::render_page(&template, page, out)?;
        out.flush()?;
        Ok(())
    })
}
