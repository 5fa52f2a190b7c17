//! Daily index name expansion.

use crate::error::{Error, Result};
use crate::window::TimeWindow;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// A strftime pattern naming one index per calendar day, e.g. `logstash-%Y.%m.%d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPattern {
    pattern: String,
}

impl IndexPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty()
            || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
        {
            return Err(Error::InvalidIndexPattern(pattern.to_string()));
        }
        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    /// Index name for a single day.
    pub fn name_for(&self, day: NaiveDate) -> String {
        day.and_time(NaiveTime::MIN)
            .and_utc()
            .format(&self.pattern)
            .to_string()
    }

    /// Every index touched by the window, oldest first.
    ///
    /// The window is half-open, so an `end` that falls exactly on midnight
    /// does not pull in the day it starts. A zero-width window still maps
    /// to the index of the day it sits on.
    pub fn expand(&self, window: &TimeWindow) -> IndexSet {
        let first = window.start().date_naive();
        let mut last = window.end().date_naive();
        if !window.is_empty() && window.end().time() == NaiveTime::MIN {
            last = last.pred_opt().unwrap_or(last);
        }

        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut day = first;
        while day <= last {
            let name = self.name_for(day);
            // Patterns coarser than a day (e.g. monthly) repeat names.
            if seen.insert(name.clone()) {
                names.push(name);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        debug!(count = names.len(), first = %first, last = %last, "expanded index names");
        IndexSet { names }
    }
}

impl Default for IndexPattern {
    fn default() -> Self {
        Self {
            pattern: crate::config::DEFAULT_INDEX_FORMAT.to_string(),
        }
    }
}

/// Ordered, duplicate-free list of index names for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    names: Vec<String>,
}

impl IndexSet {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Comma-separated multi-index selector as used in request paths.
    pub fn selector(&self) -> String {
        self.names.join(",")
    }
}

impl fmt::Display for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use proptest::prelude::*;
    use test_case::test_case;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    #[test]
    fn default_pattern_is_logstash_daily() {
        let pattern = IndexPattern::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(pattern.name_for(day), "logstash-2024.01.05");
    }

    #[test_case("" ; "empty")]
    #[test_case("logs-%Q" ; "unknown specifier")]
    fn rejects_bad_patterns(pattern: &str) {
        assert!(matches!(
            IndexPattern::new(pattern),
            Err(Error::InvalidIndexPattern(_))
        ));
    }

    #[test]
    fn same_day_window_yields_one_index() {
        let pattern = IndexPattern::default();
        let set = pattern.expand(&window(utc(2024, 1, 1, 3, 0), utc(2024, 1, 1, 22, 30)));
        assert_eq!(set.names(), ["logstash-2024.01.01"]);
    }

    #[test]
    fn zero_width_window_yields_one_index() {
        let pattern = IndexPattern::default();
        let at = utc(2024, 1, 1, 0, 0);
        let set = pattern.expand(&window(at, at));
        assert_eq!(set.names(), ["logstash-2024.01.01"]);
    }

    #[test]
    fn two_day_window_from_midnight_excludes_end_day() {
        let pattern = IndexPattern::new("logstash-%Y.%m.%d").unwrap();
        let set = pattern.expand(&window(utc(2024, 1, 1, 0, 0), utc(2024, 1, 3, 0, 0)));
        assert_eq!(set.names(), ["logstash-2024.01.01", "logstash-2024.01.02"]);
        assert_eq!(set.selector(), "logstash-2024.01.01,logstash-2024.01.02");
    }

    #[test]
    fn crosses_month_and_year_boundaries() {
        let pattern = IndexPattern::default();
        let set = pattern.expand(&window(utc(2023, 12, 31, 23, 0), utc(2024, 1, 1, 1, 0)));
        assert_eq!(set.names(), ["logstash-2023.12.31", "logstash-2024.01.01"]);
    }

    #[test]
    fn coarse_patterns_are_deduplicated() {
        let pattern = IndexPattern::new("app-%Y.%m").unwrap();
        let set = pattern.expand(&window(utc(2024, 1, 30, 0, 0), utc(2024, 2, 2, 12, 0)));
        assert_eq!(set.names(), ["app-2024.01", "app-2024.02"]);
    }

    #[test]
    fn weekday_pattern_names_each_day_once() {
        let pattern = IndexPattern::new("app-%a").unwrap();
        let set = pattern.expand(&window(utc(2024, 1, 1, 0, 0), utc(2024, 1, 31, 0, 0)));
        assert_eq!(set.len(), 7);
        assert_eq!(set.names()[0], "app-Mon");
    }

    #[test]
    fn two_century_window_expands_quickly() {
        let started = std::time::Instant::now();
        let set = IndexPattern::default().expand(&window(utc(1900, 1, 1, 0, 0), utc(2100, 1, 1, 0, 0)));

        assert_eq!(set.len(), 73_049);
        assert_eq!(set.names()[0], "logstash-1900.01.01");
        assert_eq!(set.names()[set.len() - 1], "logstash-2099.12.31");
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    proptest! {
        #[test]
        fn spanning_n_boundaries_yields_n_plus_one_increasing_names(
            start_secs in 0i64..3_000_000_000,
            offset_secs in 1i64..86_399,
            extra_days in 0i64..60,
        ) {
            let start = Utc.timestamp_opt(start_secs, 0).single().unwrap();
            let end = start + TimeDelta::days(extra_days) + TimeDelta::seconds(offset_secs);
            prop_assume!(end.time() != NaiveTime::MIN);

            let boundaries = (end.date_naive() - start.date_naive()).num_days();
            let set = IndexPattern::default().expand(&window(start, end));

            prop_assert_eq!(set.len() as i64, boundaries + 1);
            prop_assert!(set.names().windows(2).all(|w| w[0] < w[1]));
        }
    }
}
