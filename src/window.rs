//! Time window resolution.
//!
//! A search covers a half-open `[start, end)` interval in UTC. Users may give
//! either endpoint, both, or neither; the missing side is derived from the
//! duration.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use tracing::debug;

/// Offset-aware layout accepted in addition to RFC 3339.
const OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Zone-less layouts, most precise first. Values are taken as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A resolved `[start, end)` search interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Builds a window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::invalid_window(start, end));
        }
        Ok(Self { start, end })
    }

    /// Window of the given width ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, width: TimeDelta) -> Result<Self> {
        let width = magnitude(width);
        let start = end
            .checked_sub_signed(width)
            .ok_or_else(|| Error::window_out_of_range(end, "before", width))?;
        Self::new(start, end)
    }

    /// Window of the given width starting at `start`.
    pub fn starting_at(start: DateTime<Utc>, width: TimeDelta) -> Result<Self> {
        let width = magnitude(width);
        let end = start
            .checked_add_signed(width)
            .ok_or_else(|| Error::window_out_of_range(start, "after", width))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn width(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Whether `t` falls inside the half-open interval.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Turns optional user-supplied endpoints and a duration into a [`TimeWindow`].
#[derive(Debug, Clone)]
pub struct TimeWindowResolver {
    start: Option<String>,
    end: Option<String>,
    duration: TimeDelta,
}

impl TimeWindowResolver {
    /// Empty endpoint strings are treated as absent.
    pub fn new(start: Option<&str>, end: Option<&str>, duration: TimeDelta) -> Self {
        let present = |v: Option<&str>| v.filter(|s| !s.trim().is_empty()).map(str::to_string);
        Self {
            start: present(start),
            end: present(end),
            duration: magnitude(duration),
        }
    }

    /// Parses the supplied endpoints without resolving a window.
    pub fn validate(&self) -> Result<()> {
        self.parsed_endpoints().map(|_| ())
    }

    fn parsed_endpoints(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let start = self.start.as_deref().map(parse_time).transpose()?;
        let end = self.end.as_deref().map(parse_time).transpose()?;
        Ok((start, end))
    }

    /// Resolves the window, using `now` when neither endpoint was given.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<TimeWindow> {
        debug!(duration = %self.duration, "resolving time window");
        let window = match self.parsed_endpoints()? {
            (Some(start), Some(end)) => TimeWindow::new(start, end)?,
            (Some(start), None) => TimeWindow::starting_at(start, self.duration)?,
            (None, Some(end)) => TimeWindow::ending_at(end, self.duration)?,
            (None, None) => TimeWindow::ending_at(now, self.duration)?,
        };
        debug!(start = %window.start, end = %window.end, "resolved time window");
        Ok(window)
    }
}

fn magnitude(d: TimeDelta) -> TimeDelta {
    if d < TimeDelta::zero() {
        -d
    } else {
        d
    }
}

/// Parses a timestamp in one of the accepted layouts, normalised to UTC.
///
/// Layouts are tried in order: RFC 3339, `YYYY-MM-DDTHH:MM:SS±HHMM`,
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DDTHH:MM`, `YYYY-MM-DD`. Zone-less
/// values are read as UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    debug!(value, format = OFFSET_FORMAT, "parsing timestamp");
    if let Ok(t) = DateTime::parse_from_str(value, OFFSET_FORMAT) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        debug!(value, format, "parsing timestamp");
        if let Ok(t) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(t.and_utc());
        }
    }
    debug!(value, format = DATE_FORMAT, "parsing timestamp");
    if let Ok(d) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }

    Err(Error::InvalidTimeFormat(value.to_string()))
}

/// Parses a human duration such as `15m`, `2d` or `-1h 30m`.
///
/// A leading sign is accepted and kept; callers that only care about the
/// width take the magnitude.
pub fn parse_duration(value: &str) -> Result<TimeDelta> {
    let trimmed = value.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let std = humantime::parse_duration(body.trim()).map_err(|e| Error::InvalidDuration {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    let delta = TimeDelta::from_std(std).map_err(|e| Error::InvalidDuration {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    Ok(if negative { -delta } else { delta })
}
