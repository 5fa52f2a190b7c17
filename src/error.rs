//! Error types shared by every stage of a search or tail.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Errors raised while resolving, dispatching, or rendering a search.
#[derive(Debug, Error)]
pub enum Error {
    /// A `--start` or `--end` value matched none of the accepted formats.
    #[error("unknown date format '{0}'")]
    InvalidTimeFormat(String),

    /// A duration string could not be parsed.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The resolved window is inverted or out of the representable range.
    #[error("invalid time window: {start} .. {end}")]
    InvalidWindow {
        /// Requested start, as given.
        start: String,
        /// Requested end, as given.
        end: String,
    },

    /// A window of the requested width runs past the representable range.
    #[error("time window of {width} {direction} {anchor} is out of range")]
    WindowOutOfRange {
        /// The fixed endpoint.
        anchor: String,
        /// `before` or `after` the anchor.
        direction: &'static str,
        /// The requested width.
        width: String,
    },

    /// The index name pattern contains an unknown strftime specifier.
    #[error("invalid index pattern '{0}'")]
    InvalidIndexPattern(String),

    /// The output template could not be compiled.
    #[error("invalid output template: {0}")]
    InvalidTemplate(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The store could not be reached (connection, timeout, 5xx).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the request or returned an unreadable response.
    #[error("store query error: {0}")]
    StoreQuery(String),

    /// A single hit could not be decoded into an event.
    #[error("malformed event: {0}")]
    Decode(String),

    /// Writing rendered output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::InvalidWindow {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
    }

    pub(crate) fn window_out_of_range(
        anchor: DateTime<Utc>,
        direction: &'static str,
        width: TimeDelta,
    ) -> Self {
        let width = width
            .to_std()
            .map(|d| humantime::format_duration(d).to_string())
            .unwrap_or_else(|_| width.to_string());
        Self::WindowOutOfRange {
            anchor: anchor.to_rfc3339(),
            direction,
            width,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = Error::InvalidTimeFormat("not-a-date".to_string());
        assert_eq!(err.to_string(), "unknown date format 'not-a-date'");

        let err = Error::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "store unavailable: connection refused");

        let err = Error::StoreQuery("parse_exception".to_string());
        assert_eq!(err.to_string(), "store query error: parse_exception");

        let err = Error::InvalidDuration {
            value: "abc".to_string(),
            reason: "expected number".to_string(),
        };
        assert_eq!(err.to_string(), "invalid duration 'abc': expected number");
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
