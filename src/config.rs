use crate::display::OutputTemplate;
use crate::error::{Error, Result};
use crate::index::IndexPattern;
use crate::query::MATCH_ALL;
use crate::window::TimeWindowResolver;
use chrono::TimeDelta;
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://127.0.0.1:9200";
pub const DEFAULT_NUM_RESULTS: usize = 100;
pub const DEFAULT_DURATION: &str = "15m";
pub const DEFAULT_INDEX_FORMAT: &str = "logstash-%Y.%m.%d";
pub const DEFAULT_OUTPUT_FORMAT: &str = "{@timestamp} {host} {type} {level}: {message}";
pub const DEFAULT_TAIL_INTERVAL: &str = "10s";
pub const DEFAULT_TIMEOUT: &str = "30s";
pub const DEFAULT_RETRIES: u32 = 2;

/// How much diagnostic output to write to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        match (verbose, debug) {
            (_, true) => Verbosity::Debug,
            (true, false) => Verbosity::Verbose,
            (false, false) => Verbosity::Quiet,
        }
    }

    /// `tracing` filter directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "trace",
        }
    }
}

/// Everything a run needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub query: String,
    pub must: Vec<String>,
    pub must_not: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: TimeDelta,
    pub tail: bool,
    pub num: usize,
    pub index_format: String,
    pub output_format: String,
    pub tail_interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: DEFAULT_URL.to_string(),
            query: MATCH_ALL.to_string(),
            must: Vec::new(),
            must_not: Vec::new(),
            start: None,
            end: None,
            duration: TimeDelta::minutes(15),
            tail: false,
            num: DEFAULT_NUM_RESULTS,
            index_format: DEFAULT_INDEX_FORMAT.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            tail_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            retries: DEFAULT_RETRIES,
            verbosity: Verbosity::Quiet,
        }
    }
}

impl Config {
    /// Checks every user-supplied value that can be checked without the store.
    pub fn validate(&self) -> Result<()> {
        if self.num == 0 {
            return Err(Error::Config("--num must be at least 1".to_string()));
        }
        if self.tail_interval.is_zero() {
            return Err(Error::Config("--interval must be greater than zero".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("--timeout must be greater than zero".to_string()));
        }
        reqwest::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid --url '{}': {}", self.url, e)))?;

        TimeWindowResolver::new(self.start.as_deref(), self.end.as_deref(), self.duration)
            .validate()?;
        IndexPattern::new(&self.index_format)?;
        OutputTemplate::parse(&self.output_format)?;
        Ok(())
    }
}
