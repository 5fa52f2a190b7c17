use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use stashgrep::config::{self, Config, Verbosity};
use stashgrep::elastic::{ElasticClient, ElasticOptions};
use stashgrep::tail::IntervalTicker;
use stashgrep::{search, tail, window};

#[derive(Parser)]
#[command(
    name = "stashgrep",
    about = "Search for logs in a Logstash Elasticsearch index",
    version
)]
struct Cli {
    /// Query string; multiple words are joined with spaces
    query: Vec<String>,

    /// Server URL
    #[arg(long, short = 'u', env = "STASHGREP_URL", default_value = config::DEFAULT_URL)]
    url: String,

    /// Must match (repeatable)
    #[arg(long, short = 'm')]
    must: Vec<String>,

    /// Must not match (repeatable)
    #[arg(long = "must-not", short = 'x')]
    must_not: Vec<String>,

    /// Oldest timestamp to match
    #[arg(long)]
    start: Option<String>,

    /// Newest timestamp to match
    #[arg(long)]
    end: Option<String>,

    /// Width of timestamp window (e.g. 15m, 2h, 2d); sign is ignored
    #[arg(
        long,
        short = 'd',
        default_value = config::DEFAULT_DURATION,
        value_parser = parse_delta,
        allow_hyphen_values = true
    )]
    duration: TimeDelta,

    /// Tail event stream
    #[arg(long, short = 't')]
    tail: bool,

    /// Number of results to fetch
    #[arg(long, short = 'n', default_value_t = config::DEFAULT_NUM_RESULTS)]
    num: usize,

    /// Index name format (strftime)
    #[arg(long, env = "STASHGREP_INDEX_FORMAT", default_value = config::DEFAULT_INDEX_FORMAT)]
    index_format: String,

    /// Output format; {field} tokens are replaced from each event
    #[arg(long, short = 'o', env = "STASHGREP_OUTPUT", default_value = config::DEFAULT_OUTPUT_FORMAT)]
    output_format: String,

    /// Poll interval when tailing
    #[arg(long, default_value = config::DEFAULT_TAIL_INTERVAL, value_parser = parse_std_duration)]
    interval: Duration,

    /// Per-request timeout
    #[arg(long, default_value = config::DEFAULT_TIMEOUT, value_parser = parse_std_duration)]
    timeout: Duration,

    /// Retries for unreachable or overloaded store before giving up
    #[arg(long, default_value_t = config::DEFAULT_RETRIES)]
    retries: u32,

    /// Enable verbose mode
    #[arg(long)]
    verbose: bool,

    /// Enable debug mode
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            url: self.url,
            query: self.query.join(" "),
            must: self.must,
            must_not: self.must_not,
            start: self.start,
            end: self.end,
            duration: self.duration,
            tail: self.tail,
            num: self.num,
            index_format: self.index_format,
            output_format: self.output_format,
            tail_interval: self.interval,
            timeout: self.timeout,
            retries: self.retries,
            verbosity: Verbosity::from_flags(self.verbose, self.debug),
        }
    }
}

fn parse_delta(s: &str) -> std::result::Result<TimeDelta, String> {
    window::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_std_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid duration '{}': {}", s, e))
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Help and version output is not a failure.
fn is_informational(e: &clap::Error) -> bool {
    matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// Clap's rendering without its own `error:` tag.
fn usage_message(e: &clap::Error) -> String {
    e.to_string().trim_start_matches("error:").trim().to_string()
}

fn fatal(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{} {}", "FATAL:".red().bold(), message);
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if is_informational(&e) => e.exit(),
        Err(e) => return fatal(usage_message(&e)),
    };
    let config = cli.into_config();
    init_tracing(config.verbosity);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fatal(format!("{:#}", e)),
    }
}

fn run(config: &Config) -> Result<()> {
    config.validate()?;

    let store = ElasticClient::new(
        &config.url,
        ElasticOptions {
            timeout: config.timeout,
            retries: config.retries,
            ..ElasticOptions::default()
        },
    )?;
    let mut stdout = io::stdout().lock();

    if config.tail {
        let ticks = IntervalTicker::new(config.tail_interval);
        tail::tail(&store, config, ticks, &mut stdout)
            .with_context(|| format!("tail of {} failed", store.base_url()))?;
    } else {
        search::search(&store, config, Utc::now(), &mut stdout)
            .with_context(|| format!("search of {} failed", store.base_url()))?;
    }

    Ok(())
}
