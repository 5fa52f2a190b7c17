//! # stashgrep
//!
//! Search and tail Logstash-style daily indices in Elasticsearch.
//!
//! A search resolves a time window, expands it into one index name per day,
//! compiles the query text and filters into a boolean query bounded by
//! `@timestamp`, and prints each hit through an output template. Tailing
//! repeats this every few seconds over back-to-back windows using a scroll
//! cursor per window.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stashgrep::{config::Config, elastic::{ElasticClient, ElasticOptions}, search};
//!
//! let cfg = Config {
//!     query: "level:ERROR".to_string(),
//!     must: vec!["host:web1".to_string()],
//!     ..Config::default()
//! };
//! let store = ElasticClient::new(&cfg.url, ElasticOptions::default()).unwrap();
//!
//! let mut out = std::io::stdout().lock();
//! search::search(&store, &cfg, chrono::Utc::now(), &mut out).unwrap();
//! ```

pub mod config;
pub mod display;
pub mod elastic;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod search;
pub mod store;
pub mod tail;
pub mod window;

pub use error::{Error, Result};
