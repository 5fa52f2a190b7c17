use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use stashgrep::config::Config;
use stashgrep::elastic::{ElasticClient, ElasticOptions};
use stashgrep::index::{IndexPattern, IndexSet};
use stashgrep::query::QuerySpec;
use stashgrep::search::{self, ScrollStep, SearchDispatcher};
use stashgrep::store::{LogStore, SearchRequest};
use stashgrep::window::TimeWindow;
use stashgrep::Error;
use std::time::Duration;

fn options() -> ElasticOptions {
    ElasticOptions {
        timeout: Duration::from_secs(5),
        retries: 0,
        backoff: Duration::from_millis(1),
        system_proxy: false,
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).single().unwrap()
}

fn spec(must: &[&str], must_not: &[&str]) -> QuerySpec {
    let window = TimeWindow::starting_at(start(), TimeDelta::minutes(15)).unwrap();
    let must: Vec<String> = must.iter().map(|s| s.to_string()).collect();
    let must_not: Vec<String> = must_not.iter().map(|s| s.to_string()).collect();
    QuerySpec::new("level:ERROR", &must, &must_not, 100, window)
}

fn indices(spec: &QuerySpec) -> IndexSet {
    IndexPattern::default().expand(spec.window())
}

fn hits_body(sources: &[Value], scroll_id: Option<&str>) -> Value {
    let hits: Vec<Value> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| json!({"_index": "logstash-2024.01.01", "_id": i.to_string(), "_source": s}))
        .collect();
    let mut body = json!({
        "took": 1,
        "hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}
    });
    if let Some(id) = scroll_id {
        body["_scroll_id"] = json!(id);
    }
    body
}

#[test]
fn search_posts_bool_query_to_daily_indices() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/logstash-2024.01.01/_search")
            .query_param("ignore_unavailable", "true")
            .query_param("allow_no_indices", "true")
            .json_body_partial(
                r#"{
                    "from": 0,
                    "size": 100,
                    "sort": [{"@timestamp": {"order": "asc"}}],
                    "query": {"bool": {
                        "must": [{"query_string": {"query": "level:ERROR"}}],
                        "must_not": [{"query_string": {"query": "type:cron"}}]
                    }}
                }"#,
            );
        then.status(200)
            .json_body(hits_body(&[json!({"message": "boom"})], None));
    });

    let client = ElasticClient::new(&server.base_url(), options()).unwrap();
    let spec = spec(&["host:web1"], &["type:cron"]);
    let request = SearchRequest::by_timestamp(spec.build_query(), 100).with_offset(0);
    let page = client.search(&indices(&spec), &request).unwrap();

    mock.assert();
    assert_eq!(page.total, Some(1));
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].source, json!({"message": "boom"}));
    assert_eq!(page.hits[0].index, "logstash-2024.01.01");
}

#[test]
fn scroll_lifecycle_opens_advances_and_clears() {
    let server = MockServer::start();
    let batch: Vec<Value> = (0..500).map(|i| json!({"n": i})).collect();

    let open = server.mock(|when, then| {
        when.method(POST)
            .path("/logstash-2024.01.01/_search")
            .query_param("scroll", "60s")
            .json_body_partial(r#"{"size": 500}"#);
        then.status(200).json_body(hits_body(&batch, Some("c1")));
    });
    let advance = server.mock(|when, then| {
        when.method(POST)
            .path("/_search/scroll")
            .json_body(json!({"scroll": "60s", "scroll_id": "c1"}));
        then.status(200).json_body(hits_body(&[], Some("c1")));
    });
    let clear = server.mock(|when, then| {
        when.method(DELETE)
            .path("/_search/scroll")
            .json_body(json!({"scroll_id": ["c1"]}));
        then.status(200).json_body(json!({"succeeded": true, "num_freed": 1}));
    });

    let client = ElasticClient::new(&server.base_url(), options()).unwrap();
    let dispatcher = SearchDispatcher::new(&client);
    let spec = spec(&[], &[]);
    let indices = indices(&spec);

    let first = dispatcher.scroll(&indices, &spec, None).unwrap();
    let ScrollStep::Page { page, cursor } = first else {
        panic!("expected a first page");
    };
    assert_eq!(page.hits.len(), 500);
    assert_eq!(cursor.id(), "c1");

    let second = dispatcher.scroll(&indices, &spec, Some(cursor)).unwrap();
    assert!(matches!(second, ScrollStep::End));

    open.assert();
    advance.assert();
    clear.assert();
}

#[test]
fn rejected_query_reports_store_reason() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/logstash-2024.01.01/_search");
        then.status(400).json_body(json!({
            "error": {
                "root_cause": [{"type": "query_shard_exception", "reason": "Failed to parse query"}],
                "type": "search_phase_execution_exception"
            },
            "status": 400
        }));
    });

    let client = ElasticClient::new(&server.base_url(), options()).unwrap();
    let spec = spec(&[], &[]);
    let request = SearchRequest::by_timestamp(spec.build_query(), 10);
    let err = client.search(&indices(&spec), &request).unwrap_err();

    mock.assert();
    match err {
        Error::StoreQuery(message) => {
            assert!(message.contains("400"));
            assert!(message.contains("query_shard_exception: Failed to parse query"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn server_errors_are_retried_then_reported_unavailable() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/logstash-2024.01.01/_search");
        then.status(503).body("overloaded");
    });

    let client = ElasticClient::new(
        &server.base_url(),
        ElasticOptions {
            retries: 2,
            ..options()
        },
    )
    .unwrap();
    let spec = spec(&[], &[]);
    let request = SearchRequest::by_timestamp(spec.build_query(), 10);
    let err = client.search(&indices(&spec), &request).unwrap_err();

    assert_eq!(mock.hits(), 3);
    assert!(matches!(err, Error::StoreUnavailable(_)));
}

#[test]
fn timed_out_scroll_advance_is_sent_once() {
    let server = MockServer::start();
    let advance = server.mock(|when, then| {
        when.method(POST).path("/_search/scroll");
        then.status(200)
            .delay(Duration::from_millis(800))
            .json_body(hits_body(&[json!({"n": 1})], Some("c1")));
    });

    let client = ElasticClient::new(
        &server.base_url(),
        ElasticOptions {
            timeout: Duration::from_millis(200),
            retries: 2,
            ..options()
        },
    )
    .unwrap();
    let err = client
        .advance_scroll("c1", Duration::from_secs(60))
        .unwrap_err();

    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert_eq!(advance.hits(), 1);
}

#[test]
fn overloaded_scroll_open_is_not_retried() {
    let server = MockServer::start();
    let open = server.mock(|when, then| {
        when.method(POST)
            .path("/logstash-2024.01.01/_search")
            .query_param("scroll", "60s");
        then.status(503).body("overloaded");
    });

    let client = ElasticClient::new(
        &server.base_url(),
        ElasticOptions {
            retries: 2,
            ..options()
        },
    )
    .unwrap();
    let spec = spec(&[], &[]);
    let request = SearchRequest::by_timestamp(spec.build_query(), 500);
    let err = client
        .open_scroll(&indices(&spec), &request, Duration::from_secs(60))
        .unwrap_err();

    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert_eq!(open.hits(), 1);
}

#[test]
fn unreachable_store_is_unavailable() {
    let client = ElasticClient::new("http://127.0.0.1:1", options()).unwrap();
    let spec = spec(&[], &[]);
    let request = SearchRequest::by_timestamp(spec.build_query(), 10);
    let err = client.search(&indices(&spec), &request).unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
}

#[test]
fn one_shot_search_renders_events() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/logstash-2024.01.01/_search");
        then.status(200).json_body(hits_body(
            &[
                json!({"@timestamp": "2024-01-01T10:01:00Z", "host": "web1", "message": "first"}),
                json!("not an object"),
                json!({"@timestamp": "2024-01-01T10:02:00Z", "message": "second"}),
            ],
            None,
        ));
    });

    let config = Config {
        url: server.base_url(),
        start: Some("2024-01-01T10:00".to_string()),
        output_format: "{@timestamp} {host} {message}".to_string(),
        ..Config::default()
    };
    let client = ElasticClient::new(&config.url, options()).unwrap();

    let mut out = Vec::new();
    let written = search::search(&client, &config, Utc::now(), &mut out).unwrap();

    mock.assert();
    assert_eq!(written, 2);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "2024-01-01T10:01:00Z web1 first\n2024-01-01T10:02:00Z {host} second\n"
    );
}
