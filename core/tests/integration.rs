//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then sends requests through a
//! `Network` using the bundled ureq transport. Covers the wire mapping of
//! requests, retry on real timeouts, and how error statuses and unparseable
//! bodies surface as outcomes.

use std::sync::Arc;
use std::time::Duration;

use netcall_core::{
    Broadcaster, HttpMethod, Network, NetworkConfig, NetworkError, Outcome, Request,
    TransportErrorKind, REQUEST_SUCCESS_EVENT,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn network() -> Network {
    Network::builder()
        .broadcaster(Arc::new(Broadcaster::new()))
        .build()
}

#[derive(Debug, Deserialize)]
struct HitCount {
    hits: u32,
}

#[test]
fn flaky_endpoint_is_retried_until_it_answers() {
    let base = start_server();
    let net = network();

    let request = Request::get(format!("{base}/flaky/retry-ok"))
        .param("failures", 2)
        .param("delay_ms", 2000)
        .timeout(Duration::from_millis(300))
        .max_attempts(3)
        .run_on_main_thread(false);
    let outcome = net.execute_blocking(request);

    assert_eq!(outcome, Outcome::success(200, json!({"ok": true, "hits": 3})));

    let count: HitCount = net
        .execute_blocking(Request::get(format!("{base}/hits/retry-ok")).run_on_main_thread(false))
        .decode()
        .unwrap();
    assert_eq!(count.hits, 3);
}

#[test]
fn exhausted_timeouts_fail_with_timeout() {
    let base = start_server();
    let net = network();

    let request = Request::get(format!("{base}/flaky/always-slow"))
        .param("failures", 10)
        .param("delay_ms", 2000)
        .timeout(Duration::from_millis(200))
        .max_attempts(2)
        .run_on_main_thread(false);
    let outcome = net.execute_blocking(request);

    assert!(matches!(
        outcome,
        Outcome::Failure {
            status: 0,
            error: NetworkError::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            }
        }
    ));
}

#[test]
fn server_error_is_not_retried() {
    let base = start_server();
    let net = network();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::clone(&failures);
    let outcome = net
        .send_with(
            Request::get(format!("{base}/status/500"))
                .max_attempts(1)
                .run_on_main_thread(false),
            |_, _| panic!("must not succeed"),
            move |status, error| f.lock().push((status, error.clone())),
        )
        .wait();

    let expected = NetworkError::Application {
        status: 500,
        body: "server error".into(),
    };
    assert_eq!(outcome, Outcome::failure(500, expected.clone()));
    assert_eq!(*failures.lock(), vec![(500, expected)]);
}

#[test]
fn malformed_body_is_reported() {
    let base = start_server();
    let outcome = network().execute_blocking(
        Request::get(format!("{base}/malformed"))
            .max_attempts(3)
            .run_on_main_thread(false),
    );
    assert!(matches!(
        outcome,
        Outcome::Failure {
            status: 200,
            error: NetworkError::MalformedResponse { .. }
        }
    ));
}

#[test]
fn non_utf8_body_is_malformed_and_not_retried() {
    let base = start_server();
    let net = network();

    let outcome = net.execute_blocking(
        Request::get(format!("{base}/binary/not-utf8"))
            .max_attempts(3)
            .run_on_main_thread(false),
    );
    assert!(
        matches!(
            outcome,
            Outcome::Failure {
                status: 200,
                error: NetworkError::MalformedResponse { status: 200, .. }
            }
        ),
        "unexpected outcome: {outcome:?}"
    );

    let count: HitCount = net
        .execute_blocking(Request::get(format!("{base}/hits/not-utf8")).run_on_main_thread(false))
        .decode()
        .unwrap();
    assert_eq!(count.hits, 1);
}

#[test]
fn post_sends_json_body_and_headers() {
    let base = start_server();
    let outcome = network().execute_blocking(
        Request::post(format!("{base}/echo"))
            .header("x-token", "abc")
            .param("title", "milk")
            .param("tags", json!({"a": [1, 2]}))
            .run_on_main_thread(false),
    );

    let data = outcome.data().unwrap();
    assert_eq!(data["body"], json!({"title": "milk", "tags": {"a": [1, 2]}}));
    assert_eq!(data["headers"]["x-token"], "abc");
    assert_eq!(data["headers"]["content-type"], "application/json");
}

#[test]
fn get_and_delete_send_body_as_query() {
    let base = start_server();
    let net = network();

    for method in [HttpMethod::Get, HttpMethod::Delete] {
        let outcome = net.execute_blocking(
            Request::new(method, format!("{base}/echo"))
                .param("q", "rust")
                .param("page", 2)
                .run_on_main_thread(false),
        );
        let data = outcome.data().unwrap();
        assert_eq!(data["method"], method.as_str());
        assert_eq!(data["query"], json!({"q": "rust", "page": "2"}));
    }
}

#[test]
fn connection_refused_is_a_retryable_transport_error() {
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let outcome = network().execute_blocking(
        Request::get(format!("http://{addr}/nothing"))
            .max_attempts(2)
            .timeout(Duration::from_secs(2))
            .run_on_main_thread(false),
    );
    let error = outcome.error().unwrap();
    assert!(error.is_retryable(), "unexpected error: {error:?}");
}

#[test]
fn configured_defaults_apply_to_new_requests() {
    let base = start_server();
    let config = NetworkConfig::from_json(
        r#"{"timeout_secs": 5, "max_attempts": 2, "run_on_main_thread": false}"#,
    )
    .unwrap();
    let bus = Arc::new(Broadcaster::new());
    let net = Network::builder()
        .config(config)
        .broadcaster(Arc::clone(&bus))
        .build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.subscribe(REQUEST_SUCCESS_EVENT, move |n| s.lock().push(n.request.url.clone()));

    let request = net.request(HttpMethod::Get, format!("{base}/slow/10"));
    assert_eq!(request.effective_max_attempts(), 2);
    assert_eq!(request.timeout_duration(), Duration::from_secs(5));
    assert!(!request.runs_on_main_thread());

    let outcome = net.send(request).wait();
    assert!(outcome.is_success());
    assert_eq!(*seen.lock(), vec![format!("{base}/slow/10")]);
}
