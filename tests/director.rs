//! End-to-end tests: a director in front of real local backends.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use director::config::model::ProxyConfig;
use director::config::validation::{validate, DirectorConfig};
use director::metrics::{self, Reporter, TimingContext};
use director::server::{self, Director};

/// Records every metric call in memory.
#[derive(Default)]
struct CountingReporter {
    counts: Mutex<HashMap<String, u64>>,
}

impl CountingReporter {
    fn get(&self, tag: &str) -> u64 {
        self.counts.lock().unwrap().get(tag).copied().unwrap_or(0)
    }

    fn add(&self, tag: &str, value: u64) {
        *self.counts.lock().unwrap().entry(tag.to_string()).or_default() += value;
    }
}

impl Reporter for CountingReporter {
    fn increment(&self, tag: &str) {
        self.add(tag, 1);
    }

    fn gauge(&self, tag: &str, value: u64) {
        self.counts.lock().unwrap().insert(tag.to_string(), value);
    }

    fn count(&self, tag: &str, value: u64) {
        self.add(tag, value);
    }

    fn start_timing(&self) -> TimingContext {
        TimingContext::started()
    }

    fn end_timing(&self, timing: TimingContext, tag: &str) {
        assert!(timing.elapsed().is_some());
        self.add(&format!("{tag}.samples"), 1);
    }
}

#[derive(Debug, Clone)]
struct Seen {
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn snapshot(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start a backend that records each request and answers with `status`,
/// an `x-backend: <name>` header and `name` as the body.
async fn spawn_backend(name: &'static str, status: StatusCode, delay: Duration) -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let state = recorder.clone();

    let app = Router::new().fallback(move |request: Request| {
        let state = state.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            state.seen.lock().unwrap().push(Seen {
                uri: parts.uri,
                headers: parts.headers,
                body,
            });
            tokio::time::sleep(delay).await;
            (status, [("x-backend", name)], name)
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

/// An address nothing listens on.
async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn config_for(primary: &str, secondaries: &[String]) -> DirectorConfig {
    let mut backends = BTreeMap::new();
    backends.insert("primary".to_string(), primary.to_string());
    for (i, address) in secondaries.iter().enumerate() {
        backends.insert(format!("secondary-{i}"), address.clone());
    }
    validate(Some(&ProxyConfig::new(9090, "primary", backends))).unwrap()
}

async fn start_director(config: DirectorConfig, reporter: Arc<CountingReporter>) -> SocketAddr {
    serve(Director::new(config).with_reporter(reporter)).await
}

async fn serve(director: Director) -> SocketAddr {
    let router = server::build_router(Arc::new(director));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn primary_response_is_returned_and_secondary_receives_copy() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let (secondary, secondary_seen) =
        spawn_backend("shadow", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-backend"], "OK");
    assert_eq!(resp.text().await.unwrap(), "OK");

    eventually("secondary success", || {
        reporter.get("secondary.success.count") == 1
    })
    .await;

    assert_eq!(reporter.get(metrics::REQUEST_COUNT), 1);
    assert_eq!(reporter.get("primary.success.count"), 1);
    assert_eq!(reporter.get("primary.response_time.samples"), 1);
    assert_eq!(reporter.get("primary.failure.count"), 0);
    assert_eq!(primary_seen.len(), 1);
    assert_eq!(secondary_seen.len(), 1);
}

#[tokio::test]
async fn primary_status_and_headers_pass_through() {
    let (primary, _) = spawn_backend("teapot", StatusCode::IM_A_TEAPOT, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let addr = start_director(config_for(&format!("http://{primary}"), &[]), Arc::clone(&reporter)).await;

    let resp = reqwest::get(format!("http://{addr}/brew")).await.unwrap();
    assert_eq!(resp.status(), 418);
    assert_eq!(resp.headers()["x-backend"], "teapot");
    assert_eq!(resp.text().await.unwrap(), "teapot");

    // A non-2xx status is still a successful call.
    assert_eq!(reporter.get("primary.success.count"), 1);
}

#[tokio::test]
async fn unreachable_primary_returns_503() {
    let primary = closed_addr().await;
    let (secondary, _) = spawn_backend("shadow", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body = resp.text().await.unwrap();
    assert!(body.to_lowercase().contains("refused"), "body: {body}");
    assert!(body.ends_with('\n'));

    eventually("secondary success", || {
        reporter.get("secondary.success.count") == 1
    })
    .await;
    assert_eq!(reporter.get("primary.failure.count"), 1);
    assert_eq!(reporter.get("primary.success.count"), 0);
    assert_eq!(reporter.get("secondary.failure.count"), 0);
}

#[tokio::test]
async fn failing_secondary_does_not_affect_caller() {
    let (primary, _) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let dead = closed_addr().await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{dead}")]);
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");

    eventually("secondary failure", || {
        reporter.get("secondary.failure.count") == 1
    })
    .await;
    assert_eq!(reporter.get("primary.success.count"), 1);
}

#[tokio::test]
async fn slow_secondary_does_not_delay_caller() {
    let (primary, _) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let (secondary, _) = spawn_backend("slow", StatusCode::OK, Duration::from_secs(5)).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let addr = start_director(config, reporter).await;

    let resp = tokio::time::timeout(
        Duration::from_secs(2),
        reqwest::get(format!("http://{addr}/")),
    )
    .await
    .expect("caller waited on the secondary")
    .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn primary_deadline_returns_504() {
    let (primary, _) = spawn_backend("late", StatusCode::OK, Duration::from_secs(2)).await;

    let reporter = Arc::new(CountingReporter::default());
    let mut config = config_for(&format!("http://{primary}"), &[]);
    config.response_timeout = Some(Duration::from_millis(100));
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 504);
    assert_eq!(reporter.get("primary.timeout.count"), 1);
    assert_eq!(reporter.get("primary.failure.count"), 1);
    assert_eq!(reporter.get("primary.response_time.samples"), 1);
}

#[tokio::test]
async fn every_secondary_receives_every_body() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let (first, first_seen) = spawn_backend("first", StatusCode::OK, Duration::ZERO).await;
    let (second, second_seen) = spawn_backend("second", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(
        &format!("http://{primary}"),
        &[format!("http://{first}"), format!("http://{second}")],
    );
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let client = reqwest::Client::new();
    for i in 0..10 {
        let resp = client
            .post(format!("http://{addr}/submit"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(format!("index={i}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    eventually("all secondary calls", || {
        first_seen.len() == 10 && second_seen.len() == 10
    })
    .await;

    let expected: Vec<String> = (0..10).map(|i| format!("index={i}")).collect();
    for recorder in [&primary_seen, &first_seen, &second_seen] {
        let mut bodies: Vec<String> = recorder
            .snapshot()
            .iter()
            .map(|seen| String::from_utf8_lossy(&seen.body).into_owned())
            .collect();
        bodies.sort_by_key(|b| b.trim_start_matches("index=").parse::<u32>().unwrap());
        assert_eq!(bodies, expected);
    }

    assert_eq!(reporter.get(metrics::REQUEST_COUNT), 10);
    assert_eq!(reporter.get("primary.success.count"), 10);
    eventually("secondary success count", || {
        reporter.get("secondary.success.count") == 20
    })
    .await;
}

#[tokio::test]
async fn path_and_query_are_rebased_onto_backend() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}/base?tenant=a"), &[]);
    let addr = start_director(config, reporter).await;

    let resp = reqwest::get(format!("http://{addr}/v1/items?page=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = primary_seen.snapshot();
    assert_eq!(seen[0].uri.path(), "/base/v1/items");
    assert_eq!(seen[0].uri.query(), Some("tenant=a&page=2"));
}

#[tokio::test]
async fn hop_by_hop_headers_are_stripped() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let addr = start_director(config_for(&format!("http://{primary}"), &[]), reporter).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/"))
        .header("connection", "x-session-hint")
        .header("x-session-hint", "drop me")
        .header("proxy-authorization", "Basic Zm9vOmJhcg==")
        .header("x-request-tag", "keep me")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let headers = &primary_seen.snapshot()[0].headers;
    assert!(!headers.contains_key("x-session-hint"));
    assert!(!headers.contains_key("proxy-authorization"));
    assert_eq!(headers["x-request-tag"], "keep me");
    // Host is rewritten to the backend's authority.
    assert_eq!(headers["host"], primary.to_string().as_str());
}

#[tokio::test]
async fn caller_hangup_still_completes_primary_and_secondaries() {
    let (primary, _) = spawn_backend("OK", StatusCode::OK, Duration::from_millis(500)).await;
    let (secondary, secondary_seen) =
        spawn_backend("shadow", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let addr = start_director(config, Arc::clone(&reporter)).await;

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let result = impatient.get(format!("http://{addr}/")).send().await;
    assert!(result.is_err(), "caller should have given up first");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(reporter.get(metrics::REQUEST_COUNT), 1);
    assert_eq!(reporter.get("primary.success.count"), 1);
    assert_eq!(reporter.get("primary.response_time.samples"), 1);
    assert_eq!(secondary_seen.len(), 1);
    assert_eq!(reporter.get("secondary.success.count"), 1);
}

#[tokio::test]
async fn oversized_body_with_content_length_is_rejected() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let (secondary, secondary_seen) =
        spawn_backend("shadow", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let director = Director::new(config)
        .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>)
        .with_max_body(16);
    let addr = serve(director).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .body("x".repeat(32))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reporter.get(metrics::REQUEST_COUNT), 1);
    assert_eq!(primary_seen.len(), 0);
    assert_eq!(secondary_seen.len(), 0);
}

#[tokio::test]
async fn oversized_chunked_body_is_rejected_not_truncated() {
    let (primary, primary_seen) = spawn_backend("OK", StatusCode::OK, Duration::ZERO).await;
    let (secondary, secondary_seen) =
        spawn_backend("shadow", StatusCode::OK, Duration::ZERO).await;

    let reporter = Arc::new(CountingReporter::default());
    let config = config_for(&format!("http://{primary}"), &[format!("http://{secondary}")]);
    let director = Director::new(config)
        .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>)
        .with_max_body(16);
    let addr = serve(director).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let payload = "y".repeat(32);
    let request = format!(
        "POST /upload HTTP/1.1\r\nHost: {addr}\r\nTransfer-Encoding: chunked\r\n\
         Connection: close\r\n\r\n{:x}\r\n{payload}\r\n0\r\n\r\n",
        payload.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;
    let head = String::from_utf8_lossy(&raw);
    assert!(head.starts_with("HTTP/1.1 413"), "response: {head}");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(primary_seen.len(), 0);
    assert_eq!(secondary_seen.len(), 0);
    assert_eq!(reporter.get("primary.success.count"), 0);
}
