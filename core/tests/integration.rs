//! End-to-end transfers against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then runs tasks through a pool
//! backed by the real `HttpTransport`. Validates that responses stream into
//! requests, that transfer failures become error codes and that cancel stops
//! a transfer that is still in flight.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sinet_core::error::{ERR_CONNECT, ERR_HTTP, ERR_OK, ERR_URL};
use sinet_core::{
    HttpConfig, HttpTransport, Method, OutputMode, Pool, PoolConfig, PostData, PostDataElem,
    Request, Task, TaskStatus,
};

const WAIT: Duration = Duration::from_secs(10);

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn http_pool() -> Pool {
    http_pool_with(Arc::new(http_transport()))
}

fn http_transport() -> HttpTransport {
    HttpTransport::new(HttpConfig {
        user_agent: Some("sinet-integration".to_string()),
        ..HttpConfig::default()
    })
    .unwrap()
}

fn http_pool_with(transport: Arc<HttpTransport>) -> Pool {
    Pool::new(
        transport,
        PoolConfig {
            min_interval_ms: 1,
            max_interval_ms: 20,
        },
    )
    .unwrap()
}

#[test]
fn task_lifecycle_over_http() {
    let addr = start_server();
    let base = format!("http://{addr}");
    let pool = http_pool();

    // Step 1: one task with several requests multiplexed together.
    let download = Request::get(format!("{base}/bytes/100000"));
    let headers = Request::get(format!("{base}/headers"));
    headers.set_header("x-trace", "abc");
    let missing = Request::get(format!("{base}/status/404"));
    let task = Task::with_requests([download.clone(), headers.clone(), missing.clone()]);
    pool.execute(&task);
    assert!(pool.is_running_or_queued(&task));

    assert_eq!(task.wait(WAIT), TaskStatus::Completed);
    assert!(pool.is_finished(&task));
    assert!(!pool.is_running_or_queued(&task));

    // Step 2: the download streamed in full.
    assert_eq!(download.response_errcode(), ERR_OK);
    assert_eq!(download.response_status(), 200);
    assert_eq!(download.response_size(), 100_000);
    let body = download.response_buffer();
    assert!(body.iter().enumerate().all(|(i, b)| *b == mock_server::pattern_byte(i)));
    assert!(download.response_headers().contains_key("x-request-id"));

    // Step 3: request headers and the configured user agent reached the peer.
    let seen: BTreeMap<String, String> = headers.response_json().unwrap();
    assert_eq!(seen.get("x-trace").map(String::as_str), Some("abc"));
    assert_eq!(seen.get("user-agent").map(String::as_str), Some("sinet-integration"));

    // Step 4: an HTTP failure is recorded on its own request only.
    assert_eq!(missing.response_status(), 404);
    assert_eq!(missing.response_errcode(), ERR_HTTP);
}

#[test]
fn post_data_reaches_the_peer() {
    let addr = start_server();
    let pool = http_pool();

    let raw = PostData::new();
    raw.add_elem(PostDataElem::text("", "plain body"));
    let echo = Request::get(format!("http://{addr}/echo"));
    echo.set_postdata(Some(raw));

    let form = PostData::new();
    form.add_elem(PostDataElem::text("field", "value"));
    form.add_elem(PostDataElem::buffer("blob", vec![1u8, 2, 3]));
    let summary = Request::get(format!("http://{addr}/echo"));
    summary.set_method(Method::Put);
    summary.set_header("accept", "application/json");
    summary.set_postdata(Some(form));

    let task = Task::with_requests([echo.clone(), summary.clone()]);
    pool.execute(&task);
    assert_eq!(task.wait(WAIT), TaskStatus::Completed);

    assert_eq!(echo.response_text(), "plain body");
    assert_eq!(
        echo.response_headers().get("content-type").map(String::as_str),
        Some("text/plain; charset=utf-8")
    );

    let seen: serde_json::Value = summary.response_json().unwrap();
    assert_eq!(seen["method"], "PUT");
    assert!(seen["content_type"]
        .as_str()
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
}

#[test]
fn response_can_stream_into_a_file() {
    let addr = start_server();
    let pool = http_pool();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");

    let request = Request::get(format!("http://{addr}/bytes/40000"));
    request.set_output(OutputMode::File(path.clone()));
    let task = Task::with_requests([request.clone()]);
    pool.execute(&task);
    assert_eq!(task.wait(WAIT), TaskStatus::Completed);

    assert_eq!(request.response_errcode(), ERR_OK);
    assert_eq!(request.response_size(), 40_000);
    assert!(request.response_buffer().is_empty());
    assert_eq!(std::fs::read(&path).unwrap().len(), 40_000);
}

#[test]
fn transport_failures_become_error_codes() {
    // Bind then drop a listener so the port is known to refuse connections.
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let pool = http_pool();

    let refused = Request::get(format!("http://{closed}/"));
    let malformed = Request::get("not a url at all");
    let task = Task::with_requests([refused.clone(), malformed.clone()]);
    pool.execute(&task);

    assert_eq!(task.wait(WAIT), TaskStatus::Completed);
    assert_eq!(task.error_code(), ERR_OK);
    assert_eq!(refused.response_errcode(), ERR_CONNECT);
    assert_eq!(malformed.response_errcode(), ERR_URL);
}

#[test]
fn cancel_stops_an_in_flight_transfer() {
    let addr = start_server();
    let transport = Arc::new(http_transport());
    let pool = http_pool_with(Arc::clone(&transport));

    let slow = Task::with_requests([Request::get(format!("http://{addr}/delay/5000"))]);
    let next = Task::with_requests([Request::get(format!("http://{addr}/bytes/10"))]);
    pool.execute(&slow);
    pool.execute(&next);

    let deadline = Instant::now() + WAIT;
    while !pool.is_running(&slow) {
        assert!(Instant::now() < deadline, "task never admitted");
        std::thread::sleep(Duration::from_millis(2));
    }
    let canceled_at = Instant::now();
    pool.cancel(&slow);

    assert_eq!(slow.status(), TaskStatus::Canceled);
    assert!(pool.is_finished(&slow));
    assert_eq!(next.wait(WAIT), TaskStatus::Completed);
    assert_eq!(next.request(0).unwrap().response_size(), 10);

    // The delayed response is still seconds away, so its transfer thread
    // must have been torn down rather than left waiting for it.
    while transport.live_transfers() > 0 {
        assert!(
            canceled_at.elapsed() < Duration::from_secs(3),
            "canceled transfer is still running"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}
