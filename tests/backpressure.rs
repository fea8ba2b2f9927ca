//! Worker pool saturation and connection deadline tests.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

mod common;

use common::{client, start_server, status_of};

async fn read_all(stream: &mut TcpStream, within: Duration) -> String {
    let mut buf = Vec::new();
    tokio::time::timeout(within, stream.read_to_end(&mut buf))
        .await
        .expect("server kept the connection open")
        .unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_full_queue_rejects_with_503() {
    let server = start_server(|c| {
        c.listener.thread_pool_size = 1;
        c.listener.queue_depth = 1;
        c.listener.timeout_secs = 10;
    })
    .await;

    // Occupies the only worker: connected, never sends a request.
    let busy = TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.metrics.active_connections(), 1);

    // Fills the single queue slot.
    let queued = TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut rejected = TcpStream::connect(server.addr).await.unwrap();
    let raw = read_all(&mut rejected, Duration::from_secs(3)).await;
    assert_eq!(status_of(&raw), 503, "{raw}");
    assert!(raw.contains("Retry-After"));
    assert_eq!(server.metrics.status_count(503), 1);

    // Releasing the worker lets the queue drain and service resume.
    drop(busy);
    drop(queued);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let metrics: Value = client().get(server.url("/metrics")).send().await.unwrap().json().await.unwrap();
    assert_eq!(metrics["status_codes"]["503"], 1);
}

#[tokio::test]
async fn test_idle_connection_closed_after_timeout() {
    let server = start_server(|c| c.listener.timeout_secs = 1).await;

    let started = Instant::now();
    let mut idle = TcpStream::connect(server.addr).await.unwrap();
    let raw = read_all(&mut idle, Duration::from_secs(5)).await;

    assert!(raw.is_empty(), "unexpected bytes: {raw}");
    assert!(started.elapsed() >= Duration::from_millis(900));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.metrics.active_connections(), 0);
}

#[tokio::test]
async fn test_workers_keep_serving_after_bad_requests() {
    let server = start_server(|c| c.listener.thread_pool_size = 2).await;

    for _ in 0..5 {
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, b"NOT HTTP AT ALL\r\n\r\n")
            .await
            .unwrap();
        // The server answers 400 and closes; a reset is acceptable too.
        let mut sink = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut sink)).await;
    }

    let res = client().get(server.url("/health")).send().await.unwrap();
    assert!(res.status().is_success());
}

#[tokio::test]
async fn test_malformed_request_counted_as_400() {
    let server = start_server(|_| {}).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut stream, b"NOT HTTP AT ALL\r\n\r\n")
        .await
        .unwrap();
    let raw = read_all(&mut stream, Duration::from_secs(3)).await;
    assert_eq!(status_of(&raw), 400, "{raw}");

    // The socket can close before the worker records the response.
    let deadline = Instant::now() + Duration::from_secs(2);
    while server.metrics.status_count(400) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.metrics.status_count(400), 1);
    assert_eq!(server.metrics.total_requests(), 1);
}
