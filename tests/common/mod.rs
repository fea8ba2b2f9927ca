//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use file_server::config::ServerConfig;
use file_server::lifecycle::Shutdown;
use file_server::observability::MetricsRegistry;
use file_server::HttpServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TEST1_BODY: &str = "Hello from test1.txt\n";

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub metrics: Arc<MetricsRegistry>,
    pub root: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Populate a document root with a known layout.
pub fn docroot() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::write(root.join("test1.txt"), TEST1_BODY).unwrap();
    std::fs::write(root.join("style.css"), "body { margin: 0; padding: 0; }\n".repeat(64)).unwrap();
    std::fs::write(root.join("big.bin"), vec![7u8; 64 * 1024]).unwrap();
    std::fs::write(root.join("my file.txt"), "spaced").unwrap();
    std::fs::create_dir(root.join("docs")).unwrap();
    std::fs::write(root.join("docs").join("a.md"), "# a").unwrap();
    std::fs::write(root.join("docs").join("b.md"), "# b").unwrap();
    std::fs::create_dir(root.join("site")).unwrap();
    std::fs::write(root.join("site").join("index.html"), "<h1>site home</h1>").unwrap();
    dir
}

/// Defaults pointed at `root`, bound to loopback.
pub fn test_config(root: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.listener.timeout_secs = 5;
    config.files.root = root.to_path_buf();
    config
}

/// Start a server over a fresh document root.
pub async fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let root = docroot();
    let mut config = test_config(root.path());
    configure(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).unwrap();
    let metrics = server.metrics();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for the workers to come up
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        shutdown,
        metrics,
        root,
    }
}

/// A client that opens a fresh connection per request, matching the
/// server's default of closing after each response.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Send `request` verbatim and read until the server closes.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Status code from a raw response's status line.
pub fn status_of(raw: &str) -> u16 {
    raw.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
