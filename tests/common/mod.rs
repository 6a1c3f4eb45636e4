//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use load_balancer::breaker::BreakerCoordinator;
use load_balancer::config::{BackendSeed, Config};
use load_balancer::http::HttpServer;
use load_balancer::registry::Registry;
use load_balancer::telemetry::Telemetry;
use load_balancer::Shutdown;

/// Start a mock backend on an ephemeral port that always answers with the
/// given status and body.
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

/// Start a programmable mock backend; the closure decides each response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start an axum-based backend that echoes the request body back.
pub async fn start_echo_backend() -> SocketAddr {
    use axum::Router;

    async fn echo(body: bytes::Bytes) -> bytes::Bytes {
        body
    }

    let app = Router::new().fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// A running proxy plus handles into its subsystems.
pub struct TestHarness {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub breaker: Arc<BreakerCoordinator>,
    pub telemetry: Arc<Telemetry>,
    pub shutdown: Arc<Shutdown>,
}

impl TestHarness {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Spin up the full proxy on an ephemeral port.
pub async fn start_proxy(config: Config) -> TestHarness {
    let server = HttpServer::new(config);
    let registry = server.registry();
    let breaker = server.breaker();
    let telemetry = server.telemetry();
    let shutdown = Arc::new(Shutdown::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Give the listener a beat to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestHarness {
        addr,
        registry,
        breaker,
        telemetry,
        shutdown,
    }
}

/// Config seeded with the given backends and no synthetic test servers.
pub fn config_with_backends(seeds: &[(&str, SocketAddr)]) -> Config {
    Config {
        backends: seeds
            .iter()
            .map(|(id, addr)| BackendSeed {
                id: id.to_string(),
                host: addr.ip().to_string(),
                port: addr.port(),
            })
            .collect(),
        start_test_servers: false,
        ..Config::default()
    }
}

/// A reqwest client that does not reuse pooled connections between tests.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
