//! Synthetic backends for local development.
//!
//! Launched when `START_TEST_SERVERS` is set (the default): two small HTTP
//! servers that echo requests with random latency and an optional error
//! rate, plus `/health` and `/stats` endpoints.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// Configuration for one synthetic backend.
#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub id: String,
    pub port: u16,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Probability in [0,1] of answering 500.
    pub error_rate: f64,
}

impl TestServerConfig {
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            port,
            min_latency_ms: 50,
            max_latency_ms: 250,
            error_rate: 0.0,
        }
    }
}

/// Request counters served by `/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_request: DateTime<Utc>,
}

struct ServerState {
    config: TestServerConfig,
    stats: Mutex<RequestStats>,
}

/// Spawn the default pair of synthetic backends on 9001 and 9002.
pub fn start_default_servers() {
    for config in [
        TestServerConfig::new("server-1", 9001),
        TestServerConfig::new("server-2", 9002),
    ] {
        tokio::spawn(async move {
            if let Err(error) = serve(config.clone()).await {
                tracing::error!(server = %config.id, %error, "Test server exited");
            }
        });
    }
}

/// Run one synthetic backend until the process exits.
pub async fn serve(config: TestServerConfig) -> std::io::Result<()> {
    let port = config.port;
    let id = config.id.clone();

    let state = Arc::new(ServerState {
        stats: Mutex::new(RequestStats {
            total_requests: 0,
            successes: 0,
            failures: 0,
            last_request: Utc::now(),
        }),
        config,
    });

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .fallback(handle_request)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(server = %id, port, "Test server listening");
    axum::serve(listener, app).await
}

async fn handle_request(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    {
        let mut stats = state.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.total_requests += 1;
        stats.last_request = Utc::now();
    }

    let (latency_ms, roll) = {
        let mut rng = rand::thread_rng();
        let span = state.config.max_latency_ms.max(state.config.min_latency_ms + 1);
        (
            rng.gen_range(state.config.min_latency_ms..span),
            rng.gen::<f64>(),
        )
    };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;

    if roll < state.config.error_rate {
        let mut stats = state.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.failures += 1;
        return (StatusCode::INTERNAL_SERVER_ERROR, "Simulated server error").into_response();
    }

    {
        let mut stats = state.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.successes += 1;
    }

    Json(serde_json::json!({
        "server": state.config.id,
        "time": Utc::now().to_rfc3339(),
        "latency": latency_ms,
        "path": uri.path(),
    }))
    .into_response()
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": state.config.id,
    }))
}

async fn handle_stats(State(state): State<Arc<ServerState>>) -> Json<RequestStats> {
    let stats = state.stats.lock().unwrap_or_else(|e| e.into_inner());
    Json(stats.clone())
}
