//! Admin and dashboard API.
//!
//! # Endpoints
//! ```text
//! GET    /api/servers            backend snapshots
//! POST   /api/servers            register a backend
//! DELETE /api/servers/{id}       remove a backend
//! POST   /api/servers/{id}/toggle  flip reachability (+ breaker force)
//! POST   /api/servers/{id}/reset   force breaker Closed, drain in-flight
//! POST   /api/config             flip routing toggles
//! GET    /api/test               synthetic dispatch through the full path
//! GET    /api/packets?limit=N    recent packet events
//! GET    /api/metrics            aggregate counters + backend state
//! GET    /api/events             live SSE stream
//! ```

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::balancer::RequestInfo;
use crate::dispatch::{extract_priority, BUSY_THRESHOLD};
use crate::http::server::AppState;
use crate::registry::{Backend, BackendSnapshot};
use crate::telemetry::{EventKind, LbStatsSnapshot, PacketEvent, PacketStatus};

/// All `/api` routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/servers", get(list_servers).post(add_server))
        .route("/servers/{id}", axum::routing::delete(remove_server))
        .route("/servers/{id}/toggle", post(toggle_server))
        .route("/servers/{id}/reset", post(reset_server))
        .route("/config", post(update_config))
        .route("/test", get(test_dispatch))
        .route("/packets", get(get_packets))
        .route("/metrics", get(get_metrics))
        .route("/events", get(events_stream))
}

#[derive(Debug, Deserialize)]
struct AddServerRequest {
    id: String,
    host: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct ServerToggleResponse {
    id: String,
    enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigUpdate {
    #[serde(rename = "useIPHash")]
    use_ip_hash: bool,
    #[serde(rename = "useStickySessions")]
    use_sticky_sessions: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestResponse {
    server: String,
    response_time: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PacketQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PacketsResponse {
    events: Vec<PacketEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    load_balancer: LbStatsSnapshot,
    servers: Vec<BackendSnapshot>,
}

async fn list_servers(State(state): State<AppState>) -> Json<Vec<BackendSnapshot>> {
    let snapshots = state.registry.list().iter().map(|b| b.snapshot()).collect();
    Json(snapshots)
}

async fn add_server(
    State(state): State<AppState>,
    Json(request): Json<AddServerRequest>,
) -> Response {
    if request.id.is_empty() || request.host.is_empty() {
        return (StatusCode::BAD_REQUEST, "id and host are required").into_response();
    }
    if state.registry.get(&request.id).is_some() {
        return (StatusCode::CONFLICT, "server id already registered").into_response();
    }

    let backend = Arc::new(Backend::new(request.id, request.host, request.port));
    let snapshot = backend.snapshot();
    state.registry.add(backend);
    state.telemetry.publish(
        EventKind::Success,
        format!("Server {} registered", snapshot.id),
    );

    (StatusCode::CREATED, Json(snapshot)).into_response()
}

async fn remove_server(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !state.registry.remove(&id) {
        return (StatusCode::NOT_FOUND, "Server not found").into_response();
    }
    state
        .telemetry
        .publish(EventKind::Info, format!("Server {id} removed"));
    Json(serde_json::json!({ "status": "removed", "id": id })).into_response()
}

async fn toggle_server(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(backend) = state.registry.get(&id) else {
        return (StatusCode::NOT_FOUND, "Server not found").into_response();
    };

    let enabled = !backend.is_reachable();
    backend.set_reachable(enabled);

    if enabled {
        backend.reset_closed();
        state
            .telemetry
            .publish(EventKind::Success, format!("Server {id} enabled"));
    } else {
        // A disabled backend must stop receiving traffic at once: trip the
        // breaker and forget any requests it was carrying.
        backend.trip_open();
        backend.drain_in_flight();
        state
            .telemetry
            .publish(EventKind::Warning, format!("Server {id} disabled"));
    }

    Json(ServerToggleResponse { id, enabled }).into_response()
}

async fn reset_server(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(backend) = state.registry.get(&id) else {
        return (StatusCode::NOT_FOUND, "Server not found").into_response();
    };

    backend.reset_closed();
    backend.set_reachable(true);
    backend.drain_in_flight();

    state.telemetry.publish(
        EventKind::Info,
        format!("Server {id} circuit breaker reset"),
    );

    Json(serde_json::json!({ "status": "reset", "id": id })).into_response()
}

async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<ConfigUpdate>,
) -> Json<ConfigUpdate> {
    state.flags.set_use_ip_hash(config.use_ip_hash);
    state.flags.set_use_sticky_sessions(config.use_sticky_sessions);

    state.telemetry.publish(
        EventKind::Info,
        format!(
            "Load balancer config updated: IP Hash {}, Sticky Sessions {}",
            enabled_str(config.use_ip_hash),
            enabled_str(config.use_sticky_sessions)
        ),
    );

    Json(config)
}

/// Simulated dispatch exercising the full selection/retry/breaker path
/// without a network hop.
async fn test_dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let total = state.registry.len();
    if total == 0 {
        state
            .telemetry
            .publish(EventKind::Error, "Test request failed: no servers registered");
        return (StatusCode::SERVICE_UNAVAILABLE, "No server available").into_response();
    }

    let priority = extract_priority(&headers, &uri);
    let request_id = state.telemetry.next_request_id();
    let info = RequestInfo::from_request(&headers, peer);
    let mut attempted: HashSet<String> = HashSet::with_capacity(total);
    let mut last_error: Option<&'static str> = None;

    for attempt in 1..=total as u32 {
        let Some(backend) = state.balancer.pick(&info, &attempted) else {
            break;
        };
        attempted.insert(backend.id.clone());

        let active = backend.begin_request();
        state.telemetry.emit_packet(PacketEvent::attempt(
            &request_id,
            attempt,
            priority.as_str(),
            &backend.id,
            &backend.address(),
            PacketStatus::Dispatch,
            active,
        ));

        if active > BUSY_THRESHOLD {
            let active_after = backend.end_request();
            state.telemetry.emit_packet(
                PacketEvent::attempt(
                    &request_id,
                    attempt,
                    priority.as_str(),
                    &backend.id,
                    &backend.address(),
                    PacketStatus::Rerouted,
                    active_after,
                )
                .with_reason("busy"),
            );
            continue;
        }

        let (processing_ms, roll) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(50..250u64), rng.gen::<f64>())
        };
        tokio::time::sleep(Duration::from_millis(processing_ms)).await;
        let response_ms = processing_ms as f64;

        let failure_chance = (0.05 + backend.error_rate()).min(0.4);
        if roll < failure_chance {
            let active_after = backend.end_request();
            state.breaker.report_failure(&backend);
            state.telemetry.record_request(&backend.id, response_ms, true);
            state.telemetry.emit_packet(
                PacketEvent::attempt(
                    &request_id,
                    attempt,
                    priority.as_str(),
                    &backend.id,
                    &backend.address(),
                    PacketStatus::Failed,
                    active_after,
                )
                .with_reason("simulated failure")
                .with_response_time(response_ms),
            );
            state.telemetry.publish(
                EventKind::Warning,
                format!("Simulated failure on {} for request {request_id}", backend.id),
            );
            last_error = Some("simulated failure");
            continue;
        }

        state.breaker.report_success(&backend);
        state.telemetry.record_request(&backend.id, response_ms, false);
        let active_after = backend.end_request();
        state.telemetry.emit_packet(
            PacketEvent::attempt(
                &request_id,
                attempt,
                priority.as_str(),
                &backend.id,
                &backend.address(),
                PacketStatus::Completed,
                active_after,
            )
            .with_response_time(response_ms),
        );
        state.telemetry.publish(
            EventKind::Info,
            format!(
                "Test request {request_id} served by {} ({} priority)",
                backend.id,
                priority.as_str()
            ),
        );

        return Json(TestResponse {
            server: backend.id.clone(),
            response_time: processing_ms,
            timestamp: Utc::now(),
        })
        .into_response();
    }

    let reason = last_error.unwrap_or("all servers busy");
    state.telemetry.publish(
        EventKind::Error,
        format!("Test request {request_id} failed: {reason}"),
    );
    (StatusCode::SERVICE_UNAVAILABLE, "No server available").into_response()
}

async fn get_packets(
    State(state): State<AppState>,
    Query(query): Query<PacketQuery>,
) -> Json<PacketsResponse> {
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(100);
    Json(PacketsResponse {
        events: state.telemetry.recent_packets(limit),
    })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        load_balancer: state.telemetry.stats_snapshot(),
        servers: state.registry.list().iter().map(|b| b.snapshot()).collect(),
    })
}

/// Live event stream. Lagging subscribers silently lose events; the packet
/// ring still retains them.
async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.telemetry.subscribe();
    state
        .telemetry
        .publish(EventKind::Info, "Connected to event stream");

    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        msg.ok()
            .map(|json| Ok::<Event, Infallible>(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}

fn enabled_str(value: bool) -> &'static str {
    if value {
        "enabled"
    } else {
        "disabled"
    }
}
