//! Dispatch engine.
//!
//! # Data Flow
//! ```text
//! Inbound request (body already buffered)
//!     → assign request id, extract priority
//!     → loop over at most |registry| attempts:
//!         balancer pick (exclusion set grows each attempt)
//!         → in-flight increment + dispatch event
//!         → busy-shed when over threshold (rerouted event, next attempt)
//!         → forward with per-attempt timeout
//!         → classify: transport failure / 5xx → breaker failure, failed
//!           event, next attempt; otherwise breaker success, completed
//!           event, response copied to the caller
//!     → exhaustion: 503 + terminal error event
//! ```
//!
//! # Design Decisions
//! - The full request body is buffered up front so it can be replayed on
//!   every retry
//! - Breaker reports happen exactly once per attempted backend
//! - Busy-shed does not touch the breaker and is not counted as a failure
//! - A body read error after a successful status completes the dispatch;
//!   the caller sees a partial body and the error is logged

pub mod priority;

pub use priority::{extract_priority, Priority};

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Response, StatusCode};
use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::balancer::{Balancer, RequestInfo};
use crate::breaker::BreakerCoordinator;
use crate::observability;
use crate::registry::{Backend, Registry};
use crate::telemetry::{EventKind, PacketEvent, PacketStatus, Telemetry};

/// In-flight requests a backend may carry before the next attempt is
/// rerouted instead.
pub const BUSY_THRESHOLD: i64 = 5;

/// Total budget for a single forwarding attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a single forwarding attempt failed.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Transport(String),
    #[error("status {0}")]
    UpstreamStatus(u16),
}

/// The per-request dispatch loop and its collaborators.
pub struct Dispatcher {
    registry: Arc<Registry>,
    balancer: Arc<Balancer>,
    breaker: Arc<BreakerCoordinator>,
    telemetry: Arc<Telemetry>,
    client: Client<HttpConnector, Full<Bytes>>,
    busy_threshold: i64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        balancer: Arc<Balancer>,
        breaker: Arc<BreakerCoordinator>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            balancer,
            breaker,
            telemetry,
            client,
            busy_threshold: BUSY_THRESHOLD,
        }
    }

    /// Run one request through selection, forwarding, and retry.
    ///
    /// `target` is the upstream path and query, already stripped of the
    /// `/lb` prefix and normalized to start with `/`.
    pub async fn dispatch(
        &self,
        method: Method,
        headers: HeaderMap,
        target: &str,
        body: Bytes,
        peer: SocketAddr,
        priority: Priority,
    ) -> Response<Body> {
        let request_id = self.telemetry.next_request_id();
        let info = RequestInfo::from_request(&headers, peer);
        let attempts = self.registry.len() as u32;
        let mut attempted: HashSet<String> = HashSet::with_capacity(attempts as usize);
        let mut last_error: Option<DispatchError> = None;

        for attempt in 1..=attempts {
            let Some(backend) = self.balancer.pick(&info, &attempted) else {
                break;
            };
            attempted.insert(backend.id.clone());

            let active = backend.begin_request();
            self.telemetry.emit_packet(PacketEvent::attempt(
                &request_id,
                attempt,
                priority.as_str(),
                &backend.id,
                &backend.address(),
                PacketStatus::Dispatch,
                active,
            ));

            if active > self.busy_threshold {
                let active_after = backend.end_request();
                self.telemetry.emit_packet(
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
                tracing::debug!(
                    request_id = %request_id,
                    backend = %backend.id,
                    in_flight = active,
                    "Backend busy, rerouting"
                );
                continue;
            }

            let started = Instant::now();
            match self.forward(&backend, &method, &headers, target, body.clone()).await {
                Ok(response) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.breaker.report_success(&backend);
                    self.telemetry.record_request(&backend.id, elapsed_ms, false);
                    let active_after = backend.end_request();
                    self.telemetry.emit_packet(
                        PacketEvent::attempt(
                            &request_id,
                            attempt,
                            priority.as_str(),
                            &backend.id,
                            &backend.address(),
                            PacketStatus::Completed,
                            active_after,
                        )
                        .with_response_time(elapsed_ms),
                    );
                    observability::record_dispatch(
                        &backend.id,
                        response.status().as_u16(),
                        started.elapsed(),
                    );
                    return response;
                }
                Err(error) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    let active_after = backend.end_request();
                    self.breaker.report_failure(&backend);
                    self.telemetry.record_request(&backend.id, elapsed_ms, true);
                    self.telemetry.emit_packet(
                        PacketEvent::attempt(
                            &request_id,
                            attempt,
                            priority.as_str(),
                            &backend.id,
                            &backend.address(),
                            PacketStatus::Failed,
                            active_after,
                        )
                        .with_reason(error.to_string())
                        .with_response_time(elapsed_ms),
                    );
                    observability::record_dispatch(&backend.id, 502, started.elapsed());
                    tracing::warn!(
                        request_id = %request_id,
                        backend = %backend.id,
                        %error,
                        "Dispatch attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no healthy downstream servers".to_string());
        self.telemetry.publish(
            EventKind::Error,
            format!("Request {request_id} failed: {reason}"),
        );
        service_unavailable(&reason)
    }

    /// One forwarding attempt: rebuild the request against the backend and
    /// collect the response.
    async fn forward(
        &self,
        backend: &Backend,
        method: &Method,
        headers: &HeaderMap,
        target: &str,
        body: Bytes,
    ) -> Result<Response<Body>, DispatchError> {
        let uri = format!("http://{}{}", backend.address(), target)
            .parse::<axum::http::Uri>()
            .map_err(|e| DispatchError::Transport(format!("invalid upstream uri: {e}")))?;

        let mut builder = axum::http::Request::builder().method(method.clone()).uri(uri);
        if let Some(outbound) = builder.headers_mut() {
            for (name, value) in headers {
                // The client's Host names this balancer, not the backend.
                if name == &header::HOST {
                    continue;
                }
                outbound.append(name.clone(), value.clone());
            }
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| DispatchError::Transport(format!("request build failed: {e}")))?;

        let response = tokio::time::timeout(ATTEMPT_TIMEOUT, self.client.request(request))
            .await
            .map_err(|_| DispatchError::Transport("upstream timeout".to_string()))?
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(DispatchError::UpstreamStatus(response.status().as_u16()));
        }

        let (mut parts, mut incoming) = response.into_parts();
        let mut collected = BytesMut::new();
        while let Some(frame) = incoming.frame().await {
            match frame {
                Ok(frame) => {
                    if let Some(data) = frame.data_ref() {
                        collected.put(data.clone());
                    }
                }
                Err(error) => {
                    // Past the status line this dispatch already succeeded;
                    // the caller gets whatever arrived.
                    tracing::warn!(
                        backend = %backend.id,
                        %error,
                        "Upstream response body truncated"
                    );
                    break;
                }
            }
        }

        // The body is re-framed from the buffered bytes; stale framing
        // headers from the upstream would contradict it.
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts.headers.remove(header::CONTENT_LENGTH);

        let mut forwarded = Response::new(Body::from(collected.freeze()));
        *forwarded.status_mut() = parts.status;
        *forwarded.headers_mut() = parts.headers;
        Ok(forwarded)
    }
}

/// Terminal 503 for an exhausted dispatch.
fn service_unavailable(reason: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("Service Unavailable: {reason}")));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}
