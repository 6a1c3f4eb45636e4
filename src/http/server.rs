//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: load-balanced `/lb` routes + admin API
//! - Wire the shared application state into the handlers
//! - Serve with graceful shutdown and a bounded drain window

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::balancer::Balancer;
use crate::breaker::BreakerCoordinator;
use crate::config::{Config, RuntimeFlags};
use crate::dispatch::{extract_priority, Dispatcher};
use crate::lifecycle::Shutdown;
use crate::registry::{Backend, Registry};
use crate::telemetry::Telemetry;

/// Largest request body buffered for replay across retries.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// How long in-flight dispatches get to finish after the shutdown signal.
const DRAIN_WINDOW: Duration = Duration::from_secs(5);

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub balancer: Arc<Balancer>,
    pub breaker: Arc<BreakerCoordinator>,
    pub telemetry: Arc<Telemetry>,
    pub dispatcher: Arc<Dispatcher>,
    pub flags: Arc<RuntimeFlags>,
}

/// The balancer's HTTP front-end.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Wire every subsystem from the given configuration.
    pub fn new(config: Config) -> Self {
        let backends = config
            .backends
            .iter()
            .map(|seed| Arc::new(Backend::new(seed.id.clone(), seed.host.clone(), seed.port)))
            .collect();
        let registry = Arc::new(Registry::new(backends));
        let flags = Arc::new(RuntimeFlags::new(
            config.use_ip_hash,
            config.use_sticky_sessions,
        ));
        let balancer = Arc::new(Balancer::new(registry.clone(), flags.clone()));
        let breaker = Arc::new(BreakerCoordinator::new(
            registry.clone(),
            config.breaker.clone(),
        ));
        let telemetry = Arc::new(Telemetry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            balancer.clone(),
            breaker.clone(),
            telemetry.clone(),
        ));

        let state = AppState {
            registry,
            balancer,
            breaker,
            telemetry,
            dispatcher,
            flags,
        };

        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/lb", any(proxy_handler))
            .route("/lb/{*path}", any(proxy_handler))
            .nest("/api", crate::api::router())
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.state.registry.clone()
    }

    pub fn breaker(&self) -> Arc<BreakerCoordinator> {
        self.state.breaker.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.state.telemetry.clone()
    }

    /// Serve until the shutdown signal fires, then give in-flight dispatch
    /// tasks a bounded drain window before returning.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        let mut drain = shutdown.subscribe();

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .into_future();

        let result = tokio::select! {
            result = serve => result,
            _ = async {
                let _ = drain.recv().await;
                tokio::time::sleep(DRAIN_WINDOW).await;
            } => {
                tracing::warn!("Drain window elapsed, closing remaining connections");
                Ok(())
            }
        };

        tracing::info!("HTTP server stopped");
        result
    }
}

/// Load-balanced entry point: strip the `/lb` prefix, buffer the body, and
/// hand the request to the dispatch engine.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let priority = extract_priority(&parts.headers, &parts.uri);
    let target = upstream_target(&parts.uri);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "Failed to buffer request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    state
        .dispatcher
        .dispatch(parts.method, parts.headers, &target, body, peer, priority)
        .await
}

/// Upstream path and query: the `/lb` prefix removed, an empty remainder
/// normalized to `/`.
fn upstream_target(uri: &Uri) -> String {
    let path = uri.path();
    let stripped = path.strip_prefix("/lb").unwrap_or(path);
    let path = if stripped.is_empty() { "/" } else { stripped };

    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lb_prefix_is_stripped() {
        let uri: Uri = "/lb/orders/42".parse().unwrap();
        assert_eq!(upstream_target(&uri), "/orders/42");
    }

    #[test]
    fn bare_prefix_normalizes_to_root() {
        let uri: Uri = "/lb".parse().unwrap();
        assert_eq!(upstream_target(&uri), "/");
    }

    #[test]
    fn query_string_is_preserved() {
        let uri: Uri = "/lb/search?q=abc&priority=low".parse().unwrap();
        assert_eq!(upstream_target(&uri), "/search?q=abc&priority=low");
    }
}
