//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(error) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(%error, "Failed to install Prometheus recorder");
        return;
    }
    tracing::info!(address = %addr, "Metrics server listening");
}

/// Record one finished dispatch attempt.
pub fn record_dispatch(backend: &str, status: u16, duration: Duration) {
    let labels = [
        ("backend", backend.to_string()),
        ("status", status.to_string()),
    ];

    counter!("lb_dispatch_total", &labels).increment(1);
    histogram!("lb_dispatch_duration_seconds", &labels).record(duration.as_secs_f64());
}
