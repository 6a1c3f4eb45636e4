//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; the subscriber is installed in main
//! - Metric recording is cheap (atomic increments behind the `metrics`
//!   facade); the Prometheus exporter is optional and off by default

pub mod metrics;

pub use metrics::{init_metrics, record_dispatch};
