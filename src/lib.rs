//! HTTP reverse-proxy load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                 LOAD BALANCER                    │
//!                 │                                                  │
//!  Client ────────┼─▶ http (axum router, /lb prefix)                 │
//!                 │        │                                         │
//!                 │        ▼                                         │
//!                 │    dispatch ──▶ balancer (sticky → ip-hash → wrr)│
//!                 │        │             │                           │
//!                 │        │             ▼                           │
//!                 │        │         registry (backends)             │
//!                 │        ▼                                         │
//!  Backend ◀──────┼── outbound client   ▲         ▲                  │
//!                 │        │            │         │                  │
//!                 │        ▼            │         │                  │
//!                 │    breaker ─────────┘     health scorer          │
//!                 │    (outcome reports,      (periodic weights)     │
//!                 │     cooldown sweeper)                            │
//!                 │                                                  │
//!                 │    telemetry (packet ring, event bus, stats)     │
//!                 │    api (admin surface, SSE)                      │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The dispatch engine asks the balancer for a backend while growing an
//! exclusion set, admits the request against the backend's in-flight
//! counter, forwards it, and feeds the outcome back into the circuit
//! breaker and the telemetry sinks. The health scorer and the breaker
//! sweeper run on their own tasks and exit on the shutdown signal.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod registry;

// Traffic management
pub mod balancer;
pub mod breaker;
pub mod health;

// Cross-cutting concerns
pub mod api;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;
pub mod testserver;

pub use config::Config;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
