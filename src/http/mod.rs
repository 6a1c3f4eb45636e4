//! HTTP front-end subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, ConnectInfo peer address)
//!     → /lb/{*path}  → dispatch engine (prefix stripped, body buffered)
//!     → /api/...     → admin handlers
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
