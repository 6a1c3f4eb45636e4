//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → build registry → spawn scorer/sweeper → start listener
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM → broadcast signal → scorer and sweeper exit,
//!     listener stops accepting → in-flight dispatches drain (5 s window)
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the signal out to every long-lived task
//! - Background loops must exit within one tick of the signal
//! - Drain window is bounded: the process exits even if a dispatch hangs

pub mod shutdown;

pub use shutdown::Shutdown;
