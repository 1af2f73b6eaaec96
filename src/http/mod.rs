//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID layers, composed pipeline)
//!     → operational routes (/health, /metrics)
//!     → business router under /api/v1
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
