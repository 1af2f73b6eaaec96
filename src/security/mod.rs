//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs   (origin allow-list, preflight answers)
//!     → hosts.rs  (Host header allow-list)
//!     → guard.rs  (denylisted injection patterns)
//!     → Pass to observability stages
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Rejections short-circuit the chain and never reach business logic
//! - No internal detail in rejection bodies

pub mod cors;
pub mod guard;
pub mod hosts;
pub mod rejection;

pub use cors::OriginPolicy;
pub use guard::SecurityGuard;
pub use hosts::{HostAllowList, HostPattern, HostValidation};
pub use rejection::Rejection;
