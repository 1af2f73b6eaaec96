//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment (+ optional .env file)
//!     → loader.rs (snapshot, case-insensitive keys)
//!     → validation.rs (coercion, closed-set checks, mandatory fields)
//!     → Settings (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded
//! - The loader caches its result; tests reset it explicitly
//! - Every invalid field is reported, not just the first

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigLoader;
pub use schema::{AllowList, Environment, LogLevel, Secret, Settings, API_V1_PREFIX};
pub use validation::{ConfigError, ValidationError};
