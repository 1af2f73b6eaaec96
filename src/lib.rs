//! Service bootstrap library.
//!
//! Loads validated settings from the environment, composes the fixed-order
//! request pipeline, and drives resource startup and shutdown around an
//! HTTP listener.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod storage;

pub use config::{ConfigError, ConfigLoader, Settings};
pub use http::HttpServer;
pub use lifecycle::{Application, LifecycleState, RunningService, Shutdown, StartupError};
pub use pipeline::Pipeline;
