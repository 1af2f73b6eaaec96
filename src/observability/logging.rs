//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick the output format from the runtime environment
//! - Derive the filter from `RUST_LOG` or the configured log level
//!
//! # Design Decisions
//! - JSON format for staging/production, human-readable for development
//! - Initialization is idempotent; later calls are no-ops

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Environment, LogLevel, Settings};
use crate::observability::ObservabilityError;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn for_settings(settings: &Settings) -> Self {
        match settings.environment {
            Environment::Staging | Environment::Production => LogFormat::Json,
            Environment::Development if settings.debug => LogFormat::Pretty,
            Environment::Development => LogFormat::Compact,
        }
    }
}

/// Filter from `RUST_LOG` when set, else from the configured level.
pub fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
}

fn install(filter: EnvFilter, format: LogFormat) -> Result<(), ObservabilityError> {
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    };
    result.map_err(|_| ObservabilityError::LoggingInit)
}

/// Install the subscriber described by `settings`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init(settings: &Settings) -> bool {
    install(
        filter_for(settings.log_level),
        LogFormat::for_settings(settings),
    )
    .is_ok()
}

/// Subscriber used before configuration is available, e.g. to report a
/// configuration error.
pub fn init_fallback() -> bool {
    install(filter_for(LogLevel::Info), LogFormat::Compact).is_ok()
}
