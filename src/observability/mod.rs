//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages produce:
//!     → access_log.rs (one structured event per request)
//!     → metrics.rs    (request counter, latency histogram)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, JSON or human-readable)
//!     → GET /metrics and the optional exporter listener
//! ```
//!
//! # Design Decisions
//! - Stages talk to sinks through small traits, not to a backend directly
//! - Sink failures are swallowed; they never change a response
//! - Every request is recorded exactly once, including rejected and
//!   disconnected ones

pub mod access_log;
pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use self::access_log::{EventSink, RequestEvent, RequestLogger, TracingEventSink};
pub use self::metrics::{MetricsExporter, MetricsRecorder, MetricsSink, PrometheusMetrics};

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Failure inside an observability backend.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("event sink failed: {0}")]
    Sink(String),

    #[error("metrics backend failed: {0}")]
    Metrics(String),

    #[error("logging already initialised")]
    LoggingInit,
}

/// Runs its action on drop unless disarmed.
///
/// Held across `Next::run` so a dropped request future still gets recorded.
pub(crate) struct OnAbort<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> OnAbort<F> {
    pub(crate) fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for OnAbort<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_on_abort_fires_on_drop() {
        let fired = Cell::new(false);
        drop(OnAbort::new(|| fired.set(true)));
        assert!(fired.get());
    }

    #[test]
    fn test_on_abort_disarmed() {
        let fired = Cell::new(false);
        OnAbort::new(|| fired.set(true)).disarm();
        assert!(!fired.get());
    }
}
