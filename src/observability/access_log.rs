//! Per-request access logging.
//!
//! # Responsibilities
//! - Build one [`RequestEvent`] per request, whatever the outcome
//! - Hand events to an [`EventSink`]
//!
//! # Design Decisions
//! - Sink errors are logged at debug and dropped
//! - A request abandoned by its client is recorded with status 499

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;

use crate::observability::{ObservabilityError, OnAbort, CLIENT_CLOSED_REQUEST};
use crate::pipeline::{Next, RequestContext, Stage, StageKind};

/// Target used for access events, so they can be filtered separately.
pub const ACCESS_TARGET: &str = "access";

/// Structured record of one handled request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEvent {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<&'static str>,
}

impl RequestEvent {
    pub fn new(ctx: &RequestContext, status: u16, elapsed: Duration) -> Self {
        Self {
            request_id: ctx.request_id().to_string(),
            method: ctx.method().to_string(),
            path: ctx.path().to_string(),
            status,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            rejected_by: ctx.rejected_by(),
        }
    }
}

/// Destination for access events.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, event: &RequestEvent) -> Result<(), ObservabilityError>;
}

/// Emits access events through `tracing` under the `access` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

macro_rules! access_event {
    ($level:expr, $event:expr) => {
        tracing::event!(
            target: ACCESS_TARGET,
            $level,
            request_id = %$event.request_id,
            method = %$event.method,
            path = %$event.path,
            status = $event.status,
            duration_ms = $event.duration_ms,
            rejected_by = $event.rejected_by,
            "request completed"
        )
    };
}

impl EventSink for TracingEventSink {
    fn record(&self, event: &RequestEvent) -> Result<(), ObservabilityError> {
        match event.status {
            500.. => access_event!(tracing::Level::ERROR, event),
            400..=499 => access_event!(tracing::Level::WARN, event),
            _ => access_event!(tracing::Level::INFO, event),
        }
        Ok(())
    }
}

fn emit(sink: &dyn EventSink, event: &RequestEvent) {
    if let Err(e) = sink.record(event) {
        tracing::debug!(error = %e, request_id = %event.request_id, "Dropped access event");
    }
}

/// Pipeline stage recording every request it sees.
pub struct RequestLogger {
    sink: Arc<dyn EventSink>,
}

impl RequestLogger {
    pub const NAME: &'static str = "request_logger";

    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

impl Stage for RequestLogger {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Observability
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        async move {
            let mut abandoned = RequestEvent::new(ctx, CLIENT_CLOSED_REQUEST, Duration::ZERO);
            let started: Instant = ctx.started();
            let sink = self.sink.clone();
            let guard = OnAbort::new(move || {
                abandoned.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                emit(sink.as_ref(), &abandoned);
            });

            let response = next.run(ctx, request).await;
            guard.disarm();

            emit(
                self.sink.as_ref(),
                &RequestEvent::new(ctx, response.status().as_u16(), ctx.elapsed()),
            );
            response
        }
        .boxed()
    }

    fn observe_short_circuit(&self, ctx: &RequestContext, response: &Response) {
        emit(
            self.sink.as_ref(),
            &RequestEvent::new(ctx, response.status().as_u16(), ctx.elapsed()),
        );
    }
}
