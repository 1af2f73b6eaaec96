//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count requests and observe their latency
//! - Render the Prometheus text exposition for `GET /metrics`
//! - Optionally serve the exposition on a dedicated listener
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, path, status
//! - `http_request_duration_seconds` (histogram): latency by method, path
//!
//! # Design Decisions
//! - Each service owns its recorder; nothing is installed globally
//! - Numeric and UUID path segments collapse to `{id}`
//! - Requests the router never answered (rejected, 404, disconnected) share
//!   the `unmatched` path label
//! - Histogram buckets tuned for typical web latencies

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use metrics::{describe_counter, describe_histogram, Label, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::lifecycle::{LifecycleError, Resource};
use crate::observability::{ObservabilityError, OnAbort, CLIENT_CLOSED_REQUEST};
use crate::pipeline::{Next, RequestContext, Stage, StageKind};

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Content type of the Prometheus text format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Path label for requests that never matched a route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// 5ms .. 10s
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Label set attached to one observation.
pub type Labels = Vec<(&'static str, String)>;

/// Destination for request metrics.
pub trait MetricsSink: Send + Sync + 'static {
    fn increment(&self, counter: &'static str, labels: &Labels) -> Result<(), ObservabilityError>;

    fn observe(
        &self,
        histogram: &'static str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ObservabilityError>;
}

fn to_labels(labels: &Labels) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.clone()))
        .collect()
}

/// Prometheus-backed sink owned by one service instance.
pub struct PrometheusMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, ObservabilityError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)
            .map_err(|e| ObservabilityError::Metrics(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests handled");
            describe_histogram!(
                REQUEST_DURATION,
                Unit::Seconds,
                "HTTP request duration in seconds"
            );
        });

        Ok(Self { recorder, handle })
    }

    /// Current snapshot in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn increment(&self, counter: &'static str, labels: &Labels) -> Result<(), ObservabilityError> {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(counter, labels).increment(1);
        });
        Ok(())
    }

    fn observe(
        &self,
        histogram: &'static str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ObservabilityError> {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            metrics::histogram!(histogram, labels).record(value);
        });
        Ok(())
    }
}

/// Replace numeric and UUID path segments with `{id}`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_id = (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
                || uuid::Uuid::parse_str(segment).is_ok();
            if is_id {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Label for a response the router produced; 404 means no route matched.
fn routed_path(path: &str, status: u16) -> String {
    if status == 404 {
        UNMATCHED_PATH.to_string()
    } else {
        normalize_path(path)
    }
}

fn record(sink: &dyn MetricsSink, method: &str, path: String, status: u16, elapsed: Duration) {
    let counted: Labels = vec![
        ("method", method.to_string()),
        ("path", path.clone()),
        ("status", status.to_string()),
    ];
    let timed: Labels = vec![("method", method.to_string()), ("path", path)];

    let outcome = sink
        .increment(REQUESTS_TOTAL, &counted)
        .and_then(|_| sink.observe(REQUEST_DURATION, &timed, elapsed.as_secs_f64()));
    if let Err(e) = outcome {
        tracing::debug!(error = %e, "Dropped request metrics");
    }
}

/// Pipeline stage counting and timing every request exactly once.
pub struct MetricsRecorder {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsRecorder {
    pub const NAME: &'static str = "metrics_recorder";

    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl Stage for MetricsRecorder {
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
            let method = ctx.method().to_string();
            let started: Instant = ctx.started();
            let sink = self.sink.clone();
            let guard = OnAbort::new(move || {
                record(
                    sink.as_ref(),
                    &method,
                    UNMATCHED_PATH.to_string(),
                    CLIENT_CLOSED_REQUEST,
                    started.elapsed(),
                );
            });

            let response = next.run(ctx, request).await;
            guard.disarm();

            let status = response.status().as_u16();
            record(
                self.sink.as_ref(),
                ctx.method().as_str(),
                routed_path(ctx.path(), status),
                status,
                ctx.elapsed(),
            );
            response
        }
        .boxed()
    }

    fn observe_short_circuit(&self, ctx: &RequestContext, response: &Response) {
        record(
            self.sink.as_ref(),
            ctx.method().as_str(),
            UNMATCHED_PATH.to_string(),
            response.status().as_u16(),
            ctx.elapsed(),
        );
    }
}

async fn exposition(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        metrics.render(),
    )
}

/// Router serving only `GET /metrics`.
pub fn exposition_router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(exposition))
        .with_state(metrics)
}

struct ExporterTask {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Dedicated exposition listener, started and stopped with the service.
pub struct MetricsExporter {
    address: String,
    metrics: Arc<PrometheusMetrics>,
    task: Mutex<Option<ExporterTask>>,
}

impl MetricsExporter {
    pub fn new(address: impl Into<String>, metrics: Arc<PrometheusMetrics>) -> Self {
        Self {
            address: address.into(),
            metrics,
            task: Mutex::new(None),
        }
    }
}

impl Resource for MetricsExporter {
    fn name(&self) -> &'static str {
        "metrics_exporter"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
        async move {
            let listener = tokio::net::TcpListener::bind(self.address.as_str())
                .await
                .map_err(|source| LifecycleError::Bind {
                    address: self.address.clone(),
                    source,
                })?;
            tracing::info!(address = %self.address, "Metrics exporter listening");

            let (stop, stopped) = oneshot::channel::<()>();
            let app = exposition_router(self.metrics.clone());
            let join = tokio::spawn(async move {
                let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                    let _ = stopped.await;
                });
                if let Err(e) = serve.await {
                    tracing::error!(error = %e, "Metrics exporter failed");
                }
            });

            let mut task = self.task.lock().map_err(|_| LifecycleError::Resource {
                resource: self.name(),
                message: "exporter state poisoned".to_string(),
            })?;
            *task = Some(ExporterTask { stop, join });
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
        async move {
            let task = self
                .task
                .lock()
                .map_err(|_| LifecycleError::Resource {
                    resource: self.name(),
                    message: "exporter state poisoned".to_string(),
                })?
                .take();

            if let Some(ExporterTask { stop, join }) = task {
                let _ = stop.send(());
                join.await.map_err(|e| LifecycleError::Resource {
                    resource: self.name(),
                    message: e.to_string(),
                })?;
            }
            Ok(())
        }
        .boxed()
    }
}
