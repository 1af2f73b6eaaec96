//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → Origin Policy      (security/cors.rs)
//!     → Host Validation    (security/hosts.rs)
//!     → Security Guard     (security/guard.rs)
//!     → Request Logger     (observability/access_log.rs)
//!     → Metrics Recorder   (observability/metrics.rs)
//!     → Endpoint (operational routes + business router)
//! ```
//!
//! Stages nest: the first stage sees the request first and the response
//! last. A stage that returns without calling [`Next::run`] terminates the
//! chain; stages it never reached are told about the outcome through
//! [`Stage::observe_short_circuit`].

pub mod composer;
pub mod context;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::ServiceExt;

pub use composer::{Observers, Pipeline, PipelineBuilder};
pub use context::RequestContext;

/// Terminal handler invoked after every stage has approved the request.
pub type Endpoint = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an axum router as a pipeline endpoint.
pub fn router_endpoint(router: Router) -> Endpoint {
    Arc::new(move |request: Request<Body>| {
        let router = router.clone();
        async move {
            match router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
        .boxed()
    })
}

/// Whether a stage enforces policy or only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// May reject. Skipped for exempt paths.
    Policy,
    /// Best-effort recording. Never alters the response.
    Observability,
}

/// One interceptor in the fixed-order chain.
///
/// Stages are built once and shared by all in-flight requests, so they hold
/// only configuration and shared sinks.
pub trait Stage: Send + Sync + 'static {
    /// Name used in logs and for rejection attribution.
    fn name(&self) -> &'static str;

    fn kind(&self) -> StageKind;

    /// Handle the request, either answering it or delegating to `next`.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;

    /// Called once for a request that was answered before reaching this stage.
    fn observe_short_circuit(&self, _ctx: &RequestContext, _response: &Response) {}
}

/// Remainder of the chain after the current stage.
///
/// Consumed by [`run`](Next::run), so a stage can delegate at most once.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], endpoint: &'a Endpoint) -> Self {
        Self { stages, endpoint }
    }

    /// Invoke the next stage, or the endpoint when no stages remain.
    pub async fn run(mut self, ctx: &mut RequestContext, request: Request<Body>) -> Response {
        while let Some((stage, rest)) = self.stages.split_first() {
            self.stages = rest;
            ctx.advance();

            if ctx.is_exempt() && stage.kind() == StageKind::Policy {
                tracing::trace!(stage = stage.name(), path = %ctx.path(), "Policy stage skipped");
                continue;
            }

            return stage.process(ctx, request, self).await;
        }

        (self.endpoint)(request).await
    }
}
