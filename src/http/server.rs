//! HTTP server setup.
//!
//! # Responsibilities
//! - Mount operational routes next to the business router
//! - Nest the business router under the versioned API prefix
//! - Put every request through the composed pipeline
//! - Attach and propagate `x-request-id`
//!
//! # Design Decisions
//! - The pipeline is composed once here and shared by all requests
//! - Routing happens after the pipeline, so rejected requests never match a route

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::config::Settings;
use crate::health::{self, HEALTH_PATH, METRICS_PATH};
use crate::lifecycle::LifecycleHandle;
use crate::observability::PrometheusMetrics;
use crate::pipeline::{router_endpoint, Observers, Pipeline};

/// Application state injected into operational handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub lifecycle: LifecycleHandle,
    pub metrics: Arc<PrometheusMetrics>,
}

/// HTTP front of the service.
pub struct HttpServer {
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Compose the pipeline around the operational routes and `api`.
    pub fn new(
        settings: Arc<Settings>,
        api: Router,
        observers: Observers,
        metrics: Arc<PrometheusMetrics>,
        lifecycle: LifecycleHandle,
    ) -> Self {
        if settings.is_production() && settings.allowed_hosts.allows_any() {
            tracing::warn!("ALLOWED_HOSTS contains `*` in production; host and origin checks accept everything");
        }

        let enable_metrics = settings.enable_metrics;
        let state = AppState {
            settings: settings.clone(),
            lifecycle,
            metrics,
        };

        let mut routes = Router::new().route(HEALTH_PATH, get(health::health));
        if enable_metrics {
            routes = routes.route(METRICS_PATH, get(health::metrics));
        }
        let inner = routes
            .with_state(state)
            .nest(settings.api_prefix(), api);

        let pipeline = Pipeline::compose(&settings, observers, router_endpoint(inner));
        tracing::debug!(stages = ?pipeline.stage_names(), "Request pipeline composed");

        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Router handing every request to the pipeline.
    pub fn router(&self) -> Router {
        let pipeline = self.pipeline.clone();
        Router::new()
            .fallback(move |request: Request<Body>| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(request).await }
            })
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}
