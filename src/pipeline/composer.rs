//! Fixed-order pipeline composition.
//!
//! # Responsibilities
//! - Assemble stages into one ordered chain ending at the endpoint
//! - Mark operational paths that bypass policy stages
//! - Notify unreached stages when a request is answered early
//!
//! # Design Decisions
//! - Composition happens once at startup; the chain is shared by all requests
//! - Order is an explicit `Vec`, first entry outermost
//! - Same settings always produce an equivalent chain

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::config::Settings;
use crate::health::HEALTH_PATH;
use crate::observability::access_log::{EventSink, RequestLogger};
use crate::observability::metrics::{MetricsRecorder, MetricsSink};
use crate::pipeline::{Endpoint, Next, RequestContext, Stage};
use crate::security::cors::OriginPolicy;
use crate::security::guard::SecurityGuard;
use crate::security::hosts::HostValidation;

/// Sinks the observability stages report to.
#[derive(Clone)]
pub struct Observers {
    pub events: Arc<dyn EventSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// The composed request chain.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    endpoint: Endpoint,
    exempt_paths: Vec<String>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build the standard five-stage chain around `endpoint`.
    pub fn compose(settings: &Settings, observers: Observers, endpoint: Endpoint) -> Self {
        Pipeline::builder()
            .stage(OriginPolicy::from_settings(settings))
            .stage(HostValidation::from_settings(settings))
            .stage(SecurityGuard::new())
            .stage(RequestLogger::new(observers.events))
            .stage(MetricsRecorder::new(observers.metrics))
            .exempt(HEALTH_PATH)
            .build(endpoint)
    }

    /// Run one request through every stage and the endpoint.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let exempt = self.is_exempt(request.uri().path());
        let mut ctx = RequestContext::new(&request, exempt);

        let response = Next::new(&self.stages, &self.endpoint)
            .run(&mut ctx, request)
            .await;

        ctx.complete(response.status());
        let reached = ctx.cursor().min(self.stages.len());
        for stage in &self.stages[reached..] {
            stage.observe_short_circuit(&ctx, &response);
        }

        response
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Builder for a [`Pipeline`]. Stages run in the order they are added.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    exempt_paths: Vec<String>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Exclude an exact path from policy stages.
    pub fn exempt(mut self, path: impl Into<String>) -> Self {
        self.exempt_paths.push(path.into());
        self
    }

    pub fn build(self, endpoint: Endpoint) -> Pipeline {
        Pipeline {
            stages: self.stages,
            endpoint,
            exempt_paths: self.exempt_paths,
        }
    }
}
