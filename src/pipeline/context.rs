//! Per-request context threaded through the pipeline.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Ephemeral state for one request. Never shared across requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    request_id: String,
    started: Instant,
    exempt: bool,
    cursor: usize,
    status: Option<StatusCode>,
    rejected_by: Option<&'static str>,
}

impl RequestContext {
    pub fn new(request: &Request<Body>, exempt: bool) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            request_id,
            started: Instant::now(),
            exempt,
            cursor: 0,
            status: None,
            rejected_by: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True for operational paths that bypass policy stages.
    pub fn is_exempt(&self) -> bool {
        self.exempt
    }

    /// Final status, set once the chain has produced a response.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Stage that terminated the chain with a rejection, if any.
    pub fn rejected_by(&self) -> Option<&'static str> {
        self.rejected_by
    }

    /// Record that `stage` answered the request with a rejection.
    pub fn reject(&mut self, stage: &'static str, status: StatusCode) {
        self.rejected_by = Some(stage);
        self.status = Some(status);
    }

    pub(crate) fn complete(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Number of stages the request has been handed to (including skipped ones).
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn advance(&mut self) {
        self.cursor += 1;
    }
}
