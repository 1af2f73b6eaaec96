//! Cross-origin request policy.
//!
//! # Responsibilities
//! - Answer preflight requests from allowed origins
//! - Decorate responses to allowed cross-origin requests
//! - Refuse requests from origins outside the allow-list
//!
//! # Design Decisions
//! - Requests without an `Origin` header are not cross-origin and pass through
//! - An allow-list entry matches either the full origin or the origin's host
//! - Refusals terminate the chain with no body and no allow-* headers

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::Settings;
use crate::pipeline::{Next, RequestContext, Stage, StageKind};
use crate::security::hosts::{strip_port, HostAllowList};
use crate::security::rejection::Rejection;

const ALLOWED_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";
const PREFLIGHT_MAX_AGE_SECS: u32 = 600;

/// Pipeline stage enforcing the origin allow-list.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    origins: Vec<String>,
    hosts: HostAllowList,
    max_age: u32,
}

impl OriginPolicy {
    pub const NAME: &'static str = "origin_policy";

    pub fn new<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        let entries: Vec<&str> = entries.into_iter().map(str::trim).collect();
        Self {
            origins: entries
                .iter()
                .map(|e| e.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
            hosts: HostAllowList::new(entries.iter().copied()),
            max_age: PREFLIGHT_MAX_AGE_SECS,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.allowed_hosts.iter())
    }

    /// True if `origin` (e.g. `https://app.example.com:8443`) may call us.
    pub fn is_allowed(&self, origin: &str) -> bool {
        let normalized = origin.trim_end_matches('/').to_ascii_lowercase();
        if self.origins.iter().any(|o| o == "*" || *o == normalized) {
            return true;
        }

        match url::Url::parse(&normalized) {
            Ok(url) => url
                .host_str()
                .map(|host| self.hosts.is_allowed(strip_port(host)))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn preflight_response(&self, origin: &HeaderValue, request_headers: &HeaderMap) -> Response {
        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        if let Some(requested) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age));
        headers.append(VARY, HeaderValue::from_static("Origin"));
        response
    }
}

fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

impl Stage for OriginPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Policy
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        async move {
            let Some(origin) = request.headers().get(ORIGIN).cloned() else {
                return next.run(ctx, request).await;
            };

            let allowed = origin
                .to_str()
                .map(|o| self.is_allowed(o))
                .unwrap_or(false);

            if !allowed {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    origin = ?origin,
                    "Rejected cross-origin request"
                );
                let rejection = Rejection::DisallowedOrigin;
                ctx.reject(Self::NAME, rejection.status());
                return rejection.into_response();
            }

            if is_preflight(&request) {
                return self.preflight_response(&origin, request.headers());
            }

            let mut response = next.run(ctx, request).await;
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.append(VARY, HeaderValue::from_static("Origin"));
            response
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Endpoint, Pipeline};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pipeline(entries: &[&str], hits: Arc<AtomicUsize>) -> Pipeline {
        let endpoint: Endpoint = Arc::new(move |_req: Request<Body>| {
            hits.fetch_add(1, Ordering::SeqCst);
            async { StatusCode::OK.into_response() }.boxed()
        });
        Pipeline::builder()
            .stage(OriginPolicy::new(entries.iter().copied()))
            .build(endpoint)
    }

    #[test]
    fn test_origin_matching() {
        let policy = OriginPolicy::new(["https://app.example.org", "localhost", "*.example.com"]);
        assert!(policy.is_allowed("https://app.example.org"));
        assert!(policy.is_allowed("https://APP.example.org/"));
        assert!(policy.is_allowed("http://localhost:3000"));
        assert!(policy.is_allowed("https://api.example.com"));
        assert!(!policy.is_allowed("https://evil.test"));
        assert!(!policy.is_allowed("null"));
    }

    #[tokio::test]
    async fn test_same_origin_request_passes_untouched() {
        let hits = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&["localhost"], hits.clone());
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();

        let response = p.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_allowed_origin_is_decorated() {
        let hits = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&["localhost"], hits.clone());
        let req = Request::builder()
            .uri("/x")
            .header(ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();

        let response = p.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(response.headers().get(VARY).unwrap(), "Origin");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disallowed_origin_never_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&["localhost"], hits.clone());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/x")
            .header(ORIGIN, "https://evil.test")
            .body(Body::empty())
            .unwrap();

        let response = p.handle(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preflight_answered_without_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&["localhost"], hits.clone());
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/x")
            .header(ORIGIN, "http://localhost:5173")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .header(ACCESS_CONTROL_REQUEST_HEADERS, "content-type, x-token")
            .body(Body::empty())
            .unwrap();

        let response = p.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), ALLOWED_METHODS);
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "content-type, x-token"
        );
        assert_eq!(headers.get(ACCESS_CONTROL_MAX_AGE).unwrap(), "600");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
