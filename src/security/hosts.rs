//! Host header validation.
//!
//! # Responsibilities
//! - Reject requests whose target host is not in the allow-list
//! - Support `*` and `*.domain` wildcard entries
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Port is ignored when comparing
//! - Missing host header is a rejection, not a pass

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::Settings;
use crate::pipeline::{Next, RequestContext, Stage, StageKind};
use crate::security::rejection::Rejection;

/// One allow-list entry interpreted as a host pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// `*`
    Any,
    /// `*.example.com`, stored as `.example.com`. Any other `*` entry is exact.
    Subdomain(String),
    Exact(String),
}

impl HostPattern {
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim().to_ascii_lowercase();
        if entry == "*" {
            HostPattern::Any
        } else if entry.starts_with("*.") && entry.len() > 2 {
            HostPattern::Subdomain(entry[1..].to_string())
        } else {
            HostPattern::Exact(entry)
        }
    }

    /// `host` must already be lowercased and stripped of its port.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Any => true,
            HostPattern::Subdomain(suffix) => host.ends_with(suffix.as_str()),
            HostPattern::Exact(expected) => host == expected,
        }
    }
}

/// Compiled allow-list of host patterns.
#[derive(Debug, Clone)]
pub struct HostAllowList {
    patterns: Vec<HostPattern>,
}

impl HostAllowList {
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            patterns: entries.into_iter().map(HostPattern::parse).collect(),
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.patterns.iter().any(|p| p.matches(&host))
    }
}

/// Strip an optional `:port` suffix, keeping bracketed IPv6 literals intact.
pub fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    authority.split(':').next().unwrap_or(authority)
}

fn request_host(request: &Request<Body>) -> Option<String> {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))?;

    let host = strip_port(raw.trim());
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Pipeline stage rejecting requests for hosts this service does not serve.
#[derive(Debug, Clone)]
pub struct HostValidation {
    allowed: HostAllowList,
}

impl HostValidation {
    pub const NAME: &'static str = "host_validation";

    pub fn new(allowed: HostAllowList) -> Self {
        Self { allowed }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(HostAllowList::new(settings.allowed_hosts.iter()))
    }
}

impl Stage for HostValidation {
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
            match request_host(&request) {
                Some(host) if self.allowed.is_allowed(&host) => next.run(ctx, request).await,
                host => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        host = host.as_deref().unwrap_or("<missing>"),
                        "Rejected request for untrusted host"
                    );
                    let rejection = Rejection::InvalidHost;
                    ctx.reject(Self::NAME, rejection.status());
                    rejection.into_response()
                }
            }
        }
        .boxed()
    }
}
