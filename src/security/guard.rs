//! Denylist inspection of request content.
//!
//! # Responsibilities
//! - Match path, query and header values against injection patterns
//! - Reject matching requests before business logic runs
//!
//! # Design Decisions
//! - Inspection is read-only; passing requests are forwarded untouched
//! - The body is never read, so streaming uploads are unaffected
//! - Credentials headers are not inspected (they are opaque tokens)
//! - Values are percent-decoded up to twice to catch double encoding

use std::borrow::Cow;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use regex::RegexSet;

use crate::pipeline::{Next, RequestContext, Stage, StageKind};
use crate::security::rejection::Rejection;

const DECODE_PASSES: usize = 2;

/// A named family of patterns.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub pattern: &'static str,
}

/// Built-in denylist.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule { name: "sql_injection", pattern: r"(?i)\bunion\b\s+(all\s+)?select\b" },
    Rule { name: "sql_injection", pattern: r"(?i)\b(drop|truncate|alter)\s+table\b" },
    Rule { name: "sql_injection", pattern: r"(?i)\binsert\s+into\b.+\bvalues\b" },
    Rule { name: "sql_injection", pattern: r"(?i)\bdelete\s+from\b" },
    Rule { name: "sql_injection", pattern: r"(?i)'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+" },
    Rule { name: "script_injection", pattern: r"(?i)<\s*script\b" },
    Rule { name: "script_injection", pattern: r"(?i)javascript\s*:" },
    Rule { name: "script_injection", pattern: r"(?i)\bon(error|load|click|mouseover|focus)\s*=" },
    Rule { name: "path_traversal", pattern: r"\.\.[/\\]" },
    Rule { name: "path_traversal", pattern: r"(?i)/etc/(passwd|shadow)\b" },
    Rule { name: "command_injection", pattern: r"(;|\|\|?|&&)\s*(rm|cat|wget|curl|nc|bash|sh)\b" },
    Rule { name: "command_injection", pattern: r"\$\([^)]*\)" },
];

/// Pipeline stage rejecting requests that carry known attack payloads.
#[derive(Debug, Clone)]
pub struct SecurityGuard {
    set: RegexSet,
    names: Vec<&'static str>,
}

impl SecurityGuard {
    pub const NAME: &'static str = "security_guard";

    pub fn new() -> Self {
        // Built-in patterns are fixed literals covered by tests.
        Self::with_rules(DEFAULT_RULES).expect("built-in security rules compile")
    }

    pub fn with_rules(rules: &[Rule]) -> Result<Self, regex::Error> {
        let set = RegexSet::new(rules.iter().map(|r| r.pattern))?;
        Ok(Self {
            set,
            names: rules.iter().map(|r| r.name).collect(),
        })
    }

    /// Name of the first rule matching `value`, if any.
    pub fn check(&self, value: &str) -> Option<&'static str> {
        let mut current: Cow<'_, str> = Cow::Borrowed(value);
        for pass in 0..=DECODE_PASSES {
            if let Some(index) = self.set.matches(&current).iter().next() {
                return Some(self.names[index]);
            }
            if pass == DECODE_PASSES {
                break;
            }
            let decoded = decode(&current);
            if decoded == current {
                break;
            }
            current = Cow::Owned(decoded);
        }
        None
    }

    /// Inspect everything but the body.
    pub fn inspect(&self, request: &Request<Body>) -> Option<&'static str> {
        let uri = request.uri();
        self.check(uri.path())
            .or_else(|| uri.query().and_then(|q| self.check(q)))
            .or_else(|| self.inspect_headers(request.headers()))
    }

    fn inspect_headers(&self, headers: &HeaderMap) -> Option<&'static str> {
        headers
            .iter()
            .filter(|(name, _)| **name != header::AUTHORIZATION && **name != header::COOKIE)
            .find_map(|(_, value)| self.check(&String::from_utf8_lossy(value.as_bytes())))
    }
}

impl Default for SecurityGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Form-style decode: `+` is a space, then percent-decoding.
fn decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Stage for SecurityGuard {
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
            match self.inspect(&request) {
                None => next.run(ctx, request).await,
                Some(rule) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        rule,
                        path = %ctx.path(),
                        "Blocked request matching security rule"
                    );
                    let rejection = Rejection::Blocked;
                    ctx.reject(Self::NAME, rejection.status());
                    rejection.into_response()
                }
            }
        }
        .boxed()
    }
}
