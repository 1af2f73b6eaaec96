//! Client-facing rejections produced by policy stages.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

/// A request refused before reaching business logic.
///
/// Bodies carry only a generic reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("disallowed CORS origin")]
    DisallowedOrigin,

    #[error("invalid host header")]
    InvalidHost,

    #[error("request blocked by security rule")]
    Blocked,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::DisallowedOrigin => StatusCode::FORBIDDEN,
            Rejection::InvalidHost | Rejection::Blocked => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        let body = match self {
            // Cross-origin refusals carry no body and no allow-* headers.
            Rejection::DisallowedOrigin => Body::empty(),
            Rejection::InvalidHost => Body::from("Invalid host header"),
            Rejection::Blocked => Body::from("Bad Request"),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        if self == Rejection::DisallowedOrigin {
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        } else {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
        response
    }
}
