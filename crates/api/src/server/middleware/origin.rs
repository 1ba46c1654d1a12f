//! Origin gate: allow-list check plus CORS response headers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::ServiceError;
use tracing::warn;

use crate::server::error::ApiError;

const ALLOW_HEADERS: &str = "Content-Type, Authorization";
const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE";
const EXPOSE_HEADERS: &str = "Authorization";
const MAX_AGE_SECS: &str = "3600";

/// Origins permitted to call the API from a browser.
#[derive(Clone, Debug)]
pub struct OriginPolicy {
    allowed: Arc<[String]>,
}

impl OriginPolicy {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Exact, case-sensitive match against the allow-list.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed.iter().any(|o| o == origin)
    }
}

/// Reject requests whose `Origin` is not allowed and decorate the rest with
/// CORS headers.
///
/// Requests without an `Origin` header pass through untouched. An allowed
/// `OPTIONS` pre-flight is answered here with `204` and never reaches the
/// inner stages.
pub async fn gate(State(policy): State<OriginPolicy>, req: Request, next: Next) -> Response {
    let Some(origin) = req.headers().get(header::ORIGIN).cloned() else {
        return next.run(req).await;
    };

    if !origin.to_str().is_ok_and(|o| policy.allows(o)) {
        warn!(origin = ?origin, "origin rejected");
        return ApiError(ServiceError::Forbidden("origin not allowed".into())).into_response();
    }

    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        apply_cors(resp.headers_mut(), origin);
        return resp;
    }

    let mut resp = next.run(req).await;
    apply_cors(resp.headers_mut(), origin);
    resp
}

fn apply_cors(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE_SECS),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}
