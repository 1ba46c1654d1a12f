//! HTTP parameter pollution filter.
//!
//! Rewrites the query string and, for form-encoded `POST`s, the body so that
//! only allow-listed parameters survive and repeated parameters collapse to
//! their first value. Parameters listed as multi-value keep every value.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, uri::PathAndQuery, Method, Uri},
    middleware::Next,
    response::Response,
};
use url::form_urlencoded;

use crate::config::Config;
use crate::server::error::ApiError;

/// Largest form body the filter will buffer.
const MAX_FORM_BODY: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct PollutionPolicy {
    check_query: bool,
    check_body: bool,
    body_content_type: Arc<str>,
    /// Empty keeps every parameter.
    allowed: Arc<[String]>,
    multi_value: Arc<[String]>,
}

impl PollutionPolicy {
    pub fn new(
        check_query: bool,
        check_body: bool,
        body_content_type: &str,
        allowed: Vec<String>,
        multi_value: Vec<String>,
    ) -> Self {
        Self {
            check_query,
            check_body,
            body_content_type: body_content_type.into(),
            allowed: allowed.into(),
            multi_value: multi_value.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.hpp_check_query,
            cfg.hpp_check_body,
            &cfg.hpp_body_content_type,
            cfg.hpp_allowed_params.clone(),
            cfg.hpp_multi_value_params.clone(),
        )
    }

    fn keeps(&self, key: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|k| k == key)
    }

    fn repeats(&self, key: &str) -> bool {
        self.multi_value.iter().any(|k| k == key)
    }

    /// Filter an `application/x-www-form-urlencoded` parameter list.
    pub fn sanitize(&self, raw: &[u8]) -> String {
        let mut seen: Vec<String> = Vec::new();
        let mut out = form_urlencoded::Serializer::new(String::new());

        for (key, value) in form_urlencoded::parse(raw) {
            if !self.keeps(&key) {
                continue;
            }
            if !self.repeats(&key) {
                if seen.iter().any(|k| *k == key) {
                    continue;
                }
                seen.push(key.to_string());
            }
            out.append_pair(&key, &value);
        }

        out.finish()
    }

    fn filters_body_of(&self, req: &Request) -> bool {
        self.check_body
            && req.method() == Method::POST
            && req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains(&*self.body_content_type))
    }
}

pub async fn filter(
    State(policy): State<PollutionPolicy>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if policy.check_query {
        if let Some(query) = req.uri().query() {
            let cleaned = policy.sanitize(query.as_bytes());
            set_query(&mut req, &cleaned)?;
        }
    }

    if policy.filters_body_of(&req) {
        let (mut parts, body) = req.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BODY)
            .await
            .map_err(|_| ApiError::bad_request("form body too large or unreadable"))?;
        let cleaned = policy.sanitize(&bytes);
        parts.headers.remove(header::CONTENT_LENGTH);
        req = Request::from_parts(parts, Body::from(cleaned));
    }

    Ok(next.run(req).await)
}

fn set_query(req: &mut Request, query: &str) -> Result<(), ApiError> {
    let path_and_query = if query.is_empty() {
        req.uri().path().to_owned()
    } else {
        format!("{}?{query}", req.uri().path())
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|_| ApiError::bad_request("invalid query string"))?,
    );
    *req.uri_mut() =
        Uri::from_parts(parts).map_err(|_| ApiError::bad_request("invalid request URI"))?;
    Ok(())
}
