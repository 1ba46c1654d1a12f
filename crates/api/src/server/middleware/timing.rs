//! Request timing probe: one log line and one histogram sample per request.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use opentelemetry::{global, metrics::Histogram, KeyValue};
use tracing::info;

use crate::telemetry::SERVICE_NAME;

#[derive(Clone)]
pub struct RequestTimer {
    duration: Histogram<f64>,
}

impl RequestTimer {
    /// Register the duration histogram on the global meter provider.
    pub fn new() -> Self {
        let duration = global::meter(SERVICE_NAME)
            .f64_histogram("http.server.request.duration")
            .with_description("Duration of HTTP server requests, in seconds")
            .init();
        Self { duration }
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Time the rest of the chain. The response passes through unchanged.
pub async fn probe(State(timer): State<RequestTimer>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    let elapsed = start.elapsed();
    let status = resp.status().as_u16();
    info!(
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_secs_f64() * 1000.0,
        "request completed"
    );
    // Path is left out of the labels to keep cardinality bounded.
    timer.duration.record(
        elapsed.as_secs_f64(),
        &[
            KeyValue::new("http.request.method", method.as_str().to_owned()),
            KeyValue::new("http.response.status_code", i64::from(status)),
        ],
    );

    resp
}
