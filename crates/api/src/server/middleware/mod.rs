//! The interceptor chain wrapped around every route.
//!
//! Stages run in a fixed order, outermost first:
//!
//! 1. trace span (`TraceLayer`)
//! 2. origin gate ([`origin::gate`])
//! 3. rate limiter ([`rate_limit::limit`])
//! 4. timing probe ([`timing::probe`])
//! 5. request deadline (`TimeoutLayer`, answers `408`)
//! 6. response compression (`CompressionLayer`)
//! 7. parameter pollution filter ([`pollution::filter`])
//!
//! Each stage either answers the request itself or calls `Next::run`.
//! The origin gate sits outside the rate limiter, so rejected origins are
//! never counted.

pub mod origin;
pub mod pollution;
pub mod rate_limit;
pub mod timing;

use std::time::Duration;

use axum::{body::Body, middleware::from_fn_with_state, Router};
use tower::ServiceBuilder;
use tower_http::{
    compression::{CompressionBody, CompressionLayer},
    map_response_body::MapResponseBodyLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::Config;

pub use origin::OriginPolicy;
pub use pollution::PollutionPolicy;
pub use rate_limit::RateLimiter;
pub use timing::RequestTimer;

/// State for every stage of the chain.
#[derive(Clone)]
pub struct Interceptors {
    pub origin: OriginPolicy,
    pub rate_limiter: RateLimiter,
    pub timer: RequestTimer,
    pub request_timeout: Duration,
    pub pollution: PollutionPolicy,
}

impl Interceptors {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            origin: OriginPolicy::new(cfg.allowed_origins.iter().cloned()),
            rate_limiter: RateLimiter::new(cfg.rate_limit_max),
            timer: RequestTimer::new(),
            request_timeout: cfg.request_timeout(),
            pollution: PollutionPolicy::from_config(cfg),
        }
    }
}

/// Wrap `router` in the interceptor chain.
pub fn apply<S>(router: Router<S>, interceptors: &Interceptors) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn_with_state(interceptors.origin.clone(), origin::gate))
            .layer(from_fn_with_state(
                interceptors.rate_limiter.clone(),
                rate_limit::limit,
            ))
            .layer(from_fn_with_state(interceptors.timer.clone(), timing::probe))
            .layer(TimeoutLayer::new(interceptors.request_timeout))
            // Erase the compression body type; the deadline needs a defaultable body.
            .layer(MapResponseBodyLayer::new(Body::new::<CompressionBody<Body>>))
            .layer(CompressionLayer::new())
            .layer(from_fn_with_state(
                interceptors.pollution.clone(),
                pollution::filter,
            )),
    )
}
