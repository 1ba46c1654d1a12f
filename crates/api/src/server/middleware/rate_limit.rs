//! Fixed-window, per-client request counter.
//!
//! # Lifecycle
//!
//! 1. [`limit`] increments the caller's count under one short lock and
//!    rejects with `429` once the count passes the ceiling.
//! 2. [`reset_task`] swaps in an empty map every window. The old map is
//!    dropped after the lock is released.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::ServiceError;
use tokio::time;
use tracing::{debug, warn};

use crate::server::error::ApiError;

/// Shared per-client request counter. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    visitors: Mutex<HashMap<IpAddr, u32>>,
    ceiling: u32,
}

impl RateLimiter {
    /// A limiter allowing `ceiling` requests per client per window.
    pub fn new(ceiling: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                visitors: Mutex::new(HashMap::new()),
                ceiling,
            }),
        }
    }

    /// Count one request from `client`; `false` once it is over the ceiling.
    pub fn check(&self, client: IpAddr) -> bool {
        let mut visitors = self
            .inner
            .visitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = visitors.entry(client).or_insert(0);
        *count = count.saturating_add(1);
        *count <= self.inner.ceiling
    }

    /// Current count for `client` in this window.
    #[cfg(test)]
    pub fn count(&self, client: IpAddr) -> u32 {
        self.inner
            .visitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client)
            .copied()
            .unwrap_or(0)
    }

    /// Start a new window for every client.
    pub fn reset(&self) {
        let previous = {
            let mut visitors = self
                .inner
                .visitors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *visitors)
        };
        debug!(clients = previous.len(), "rate-limit window reset");
    }
}

/// Client identity: the peer IP without its port.
///
/// Requests that carry no connection info (in-process tests) share the
/// unspecified address.
pub fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let client = client_ip(&req);
    if !limiter.check(client) {
        warn!(client = %client, "rate limit exceeded");
        return ApiError(ServiceError::RateLimited).into_response();
    }
    next.run(req).await
}

/// Spawn a background task that resets `limiter` every `window`.
///
/// The first reset fires after one full window.
pub fn reset_task(limiter: RateLimiter, window: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(window);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.reset();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get, Router,
    };
    use tower::ServiceExt;

    fn app(limiter: RateLimiter) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, limit))
    }

    fn from(addr: [u8; 4], port: u16) -> Request {
        let mut req = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((addr, port))));
        req
    }

    #[tokio::test]
    async fn sixth_request_is_rejected_until_reset() {
        let limiter = RateLimiter::new(5);
        let app = app(limiter.clone());

        for _ in 0..5 {
            let resp = app.clone().oneshot(from([10, 0, 0, 1], 4000)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = app.clone().oneshot(from([10, 0, 0, 1], 4000)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        limiter.reset();
        let resp = app.oneshot(from([10, 0, 0, 1], 4000)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn port_does_not_split_a_client() {
        let limiter = RateLimiter::new(1);
        let app = app(limiter.clone());

        let first = app.clone().oneshot(from([10, 0, 0, 2], 1111)).await.unwrap();
        let second = app.clone().oneshot(from([10, 0, 0, 2], 2222)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app.oneshot(from([10, 0, 0, 3], 1111)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[test]
    fn counts_saturate() {
        let limiter = RateLimiter::new(u32::MAX);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        limiter
            .inner
            .visitors
            .lock()
            .unwrap()
            .insert(ip, u32::MAX);
        assert!(limiter.check(ip));
        assert_eq!(limiter.count(ip), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_task_clears_each_window() {
        let limiter = RateLimiter::new(1);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let handle = reset_task(limiter.clone(), Duration::from_secs(60));

        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));

        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.count(ip), 0);
        handle.abort();
    }
}
