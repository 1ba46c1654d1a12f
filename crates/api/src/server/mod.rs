//! Axum HTTP(S) server, routing, and middleware.
//!
//! # Responsibilities
//! - Build the Axum router with the record routes and the interceptor chain.
//! - Inject shared application state (`AppState`) into handlers.
//! - Serve plain HTTP or, when certificates are configured, HTTPS.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;
