//! Structured logging, tracing, and metrics setup.
//!
//! Logs are always emitted as JSON on stdout. When an OTLP endpoint is
//! configured, spans and metrics are also exported over gRPC.
//!
//! # Telemetry invariants
//!
//! - Record payloads and query values never appear in span attributes,
//!   metric labels, or log fields.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::init_telemetry;

/// Service name reported in the OTEL resource and used as the meter name.
pub const SERVICE_NAME: &str = "school-api";
