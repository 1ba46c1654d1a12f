//! `school-api`: teacher records service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP export).
//! 3. Open the SQLite connection pool and create missing tables.
//! 4. Spawn background tasks: rate-limit window reset.
//! 5. Build the Axum router and its interceptor chain.
//! 6. Serve HTTPS when certificates are configured, plain HTTP otherwise,
//!    until Ctrl-C.

mod config;
mod models;
mod schema;
mod server;
mod store;
mod telemetry;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use config::Config;
use server::middleware::{rate_limit, Interceptors};
use server::state::AppState;
use store::ConnectionPool;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        "school-api starting"
    );

    // -----------------------------------------------------------------------
    // 3. Store
    // -----------------------------------------------------------------------
    let pool = ConnectionPool::open(&cfg.database_path, cfg.db_pool_size)
        .with_context(|| format!("failed to open database {}", cfg.database_path))?;
    let state = AppState::new(pool.clone(), cfg.store_timeout());
    state
        .teachers
        .ensure_table()
        .await
        .context("failed to create teachers table")?;
    info!(
        database = %cfg.database_path,
        connections = pool.size(),
        "store ready"
    );

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------
    let interceptors = Interceptors::from_config(&cfg);
    let _rate_limit_reset =
        rate_limit::reset_task(interceptors.rate_limiter.clone(), cfg.rate_limit_window());

    // -----------------------------------------------------------------------
    // 5. Router
    // -----------------------------------------------------------------------
    let router = server::router::build(state, &interceptors);

    // -----------------------------------------------------------------------
    // 6. HTTP(S) server
    // -----------------------------------------------------------------------
    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    match cfg.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = server::tls::load_server_config(cert_path, key_path)?;
            info!(addr = %addr, "listening (https)");
            server::tls::serve_tls(listener, router, tls_config, shutdown_signal()).await?;
        }
        None => {
            info!(addr = %addr, "listening (http)");
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;
        }
    }

    info!("school-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }
}
