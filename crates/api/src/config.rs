//! Configuration loading and validation.
//!
//! All values are read from environment variables at startup. List-valued
//! variables (`ALLOWED_ORIGINS`, `HPP_ALLOWED_PARAMS`,
//! `HPP_MULTI_VALUE_PARAMS`) are comma separated. The process exits with a
//! clear error message if any variable is present but invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const LIST_KEYS: [&str; 3] = [
    "allowed_origins",
    "hpp_allowed_params",
    "hpp_multi_value_params",
];

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP(S) server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Connections opened for a file database.
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: usize,

    /// Upper bound on a single repository call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    /// Upper bound on a whole request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Requests allowed per client per window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,

    /// Origins that may call the API from a browser.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub hpp_check_query: bool,

    #[serde(default = "default_true")]
    pub hpp_check_body: bool,

    /// Body parameters are filtered only for `POST`s carrying this content type.
    #[serde(default = "default_hpp_content_type")]
    pub hpp_body_content_type: String,

    /// Parameters that survive the pollution filter. Empty keeps everything.
    #[serde(default = "default_hpp_allowed_params")]
    pub hpp_allowed_params: Vec<String>,

    /// Parameters allowed to repeat.
    #[serde(default = "default_hpp_multi_value_params")]
    pub hpp_multi_value_params: Vec<String>,

    /// PEM certificate chain. Set together with `tls_key_path` to serve HTTPS.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// OTLP/gRPC collector endpoint. Export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    3000
}
fn default_database_path() -> String {
    crate::store::IN_MEMORY.into()
}
fn default_db_pool_size() -> usize {
    4
}
fn default_store_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    30
}
fn default_rate_limit_max() -> u32 {
    50
}
fn default_rate_limit_window() -> u64 {
    60
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://my-origin.url".into(),
        "https://www.myfrontend.com".into(),
        "https://localhost:3000".into(),
    ]
}
fn default_true() -> bool {
    true
}
fn default_hpp_content_type() -> String {
    "application/x-www-form-urlencoded".into()
}
fn default_hpp_allowed_params() -> Vec<String> {
    ["sortby", "first_name", "last_name", "email", "class", "subject"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_hpp_multi_value_params() -> Vec<String> {
    vec!["sortby".into()]
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let mut env = config::Environment::default()
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.database_path, "DATABASE_PATH")?;
        ensure_non_empty(&self.hpp_body_content_type, "HPP_BODY_CONTENT_TYPE")?;

        if self.db_pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be > 0");
        }
        if self.store_timeout_secs == 0 {
            anyhow::bail!("STORE_TIMEOUT_SECS must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        if self.rate_limit_max == 0 {
            anyhow::bail!("RATE_LIMIT_MAX must be > 0");
        }
        if self.rate_limit_window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be > 0");
        }
        if self.allowed_origins.iter().any(|o| o.trim().is_empty()) {
            anyhow::bail!("ALLOWED_ORIGINS must not contain empty entries");
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => {
                ensure_non_empty(cert, "TLS_CERT_PATH")?;
                ensure_non_empty(key, "TLS_KEY_PATH")?;
            }
            (None, None) => {}
            _ => anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together"),
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Certificate and key paths when HTTPS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }
}

impl Default for Config {
    /// The configuration produced by an empty environment.
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: default_database_path(),
            db_pool_size: default_db_pool_size(),
            store_timeout_secs: default_store_timeout(),
            request_timeout_secs: default_request_timeout(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window(),
            allowed_origins: default_allowed_origins(),
            hpp_check_query: true,
            hpp_check_body: true,
            hpp_body_content_type: default_hpp_content_type(),
            hpp_allowed_params: default_hpp_allowed_params(),
            hpp_multi_value_params: default_hpp_multi_value_params(),
            tls_cert_path: None,
            tls_key_path: None,
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(())
}
