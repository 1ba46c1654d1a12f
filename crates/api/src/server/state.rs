//! Shared application state injected into every Axum handler.

use std::time::Duration;

use axum::extract::FromRef;

use crate::models::Teacher;
use crate::store::{ConnectionPool, Repository};

/// Application state shared across all request handlers.
///
/// Every field is a cheap handle over shared resources, so Axum can clone
/// the state per request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub teachers: Repository<Teacher>,
}

impl AppState {
    /// Build repositories over `pool`, each bounded by `store_timeout`.
    pub fn new(pool: ConnectionPool, store_timeout: Duration) -> Self {
        Self {
            teachers: Repository::new(pool, store_timeout),
        }
    }

    /// Fresh in-memory database with every table created, for tests.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = ConnectionPool::in_memory().expect("in-memory database");
        let state = Self::new(pool, Duration::from_secs(5));
        state
            .teachers
            .ensure_table()
            .await
            .expect("create teachers table");
        state
    }
}

impl FromRef<AppState> for Repository<Teacher> {
    fn from_ref(state: &AppState) -> Self {
        state.teachers.clone()
    }
}
