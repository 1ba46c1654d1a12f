//! SQLite persistence for schema-described records.
//!
//! # Responsibilities
//!
//! - Own the [`ConnectionPool`] and hand connections to blocking tasks.
//! - Translate record operations into parameterized statements built from
//!   the record's [`AttributeSchema`](crate::schema::AttributeSchema).
//! - Own transaction boundaries for batch operations.
//!
//! # Module invariants
//!
//! - Every call runs on a blocking thread and is bounded by the store timeout.
//!   A call that exceeds it is interrupted; an open transaction rolls back.
//! - `create` is best-effort per item: rows inserted before a failure stay.
//! - `patch_many` and `delete_many` are all-or-nothing.

pub mod pool;
pub mod query;

pub use pool::{ConnectionPool, PoolError, IN_MEMORY};
pub use query::{ListQuery, QueryBuilder};

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::ServiceError;
use rusqlite::{
    params_from_iter, Connection, InterruptHandle, OptionalExtension, Row, Transaction,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::schema::{project, AttrKind, AttrValue, Projection, ProjectionError, Record};

/// Errors produced by [`Repository`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// A batch item failed validation before any store access.
    #[error("item {index}: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("batch must contain at least one item")]
    EmptyBatch,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("store operation exceeded {0:?}")]
    Timeout(Duration),

    /// The blocking task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            StoreError::Projection(ProjectionError::TypeMismatch { key, expected }) => {
                ServiceError::TypeMismatch { key, expected }
            }
            StoreError::InvalidItem { .. } | StoreError::EmptyBatch => {
                ServiceError::BadRequest(err.to_string())
            }
            StoreError::Timeout(_) => ServiceError::Timeout(err.to_string()),
            StoreError::Database(_) | StoreError::Pool(_) | StoreError::Join(_) => {
                ServiceError::Store(err.to_string())
            }
        }
    }
}

/// CRUD and batch operations for record type `R`.
///
/// Cheap to clone; every clone shares the same pool.
pub struct Repository<R> {
    pool: ConnectionPool,
    timeout: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            timeout: self.timeout,
            _record: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for Repository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("pool_size", &self.pool.size())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<R: Record> Repository<R> {
    pub fn new(pool: ConnectionPool, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            _record: PhantomData,
        }
    }

    /// Run `f` with a pooled connection on a blocking thread, bounded by the
    /// store timeout.
    ///
    /// On timeout the running statement is interrupted, and a call still
    /// waiting for a connection gives up as soon as it gets one. A call that
    /// completes between the deadline and the interrupt is still reported as
    /// [`StoreError::Timeout`], even if its writes committed.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let deadline = self.timeout;
        let (handle_tx, mut handle_rx) = oneshot::channel();
        let in_flight = Arc::new(InFlight::default());
        let worker = Arc::clone(&in_flight);

        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.acquire()?;
            if handle_tx.send(conn.get_interrupt_handle()).is_err() {
                return Err(StoreError::Timeout(deadline));
            }
            let result = f(&mut *conn);
            // Mark completion before the slot is released to the next caller.
            worker.finish();
            drop(conn);
            result
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Join(join.to_string())),
            Err(_) => {
                handle_rx.close();
                if let Ok(handle) = handle_rx.try_recv() {
                    in_flight.interrupt(&handle);
                }
                warn!(op, timeout = ?deadline, "store operation timed out");
                Err(StoreError::Timeout(deadline))
            }
        }
    }

    /// Create the record table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        self.run("ensure_table", |conn| {
            conn.execute_batch(&query::create_table(R::schema()))?;
            Ok(())
        })
        .await
    }

    /// Round-trip a trivial statement through the pool.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.run("ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Every record matching `filter`, in the requested order.
    pub async fn get_all(&self, filter: ListQuery) -> Result<Vec<R>, StoreError> {
        self.run("get_all", move |conn| {
            let stmt = QueryBuilder::new(query::select_all(R::schema()))
                .apply(&filter)
                .build();
            debug!(sql = %stmt.sql, args = stmt.args.len(), "list query");

            let mut prepared = conn.prepare(&stmt.sql)?;
            let rows = prepared.query_map(params_from_iter(stmt.args.iter()), read_record::<R>)?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    pub async fn get_one(&self, id: i64) -> Result<R, StoreError> {
        self.run("get_one", move |conn| fetch::<R>(conn, id)?.ok_or_else(|| not_found::<R>(id)))
            .await
    }

    /// Insert `records` in order and return them with their assigned ids.
    ///
    /// Each insert commits on its own; a failure stops the batch and earlier
    /// inserts remain.
    pub async fn create(&self, records: Vec<R>) -> Result<Vec<R>, StoreError> {
        if records.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        self.run("create", move |conn| {
            let sql = query::insert(R::schema());
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut created = Vec::with_capacity(records.len());
            for mut record in records {
                let id = stmt.insert(params_from_iter(record.insert_values()))?;
                record.set_id(id);
                created.push(record);
            }
            Ok(created)
        })
        .await
    }

    /// Overwrite every attribute of record `id` with `record`.
    pub async fn replace(&self, id: i64, mut record: R) -> Result<R, StoreError> {
        record.set_id(id);
        self.run("replace", move |conn| {
            let changed = conn.execute(
                &query::update_by_id(R::schema()),
                params_from_iter(record.update_values()),
            )?;
            if changed == 0 {
                return Err(not_found::<R>(id));
            }
            Ok(record)
        })
        .await
    }

    /// Merge `payload` into record `id` and write the result back.
    pub async fn patch_one(&self, id: i64, payload: Map<String, Value>) -> Result<R, StoreError> {
        self.run("patch_one", move |conn| {
            in_transaction(conn, |tx| {
                let existing = fetch::<R>(tx, id)?.ok_or_else(|| not_found::<R>(id))?;
                let updated = project(&existing, &payload)?;
                write_back(tx, &updated)?;
                Ok(updated)
            })
        })
        .await
    }

    pub async fn delete_one(&self, id: i64) -> Result<(), StoreError> {
        self.run("delete_one", move |conn| {
            let changed = conn.execute(&query::delete_by_id(R::schema()), [id])?;
            if changed == 0 {
                return Err(not_found::<R>(id));
            }
            Ok(())
        })
        .await
    }

    /// Apply a partial update to each item's record in one transaction.
    ///
    /// Every item is validated before the store is touched. Any failure
    /// rolls back the whole batch.
    pub async fn patch_many(&self, items: Vec<Map<String, Value>>) -> Result<(), StoreError> {
        if items.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let identity = R::schema().identity().key;
        let mut batch = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let id = item
                .get(identity)
                .and_then(parse_item_id)
                .ok_or_else(|| StoreError::InvalidItem {
                    index,
                    reason: format!("missing or invalid `{identity}`"),
                })?;
            batch.push((id, Projection::<R>::compile(item)?));
        }

        self.run("patch_many", move |conn| {
            in_transaction(conn, |tx| {
                for (id, projection) in batch {
                    let mut record = fetch::<R>(tx, id)?.ok_or_else(|| not_found::<R>(id))?;
                    projection.apply(&mut record);
                    write_back(tx, &record)?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Delete every id in one transaction and return the deleted ids.
    ///
    /// An id that matches no row rolls back the whole batch.
    pub async fn delete_many(&self, ids: Vec<i64>) -> Result<Vec<i64>, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        self.run("delete_many", move |conn| {
            in_transaction(conn, |tx| {
                let mut stmt = tx.prepare_cached(&query::delete_by_id(R::schema()))?;
                for &id in &ids {
                    if stmt.execute([id])? == 0 {
                        return Err(not_found::<R>(id));
                    }
                }
                Ok(ids)
            })
        })
        .await
    }
}

/// Completion marker shared between a blocking store call and its deadline.
///
/// The interrupt and the completion flag are serialized by one lock, so an
/// interrupt can only land while the call still holds its connection.
#[derive(Debug, Default)]
struct InFlight {
    finished: Mutex<bool>,
}

impl InFlight {
    fn finish(&self) {
        *self.lock() = true;
    }

    /// Interrupt `handle` unless the call already finished. Returns whether
    /// the interrupt was sent.
    fn interrupt(&self, handle: &InterruptHandle) -> bool {
        let finished = self.lock();
        if *finished {
            return false;
        }
        handle.interrupt();
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found<R: Record>(id: i64) -> StoreError {
    StoreError::NotFound {
        entity: R::schema().entity,
        id,
    }
}

/// Batch identities may arrive as JSON integers or numeric strings.
fn parse_item_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode a row selected in schema column order.
fn read_record<R: Record>(row: &Row<'_>) -> rusqlite::Result<R> {
    let mut record = R::default();
    for (idx, attr) in R::schema().attributes.iter().enumerate() {
        let value = match attr.kind {
            AttrKind::Text => row.get::<_, Option<String>>(idx)?.map(AttrValue::Text),
            AttrKind::Integer => row.get::<_, Option<i64>>(idx)?.map(AttrValue::Integer),
        };
        (attr.set)(&mut record, value.unwrap_or(AttrValue::Null));
    }
    Ok(record)
}

fn fetch<R: Record>(conn: &Connection, id: i64) -> Result<Option<R>, StoreError> {
    let mut stmt = conn.prepare_cached(&query::select_by_id(R::schema()))?;
    Ok(stmt.query_row([id], read_record::<R>).optional()?)
}

fn write_back<R: Record>(conn: &Connection, record: &R) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(&query::update_by_id(R::schema()))?;
    stmt.execute(params_from_iter(record.update_values()))?;
    Ok(())
}

/// Run `f` inside a transaction: commit on success, roll back explicitly on
/// failure and return the original error.
fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let tx = conn.transaction()?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
