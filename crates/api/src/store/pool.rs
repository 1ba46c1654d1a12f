//! [`ConnectionPool`]: a fixed set of SQLite connections handed out on demand.
//!
//! Each slot is a `Mutex<Connection>`; holding the guard *is* holding the
//! connection, so release happens on every exit path when the guard drops.
//! Acquisition blocks, so callers must be on a blocking thread.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tracing::debug;

/// Path value that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// How long SQLite waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced by the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening or configuring a connection failed.
    #[error("failed to open database: {0}")]
    Open(#[from] rusqlite::Error),

    /// A previous holder panicked while using this connection.
    #[error("connection slot poisoned")]
    Poisoned,

    #[error("pool size must be at least 1")]
    Empty,
}

/// A connection borrowed from the pool.
pub type PooledConnection<'a> = MutexGuard<'a, Connection>;

/// Shared handle to the pool. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
}

impl ConnectionPool {
    /// Open `size` connections to the database at `path`.
    ///
    /// [`IN_MEMORY`] opens exactly one connection regardless of `size`, since
    /// every in-memory connection would otherwise see its own empty database.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Empty`] for a zero size and [`PoolError::Open`] if
    /// any connection cannot be opened or configured.
    pub fn open(path: &str, size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::Empty);
        }
        if path == IN_MEMORY {
            return Self::in_memory();
        }

        let mut slots = Vec::with_capacity(size);
        for _ in 0..size {
            slots.push(Mutex::new(open_file(Path::new(path))?));
        }
        debug!(path, size, "opened connection pool");
        Ok(Self::from_slots(slots))
    }

    /// A single-connection pool over a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Open`] if SQLite cannot allocate the database.
    pub fn in_memory() -> Result<Self, PoolError> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self::from_slots(vec![Mutex::new(conn)]))
    }

    fn from_slots(slots: Vec<Mutex<Connection>>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots,
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of connections in the pool.
    pub fn size(&self) -> usize {
        self.inner.slots.len()
    }

    /// Borrow a connection, blocking until one is free.
    ///
    /// Starts at a rotating slot and takes the first idle one; if every slot
    /// is busy, waits on the starting slot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Poisoned`] if the chosen slot was poisoned.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, PoolError> {
        let slots = &self.inner.slots;
        let start = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();

        for offset in 0..slots.len() {
            match slots[(start + offset) % slots.len()].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => return Err(PoolError::Poisoned),
            }
        }

        slots[start].lock().map_err(|_| PoolError::Poisoned)
    }
}

fn open_file(path: &Path) -> Result<Connection, PoolError> {
    let conn = Connection::open_with_flags(path, OpenFlags::default())?;
    configure(&conn)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "configured connection");
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), PoolError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_has_one_slot() {
        let pool = ConnectionPool::open(IN_MEMORY, 8).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn zero_size_rejected() {
        assert!(matches!(ConnectionPool::open(IN_MEMORY, 0), Err(PoolError::Empty)));
    }

    #[test]
    fn connection_released_on_drop() {
        let pool = ConnectionPool::in_memory().unwrap();
        {
            let conn = pool.acquire().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }
        let conn = pool.acquire().unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn busy_slot_is_skipped() {
        let dir = std::env::temp_dir().join(format!("school-api-pool-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pool.db");
        let pool = ConnectionPool::open(path.to_str().unwrap(), 2).unwrap();

        let first = pool.acquire().unwrap();
        // The second acquire must not deadlock on the slot held above.
        let second = pool.acquire().unwrap();
        drop((first, second));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
