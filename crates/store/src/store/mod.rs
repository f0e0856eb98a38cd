mod history;
mod scd2;
mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use histo_core::config::StoreConfig;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

/// Name of the audit log table.
pub const HISTORY_TABLE: &str = "ingestion_history";

/// `valid_to` of a version that has not been superseded.
pub const OPEN_ENDED_VALID_TO: &str = "9999-12-31T00:00:00+00:00";

/// SQLite-backed versioned store: job history plus SCD2 entity tables.
///
/// All reads and writes go through one connection behind a re-entrant lock,
/// so a `VersionedStore` can be shared as `Arc<VersionedStore>` between
/// threads and behaves as if single-threaded. The lock is re-entrant because
/// [`upsert`](Self::upsert) creates its table while already holding it.
///
/// ```text
/// ingestion_history        <- one row per job lifecycle event
/// <entity>                 <- one row per version of each key
///   idx_<entity>_<keys>    <- composite index over the key fields
///   idx_<entity>_current   <- index over is_current
/// ```
pub struct VersionedStore {
    conn: ReentrantMutex<Connection>,
    path: Option<PathBuf>,
}

impl VersionedStore {
    /// Open (or create) the database file, apply pragmas and ensure the
    /// history table exists.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()), config)
    }

    /// Open the database configured in `config.db_path`.
    pub fn open_configured(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(&config.db_path, config)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, &StoreConfig::default())
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        apply_pragmas(&conn, config)?;
        let store = Self {
            conn: ReentrantMutex::new(conn),
            path,
        };
        store.ensure_history_schema()?;
        Ok(store)
    }

    /// Database file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StoreError::Connection(e))
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

/// WAL keeps readers of history/entity tables unblocked by an in-flight
/// writer; `synchronous` defaults to NORMAL.
fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    let journal_mode: String = conn.pragma_update_and_check(
        None,
        "journal_mode",
        config.journal_mode.pragma_value(),
        |row| row.get(0),
    )?;
    conn.pragma_update(None, "synchronous", config.synchronous.pragma_value())?;
    debug!(
        journal_mode = %journal_mode,
        synchronous = config.synchronous.pragma_value(),
        "store connection configured"
    );
    Ok(())
}
