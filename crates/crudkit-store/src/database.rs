use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema;

/// A relational session: one SQLite connection plus the set of record tables
/// already provisioned on it. Clones share the same connection, so writes
/// made inside an open transaction are visible through every clone.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    provisioned: Arc<Mutex<HashSet<&'static str>>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

        debug!(path = %path.display(), "session opened");

        Ok(Self::from_connection(conn, path.to_owned()))
    }

    /// Open an in-memory database (for testing). Nothing is shared with
    /// other sessions.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

        Ok(Self::from_connection(conn, PathBuf::from(":memory:")))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            provisioned: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when both handles are the same underlying session.
    pub fn same_session(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Run `ddl` once per session for `table`.
    pub fn ensure_table(&self, table: &'static str, ddl: &str) -> Result<(), StoreError> {
        let mut provisioned = self.provisioned.lock();
        if provisioned.contains(table) {
            return Ok(());
        }
        self.with_conn(|conn| {
            conn.execute_batch(ddl)
                .map_err(|e| StoreError::Database(format!("provision {table}: {e}")))
        })?;
        provisioned.insert(table);
        info!(table, path = %self.path.display(), "table provisioned");
        Ok(())
    }

    pub fn begin(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| Ok(conn.execute_batch("BEGIN")?))
    }

    pub fn commit(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| Ok(conn.execute_batch("COMMIT")?))
    }

    pub fn rollback(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| Ok(conn.execute_batch("ROLLBACK")?))
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.lock().is_autocommit()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
            provisioned: self.provisioned.clone(),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
