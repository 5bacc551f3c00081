//! Storage layer for Tasbih
//!
//! Two counter store backends share the `CounterStore` trait:
//! [`MemoryStore`] for a volatile single-process authority and
//! [`SqliteStore`] for durable state. The SQLite [`Database`] handle also
//! carries the client-side device profile.

mod counters;
mod memory;
mod migrations;
mod parse;
mod preferences;
mod sqlite;
mod traits;

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::Result;

pub use counters::CounterTable;
pub use memory::MemoryStore;
pub use preferences::ProfileStore;
pub use sqlite::SqliteStore;
pub use traits::CounterStore;

/// How long a writer waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_version(&self.conn)
    }

    /// Get counter table accessor
    pub fn counters(&self) -> CounterTable<'_> {
        CounterTable::new(&self.conn)
    }

    /// Get device profile store
    pub fn profile(&self) -> ProfileStore<'_> {
        ProfileStore::new(&self.conn)
    }
}
