//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{debug, info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    sql: r#"
        -- Counters table
        CREATE TABLE IF NOT EXISTS counters (
            id TEXT PRIMARY KEY,
            goal INTEGER NOT NULL CHECK (goal > 0),
            current_count INTEGER NOT NULL DEFAULT 0 CHECK (current_count >= 0),
            created_by TEXT NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            epoch INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK (current_count <= goal)
        );

        -- Participants ledger, in join order
        CREATE TABLE IF NOT EXISTS participants (
            counter_id TEXT NOT NULL,
            name TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
            position INTEGER NOT NULL,
            PRIMARY KEY (counter_id, name),
            FOREIGN KEY (counter_id) REFERENCES counters(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_participants_position
            ON participants(counter_id, position);

        -- Local identity of this device
        CREATE TABLE IF NOT EXISTS device_profile (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            participant_name TEXT,
            haptics_enabled INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL
        );
    "#,
}];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(crate) fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations, each in its own transaction
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let from = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        debug!(version = from, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)?;
        record_migration(&tx, migration)?;
        tx.commit()?;
    }

    info!(from, to = current_version(conn)?, "Database schema updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }

    #[test]
    fn test_initial_schema_is_complete() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);

        conn.execute(
            "INSERT INTO counters (id, goal, created_by, epoch, created_at) VALUES ('x', 3, 'A', 2, 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO device_profile (id, participant_name, updated_at) VALUES (1, 'A', 'now')",
            [],
        )
        .unwrap();
        let epoch: i64 = conn
            .query_row("SELECT epoch FROM counters WHERE id = 'x'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(epoch, 2);
    }

    #[test]
    fn test_goal_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO counters (id, goal, created_by, created_at) VALUES ('x', 0, 'A', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
