//! Counter table operations
//!
//! Row-level reads and writes. Callers are responsible for wrapping
//! read-modify-write sequences in a transaction.

use rusqlite::{params, Connection};
use tracing::instrument;

use super::parse::{count_to_sql, parse_count, parse_counter_id, parse_datetime, OptionalExt};
use crate::error::Result;
use crate::models::{Counter, CounterId, Participant};

pub struct CounterTable<'a> {
    conn: &'a Connection,
}

impl<'a> CounterTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new counter and its initial participants
    #[instrument(skip(self, counter), fields(counter_id = %counter.id))]
    pub fn insert(&self, counter: &Counter) -> Result<()> {
        self.conn.execute(
            "INSERT INTO counters (id, goal, current_count, created_by, is_completed, created_at, epoch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                counter.id.to_string(),
                count_to_sql(counter.goal)?,
                count_to_sql(counter.current_count)?,
                counter.created_by,
                counter.is_completed as i32,
                counter.created_at.to_rfc3339(),
                count_to_sql(counter.epoch)?,
            ],
        )?;
        self.save_participants(counter)
    }

    /// Load a counter with its participants in join order
    #[instrument(skip(self))]
    pub fn load(&self, id: CounterId) -> Result<Option<Counter>> {
        let counter = self
            .conn
            .query_row(
                "SELECT id, goal, current_count, created_by, is_completed, created_at, epoch
                 FROM counters WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Counter {
                        id: parse_counter_id(&row.get::<_, String>(0)?)?,
                        goal: parse_count(row.get(1)?)?,
                        current_count: parse_count(row.get(2)?)?,
                        created_by: row.get(3)?,
                        is_completed: row.get::<_, i32>(4)? != 0,
                        participants: Vec::new(),
                        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                        epoch: parse_count(row.get(6)?)?,
                    })
                },
            )
            .optional()?;

        let Some(mut counter) = counter else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT name, count FROM participants
             WHERE counter_id = ?1
             ORDER BY position",
        )?;
        counter.participants = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(Participant {
                    name: row.get(0)?,
                    count: parse_count(row.get(1)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(counter))
    }

    /// Write back the mutable columns and the full participant ledger
    #[instrument(skip(self, counter), fields(counter_id = %counter.id))]
    pub fn save(&self, counter: &Counter) -> Result<()> {
        self.conn.execute(
            "UPDATE counters SET current_count = ?1, is_completed = ?2, epoch = ?3
             WHERE id = ?4",
            params![
                count_to_sql(counter.current_count)?,
                counter.is_completed as i32,
                count_to_sql(counter.epoch)?,
                counter.id.to_string(),
            ],
        )?;
        self.save_participants(counter)
    }

    fn save_participants(&self, counter: &Counter) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO participants (counter_id, name, count, position)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(counter_id, name) DO UPDATE SET count = excluded.count",
        )?;
        let id = counter.id.to_string();
        for (position, participant) in counter.participants.iter().enumerate() {
            stmt.execute(params![
                id,
                participant.name,
                count_to_sql(participant.count)?,
                position as i64,
            ])?;
        }
        Ok(())
    }

    /// Total number of stored counters
    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM counters", [], |row| row.get(0))?;
        Ok(parse_count(n)?)
    }
}
