//! SQLite-backed counter store
//!
//! Every operation runs as one `IMMEDIATE` transaction, so the threshold
//! check and the write that crosses it commit together.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::TransactionBehavior;
use tracing::{info, instrument};

use super::counters::CounterTable;
use super::traits::CounterStore;
use super::Database;
use crate::error::{Error, Result};
use crate::invariants::assert_counter_invariants;
use crate::models::{Counter, CounterId, IncrementOutcome};

/// Durable store. All counters share one connection.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open a throwaway in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Number of stored counters
    pub fn len(&self) -> Result<u64> {
        let db = self.lock();
        CounterTable::new(&db.conn).count()
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load, mutate and save one counter inside a single transaction.
    ///
    /// `mutate` may fail after changing the counter (a rejected increment still
    /// registers its name); `keep_on_error` decides whether such changes commit.
    fn modify<T>(
        &self,
        id: CounterId,
        keep_on_error: fn(&Error) -> bool,
        mutate: impl FnOnce(&mut Counter) -> Result<T>,
    ) -> Result<(Counter, T)> {
        let mut db = self.lock();
        let tx = db
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let table = CounterTable::new(&tx);

        let mut counter = table.load(id)?.ok_or(Error::NotFound(id))?;
        match mutate(&mut counter) {
            Ok(value) => {
                assert_counter_invariants(&counter);
                table.save(&counter)?;
                tx.commit()?;
                Ok((counter, value))
            }
            Err(e) => {
                if keep_on_error(&e) {
                    table.save(&counter)?;
                    tx.commit()?;
                }
                Err(e)
            }
        }
    }
}

fn keep_registration(e: &Error) -> bool {
    matches!(e, Error::AlreadyCompleted(_))
}

fn discard(_: &Error) -> bool {
    false
}

impl CounterStore for SqliteStore {
    #[instrument(skip(self))]
    fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        let counter = Counter::new(goal, created_by)?;
        assert_counter_invariants(&counter);

        let mut db = self.lock();
        let tx = db.conn.transaction()?;
        CounterTable::new(&tx).insert(&counter)?;
        tx.commit()?;

        info!(counter_id = %counter.id, goal, "Counter created");
        Ok(counter)
    }

    fn get(&self, id: CounterId) -> Result<Counter> {
        let db = self.lock();
        CounterTable::new(&db.conn)
            .load(id)?
            .ok_or(Error::NotFound(id))
    }

    #[instrument(skip(self))]
    fn add_participant(&self, id: CounterId, name: &str) -> Result<Counter> {
        let (counter, _) = self.modify(id, discard, |c| {
            c.ensure_participant(name);
            Ok(())
        })?;
        Ok(counter)
    }

    #[instrument(skip(self))]
    fn atomic_increment(&self, id: CounterId, name: &str) -> Result<IncrementOutcome> {
        let (counter, transitioned_now) =
            self.modify(id, keep_registration, |c| c.apply_increment(name))?;

        if transitioned_now {
            info!(counter_id = %id, participant = name, "Goal reached");
        }

        Ok(IncrementOutcome {
            counter,
            transitioned_now,
        })
    }

    #[instrument(skip(self))]
    fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        let (counter, _) = self.modify(id, discard, |c| c.apply_reset(requesting_name))?;
        info!(counter_id = %id, epoch = counter.epoch, "Counter reset");
        Ok(counter)
    }

    fn blocks_on_io(&self) -> bool {
        true
    }
}
