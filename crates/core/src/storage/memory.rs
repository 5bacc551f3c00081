//! In-memory counter store
//!
//! Each counter lives behind its own mutex. The outer map lock is only held
//! long enough to find or insert a slot, so counters never contend with each
//! other for mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::invariants::assert_counter_invariants;
use crate::models::{Counter, CounterId, IncrementOutcome};

use super::traits::CounterStore;

type Slot = Arc<Mutex<Counter>>;

/// Volatile store, suitable for a single server process
#[derive(Default)]
pub struct MemoryStore {
    counters: RwLock<HashMap<CounterId, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counters held
    pub fn len(&self) -> usize {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: CounterId) -> Result<Slot> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }
}

/// Lock a counter slot. A panic inside a critical section leaves the counter
/// unchanged or fully updated, so a poisoned lock is still usable.
fn lock(slot: &Slot) -> MutexGuard<'_, Counter> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CounterStore for MemoryStore {
    #[instrument(skip(self))]
    fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        let counter = Counter::new(goal, created_by)?;
        assert_counter_invariants(&counter);

        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(counter.id, Arc::new(Mutex::new(counter.clone())));

        info!(counter_id = %counter.id, goal, "Counter created");
        Ok(counter)
    }

    fn get(&self, id: CounterId) -> Result<Counter> {
        let slot = self.slot(id)?;
        let counter = lock(&slot).clone();
        Ok(counter)
    }

    #[instrument(skip(self))]
    fn add_participant(&self, id: CounterId, name: &str) -> Result<Counter> {
        let slot = self.slot(id)?;
        let mut counter = lock(&slot);
        counter.ensure_participant(name);
        assert_counter_invariants(&counter);
        Ok(counter.clone())
    }

    #[instrument(skip(self))]
    fn atomic_increment(&self, id: CounterId, name: &str) -> Result<IncrementOutcome> {
        let slot = self.slot(id)?;
        let mut counter = lock(&slot);
        let transitioned_now = counter.apply_increment(name)?;
        assert_counter_invariants(&counter);

        if transitioned_now {
            info!(counter_id = %id, participant = name, "Goal reached");
        }

        Ok(IncrementOutcome {
            counter: counter.clone(),
            transitioned_now,
        })
    }

    #[instrument(skip(self))]
    fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        let slot = self.slot(id)?;
        let mut counter = lock(&slot);
        counter.apply_reset(requesting_name)?;
        assert_counter_invariants(&counter);

        info!(counter_id = %id, epoch = counter.epoch, "Counter reset");
        Ok(counter.clone())
    }
}
