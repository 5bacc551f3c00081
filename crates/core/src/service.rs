//! Counter service
//!
//! Request-level validation and response shaping on top of a [`CounterStore`].
//! Holds no state of its own; the store is the single authority.

use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::models::{Counter, CounterId, IncrementOutcome};
use crate::storage::CounterStore;

/// Longest accepted display name, in characters
pub const MAX_NAME_CHARS: usize = 64;

/// The authority for every counter held by its store
pub struct CounterService<S> {
    store: S,
}

impl<S: CounterStore> CounterService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Whether calls into this service block the calling thread on I/O
    pub fn is_blocking(&self) -> bool {
        self.store.blocks_on_io()
    }

    /// Create a counter. The goal must be positive and the creator named.
    #[instrument(skip(self))]
    pub fn create_counter(&self, goal: i64, created_by: &str) -> Result<Counter> {
        if goal <= 0 {
            return Err(Error::InvalidGoal(goal));
        }
        let created_by = normalize_name(created_by)?;
        self.store.create(goal, created_by)
    }

    /// Join a counter. Joining again with the same name is a no-op.
    #[instrument(skip(self))]
    pub fn join_counter(&self, id: CounterId, participant_name: &str) -> Result<Counter> {
        let name = normalize_name(participant_name)?;
        let counter = self.store.add_participant(id, name)?;
        debug!(counter_id = %id, participant = name, "Participant joined");
        Ok(counter)
    }

    /// Add one increment for `participant_name`.
    ///
    /// Returns `AlreadyCompleted` rather than a generic failure once the goal
    /// has been reached, so callers can tell a benign race from a fault.
    #[instrument(skip(self))]
    pub fn increment(&self, id: CounterId, participant_name: &str) -> Result<IncrementOutcome> {
        let name = normalize_name(participant_name)?;
        self.store.atomic_increment(id, name)
    }

    /// Reset the counter to zero on behalf of its creator
    #[instrument(skip(self))]
    pub fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        self.store.reset(id, requesting_name.trim())
    }

    /// Read-only snapshot
    pub fn get_state(&self, id: CounterId) -> Result<Counter> {
        self.store.get(id)
    }
}

/// Trim a display name and reject empty or oversized ones
pub fn normalize_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidName("name must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(Error::InvalidName(format!(
            "name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(trimmed)
}
