//! Storage repository traits
//!
//! The counter store is the only component that mutates counter state.
//! Implementations (in-memory, SQLite) must make every operation below
//! linearizable per counter id.

use crate::error::Result;
use crate::models::{Counter, CounterId, IncrementOutcome};

/// Atomic primitives over counter state
pub trait CounterStore: Send + Sync {
    /// Allocate a new counter with `created_by` as its first participant.
    /// Fails with `InvalidGoal` if `goal <= 0`.
    fn create(&self, goal: i64, created_by: &str) -> Result<Counter>;

    /// Fetch a snapshot
    fn get(&self, id: CounterId) -> Result<Counter>;

    /// Register `name` with a zero count; no-op if already present
    fn add_participant(&self, id: CounterId, name: &str) -> Result<Counter>;

    /// Register `name` if needed and add exactly one increment, as one
    /// indivisible step. Fails with `AlreadyCompleted` once the goal is reached.
    fn atomic_increment(&self, id: CounterId, name: &str) -> Result<IncrementOutcome>;

    /// Zero all counts, keeping participants. Fails with `Forbidden` unless
    /// `requesting_name` is the creator.
    fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter>;

    /// True when operations do synchronous disk I/O and may wait on locks,
    /// so async callers should keep them off the reactor
    fn blocks_on_io(&self) -> bool {
        false
    }
}

impl<T: CounterStore + ?Sized> CounterStore for std::sync::Arc<T> {
    fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        (**self).create(goal, created_by)
    }

    fn get(&self, id: CounterId) -> Result<Counter> {
        (**self).get(id)
    }

    fn add_participant(&self, id: CounterId, name: &str) -> Result<Counter> {
        (**self).add_participant(id, name)
    }

    fn atomic_increment(&self, id: CounterId, name: &str) -> Result<IncrementOutcome> {
        (**self).atomic_increment(id, name)
    }

    fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        (**self).reset(id, requesting_name)
    }

    fn blocks_on_io(&self) -> bool {
        (**self).blocks_on_io()
    }
}
