//! Counter model - one shared tasbih and its participant ledger

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier for a counter. Doubles as the shareable join code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterId(pub Uuid);

impl CounterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a join code, tolerating surrounding whitespace
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

impl Default for CounterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CounterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A named contributor and the increments attributed to that name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub count: u64,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
        }
    }
}

/// A shared counter working toward a fixed goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: CounterId,
    pub goal: u64,
    pub current_count: u64,
    /// Display name of the creator; only this name may reset
    pub created_by: String,
    pub is_completed: bool,
    /// Participants in join order
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    /// Reset generation, bumped on every reset
    pub epoch: u64,
}

/// Result of a single atomic increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementOutcome {
    pub counter: Counter,
    /// True only for the increment that moved the counter to its goal
    pub transitioned_now: bool,
}

impl Counter {
    /// Create a fresh counter with the creator as its first participant.
    ///
    /// Fails with `InvalidGoal` unless `goal` is positive.
    pub fn new(goal: i64, created_by: impl Into<String>) -> Result<Self> {
        if goal <= 0 {
            return Err(Error::InvalidGoal(goal));
        }
        let created_by = created_by.into();

        Ok(Self {
            id: CounterId::new(),
            goal: goal as u64,
            current_count: 0,
            participants: vec![Participant::new(created_by.clone())],
            created_by,
            is_completed: false,
            created_at: Utc::now(),
            epoch: 0,
        })
    }

    /// Look up a participant by name
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Increments attributed to `name`, zero if unknown
    pub fn count_for(&self, name: &str) -> u64 {
        self.participant(name).map_or(0, |p| p.count)
    }

    /// Register `name` with a zero count if absent. Returns true if inserted.
    pub fn ensure_participant(&mut self, name: &str) -> bool {
        if self.participant(name).is_some() {
            return false;
        }
        self.participants.push(Participant::new(name));
        true
    }

    /// Apply one increment on behalf of `name`.
    ///
    /// The name is registered first even when the increment is rejected.
    /// Returns whether this increment completed the counter.
    pub fn apply_increment(&mut self, name: &str) -> Result<bool> {
        self.ensure_participant(name);

        if self.is_completed {
            return Err(Error::AlreadyCompleted(self.id));
        }

        if let Some(participant) = self.participants.iter_mut().find(|p| p.name == name) {
            participant.count += 1;
        }
        self.current_count += 1;

        let transitioned = self.current_count >= self.goal;
        if transitioned {
            self.is_completed = true;
        }
        Ok(transitioned)
    }

    /// Zero every count and reopen the counter. Only the creator may reset.
    pub fn apply_reset(&mut self, requesting_name: &str) -> Result<()> {
        if requesting_name != self.created_by {
            return Err(Error::Forbidden(format!(
                "only {} can reset this counter",
                self.created_by
            )));
        }

        for participant in &mut self.participants {
            participant.count = 0;
        }
        self.current_count = 0;
        self.is_completed = false;
        self.epoch += 1;
        Ok(())
    }

    /// Sum of all participant counts
    pub fn ledger_total(&self) -> u64 {
        self.participants.iter().map(|p| p.count).sum()
    }

    /// Progress toward the goal in percent, capped at 100
    pub fn progress_percent(&self) -> f64 {
        if self.goal == 0 {
            return 0.0;
        }
        (self.current_count as f64 / self.goal as f64 * 100.0).min(100.0)
    }

    /// Increments still needed to reach the goal
    pub fn remaining(&self) -> u64 {
        self.goal.saturating_sub(self.current_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_counter() {
        let counter = Counter::new(33, "A").unwrap();
        assert_eq!(counter.goal, 33);
        assert_eq!(counter.current_count, 0);
        assert!(!counter.is_completed);
        assert_eq!(counter.participants, vec![Participant::new("A")]);
        assert_eq!(counter.epoch, 0);
    }

    #[test]
    fn test_non_positive_goal_rejected() {
        assert!(matches!(Counter::new(0, "A"), Err(Error::InvalidGoal(0))));
        assert!(matches!(Counter::new(-5, "A"), Err(Error::InvalidGoal(-5))));
    }

    #[test]
    fn test_increment_transitions_once() {
        let mut counter = Counter::new(2, "A").unwrap();
        assert!(!counter.apply_increment("A").unwrap());
        assert!(counter.apply_increment("B").unwrap());
        assert!(counter.is_completed);

        let err = counter.apply_increment("A").unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted(_)));
        assert_eq!(counter.current_count, 2);
        assert_eq!(counter.ledger_total(), 2);
    }

    #[test]
    fn test_rejected_increment_still_registers_name() {
        let mut counter = Counter::new(1, "A").unwrap();
        counter.apply_increment("A").unwrap();
        assert!(counter.apply_increment("C").is_err());
        assert_eq!(counter.participant("C"), Some(&Participant::new("C")));
    }

    #[test]
    fn test_ensure_participant_idempotent() {
        let mut counter = Counter::new(5, "A").unwrap();
        assert!(counter.ensure_participant("B"));
        assert!(!counter.ensure_participant("B"));
        assert!(!counter.ensure_participant("A"));
        assert_eq!(counter.participants.len(), 2);
    }

    #[test]
    fn test_reset_by_creator() {
        let mut counter = Counter::new(2, "A").unwrap();
        counter.apply_increment("A").unwrap();
        counter.apply_increment("B").unwrap();

        counter.apply_reset("A").unwrap();
        assert_eq!(counter.current_count, 0);
        assert!(!counter.is_completed);
        assert_eq!(counter.epoch, 1);
        assert_eq!(counter.participants.len(), 2);
        assert!(counter.participants.iter().all(|p| p.count == 0));
    }

    #[test]
    fn test_reset_by_other_forbidden() {
        let mut counter = Counter::new(2, "A").unwrap();
        counter.apply_increment("B").unwrap();
        let before = counter.clone();

        assert!(matches!(counter.apply_reset("B"), Err(Error::Forbidden(_))));
        assert_eq!(counter, before);
    }

    #[test]
    fn test_progress() {
        let mut counter = Counter::new(4, "A").unwrap();
        counter.apply_increment("A").unwrap();
        assert_eq!(counter.progress_percent(), 25.0);
        assert_eq!(counter.remaining(), 3);
    }

    #[test]
    fn test_counter_id_parse() {
        let id = CounterId::new();
        assert_eq!(CounterId::parse(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(
            CounterId::parse("not-a-code"),
            Err(Error::InvalidId(_))
        ));
    }
}
