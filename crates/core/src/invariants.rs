//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible counter states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::Counter;

/// Validate that a counter's state is internally consistent
pub fn assert_counter_invariants(counter: &Counter) {
    debug_assert!(counter.goal > 0, "Counter {} has zero goal", counter.id);

    debug_assert!(
        counter.current_count == counter.ledger_total(),
        "Counter {} total {} does not match ledger sum {}",
        counter.id,
        counter.current_count,
        counter.ledger_total()
    );

    debug_assert!(
        counter.current_count <= counter.goal,
        "Counter {} overshot goal: {} > {}",
        counter.id,
        counter.current_count,
        counter.goal
    );

    debug_assert!(
        counter.is_completed == (counter.current_count >= counter.goal),
        "Counter {} completion flag {} disagrees with {}/{}",
        counter.id,
        counter.is_completed,
        counter.current_count,
        counter.goal
    );

    debug_assert!(
        !counter.created_by.trim().is_empty(),
        "Counter {} has empty creator",
        counter.id
    );

    assert_unique_participants(counter);
}

/// Validate that no participant name appears twice
pub fn assert_unique_participants(counter: &Counter) {
    let mut seen = HashSet::new();
    for participant in &counter.participants {
        debug_assert!(
            seen.insert(participant.name.as_str()),
            "Counter {} has duplicate participant {:?}",
            counter.id,
            participant.name
        );
    }
}

/// Validate that a newer snapshot of the same counter does not move backwards
/// within one reset epoch
pub fn assert_monotonic(before: &Counter, after: &Counter) {
    if before.id != after.id || before.epoch != after.epoch {
        return;
    }
    debug_assert!(
        after.current_count >= before.current_count,
        "Counter {} went backwards in epoch {}: {} -> {}",
        after.id,
        after.epoch,
        before.current_count,
        after.current_count
    );
}
