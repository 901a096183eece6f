//! Custom assertions for loop state.

use crate::r#loop::state::{LoopState, LoopStatus, StopReason};

/// Assert that a loop has the expected status.
///
/// # Panics
///
/// Panics with the loop's counters if the status differs.
pub fn assert_status(state: &LoopState, expected: LoopStatus) {
    assert_eq!(
        state.status, expected,
        "Loop '{}' expected {} but is {} (iteration {}, streak {}, stop reason {:?})",
        state.name, expected, state.status, state.iteration, state.no_progress_streak,
        state.stop_reason
    );
}

/// Assert that a loop stopped for the expected reason.
///
/// # Panics
///
/// Panics if the loop is not terminal or stopped for another reason.
pub fn assert_stopped(state: &LoopState, reason: StopReason) {
    assert!(
        state.is_terminal(),
        "Loop '{}' expected to be stopped ({}) but is {}",
        state.name,
        reason,
        state.status
    );
    assert_eq!(
        state.stop_reason,
        Some(reason),
        "Loop '{}' stopped for the wrong reason",
        state.name
    );
    assert!(
        state.active_turn.is_none(),
        "Stopped loop '{}' still has a turn in flight",
        state.name
    );
}

/// Assert that the iteration history contains exactly these turn kinds.
///
/// # Panics
///
/// Panics if the recorded kinds differ.
pub fn assert_turn_kinds(state: &LoopState, expected: &[crate::r#loop::state::TurnKind]) {
    let kinds: Vec<_> = state.history.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds, expected,
        "Loop '{}' ran unexpected turn kinds",
        state.name
    );
}
