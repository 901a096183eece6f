//! Struggle detection.
//!
//! Evaluates the no-progress streak the driver has already accumulated.
//! What counts as progress is decided by the driver, not here.

use super::state::LoopState;

/// Flags a loop whose no-progress streak reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StruggleDetector {
    threshold: u32,
}

impl StruggleDetector {
    /// Create a detector; a zero threshold is clamped to 1.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// True when a live loop has gone `threshold` turns without progress.
    #[must_use]
    pub fn is_struggling(&self, state: &LoopState) -> bool {
        state.status.is_live() && state.no_progress_streak >= self.threshold
    }
}

impl Default for StruggleDetector {
    fn default() -> Self {
        Self::new(3)
    }
}
