//! Completion marker protocol.
//!
//! The agent ends a turn by printing one of two literal markers on a line
//! of its own. Agents quote the markers in explanations and code samples
//! all the time, so detection is strict:
//!
//! - a line whose trimmed text starts with ```` ``` ```` or `~~~` toggles a
//!   fenced region and is itself never a marker;
//! - nothing inside a fenced region is scanned;
//! - outside fences, only a line whose trimmed text *equals* a marker counts;
//! - seeing both markers anywhere is a conflict and classifies as no marker.

use serde::{Deserialize, Serialize};

/// Line the agent prints when the task is finished.
pub const COMPLETE_MARKER: &str = "<promise>COMPLETE</promise>";

/// Line the agent prints when the task cannot be continued.
pub const ABORT_MARKER: &str = "<promise>ABORT</promise>";

/// Classification of one block of agent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Complete,
    Abort,
    /// Both markers present; treated as no marker.
    Conflict,
    NoMarker,
}

impl Classification {
    /// True only for an unambiguous marker.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Classification::Complete | Classification::Abort)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Complete => "complete",
            Classification::Abort => "abort",
            Classification::Conflict => "conflict",
            Classification::NoMarker => "none",
        };
        write!(f, "{s}")
    }
}

/// Which markers were seen while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub complete_seen: bool,
    pub abort_seen: bool,
}

impl MarkerScan {
    /// Scan the whole text, accumulating every marker line outside fences.
    #[must_use]
    pub fn scan(text: &str) -> Self {
        let mut scan = Self::default();
        let mut in_fence = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if is_fence(trimmed) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if trimmed == COMPLETE_MARKER {
                scan.complete_seen = true;
            } else if trimmed == ABORT_MARKER {
                scan.abort_seen = true;
            }
        }

        scan
    }

    #[must_use]
    pub fn classification(&self) -> Classification {
        match (self.complete_seen, self.abort_seen) {
            (true, true) => Classification::Conflict,
            (true, false) => Classification::Complete,
            (false, true) => Classification::Abort,
            (false, false) => Classification::NoMarker,
        }
    }
}

/// Classify agent output.
///
/// # Example
///
/// ```
/// use ralph_loop::r#loop::marker::{classify, Classification};
///
/// assert_eq!(classify("done\n<promise>COMPLETE</promise>\n"), Classification::Complete);
/// assert_eq!(classify("```\n<promise>COMPLETE</promise>\n```"), Classification::NoMarker);
/// ```
#[must_use]
pub fn classify(text: &str) -> Classification {
    MarkerScan::scan(text).classification()
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}
