//! Checklist progress measurement.
//!
//! Counts checkbox lines (`- [ ]`, `- [x]`, `- [X]`) in a task document,
//! at any indentation depth. Pure: no I/O, same text in, same counts out.
//! Whether the task file exists at all is the caller's concern.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Checkbox at the start of a list item: `-`, `*` or `+` bullet, any indent.
fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[-*+]\s+\[([ xX])\](?:\s|$)").expect("checkbox pattern is valid")
    })
}

/// Completed and total checklist items in a document.
///
/// # Example
///
/// ```
/// use ralph_loop::r#loop::progress::ChecklistProgress;
///
/// let progress = ChecklistProgress::measure("- [x] one\n  - [ ] two\n");
/// assert_eq!((progress.done, progress.total), (1, 2));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub done: u32,
    pub total: u32,
}

impl ChecklistProgress {
    /// Measure the checklist in `text`.
    #[must_use]
    pub fn measure(text: &str) -> Self {
        let re = checkbox_re();
        let mut progress = Self::default();
        for line in text.lines() {
            if let Some(caps) = re.captures(line) {
                progress.total += 1;
                if !caps[1].trim().is_empty() {
                    progress.done += 1;
                }
            }
        }
        progress
    }

    /// Unchecked item count. Hand-built values may claim more done than
    /// total; those count as nothing remaining.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.done)
    }

    /// True when there is at least one item and all are checked.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done >= self.total
    }

    /// Completion percentage, `None` for documents without a checklist.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        (self.total > 0)
            .then(|| (f64::from(self.done) * 100.0 / f64::from(self.total)).min(100.0))
    }
}

impl std::fmt::Display for ChecklistProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

/// Text of every unchecked item, in document order.
#[must_use]
pub fn open_items(text: &str) -> Vec<String> {
    let re = checkbox_re();
    text.lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            if caps[1].trim().is_empty() {
                let end = caps.get(0).map_or(0, |m| m.end());
                Some(line[end..].trim().to_string())
            } else {
                None
            }
        })
        .collect()
}
