//! Loop state types and transitions.
//!
//! [`LoopState`] is the persisted record for one named loop. Policy lives
//! in the driver; the methods here are the small, mechanical mutations the
//! driver composes.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{LoopError, Result};

/// Current schema version for loop state records.
/// Increment when making breaking changes to the serialization format.
pub const LOOP_STATE_VERSION: u32 = 1;

/// Longest accepted loop name.
pub const MAX_NAME_LEN: usize = 64;

/// Loop execution mode.
///
/// Determines which iteration template is used.
///
/// # Example
///
/// ```
/// use ralph_loop::r#loop::state::LoopMode;
///
/// assert_eq!(LoopMode::Build.to_string(), "build");
/// ```
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Implement unchecked task items
    #[default]
    Build,
    /// Gap analysis and task-file updates only
    Plan,
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Build => write!(f, "build"),
            LoopMode::Plan => write!(f, "plan"),
        }
    }
}

/// Lifecycle status of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Running,
    Paused,
    /// No checklist progress for too long; not terminal.
    Stuck,
    Completed,
    Aborted,
}

impl LoopStatus {
    /// Terminal statuses never dispatch another turn.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopStatus::Completed | LoopStatus::Aborted)
    }

    /// Statuses in which the no-progress streak is tracked.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, LoopStatus::Running | LoopStatus::Stuck)
    }
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopStatus::Running => "running",
            LoopStatus::Paused => "paused",
            LoopStatus::Stuck => "stuck",
            LoopStatus::Completed => "completed",
            LoopStatus::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Why a loop reached a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    AgentCompleted,
    AgentAborted,
    BudgetExhausted,
    UserStopped,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::AgentCompleted => "agent signalled completion",
            StopReason::AgentAborted => "agent signalled abort",
            StopReason::BudgetExhausted => "iteration budget exhausted",
            StopReason::UserStopped => "stopped by user",
        };
        write!(f, "{s}")
    }
}

/// Template chosen for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Build,
    Plan,
    Checkpoint,
    Rotation,
}

impl TurnKind {
    /// Normal iteration kind for a mode.
    #[must_use]
    pub fn for_mode(mode: LoopMode) -> Self {
        match mode {
            LoopMode::Build => TurnKind::Build,
            LoopMode::Plan => TurnKind::Plan,
        }
    }
}

impl std::fmt::Display for TurnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnKind::Build => "build",
            TurnKind::Plan => "plan",
            TurnKind::Checkpoint => "checkpoint",
            TurnKind::Rotation => "rotation",
        };
        write!(f, "{s}")
    }
}

/// A turn that has been dispatched but not yet ended or cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTurn {
    pub id: Uuid,
    pub kind: TurnKind,
    pub started_at: DateTime<Utc>,
    /// Set while a waiting-for-user tool call is open.
    #[serde(default)]
    pub awaiting_user: bool,
    /// Pending hints that went into this turn's prompt. Hints queued after
    /// dispatch stay for the next turn.
    #[serde(default)]
    pub hints_consumed: usize,
}

impl ActiveTurn {
    #[must_use]
    pub fn new(kind: TurnKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            awaiting_user: false,
            hints_consumed: 0,
        }
    }
}

/// How an iteration ended, for history and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Completed,
    Aborted,
    Progressed,
    NoProgress,
    /// Empty output or dispatch failure.
    Failed,
    Checkpoint,
}

/// One finished iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: u32,
    pub kind: TurnKind,
    pub outcome: IterationOutcome,
    pub done: u32,
    pub total: u32,
    /// SHA-256 of the task file after the turn, if it was readable.
    #[serde(default)]
    pub task_digest: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Parameters for creating a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoop {
    pub name: String,
    pub mode: LoopMode,
    pub task_file: PathBuf,
    pub max_iterations: u32,
    pub reflect_every: u32,
}

impl NewLoop {
    #[must_use]
    pub fn new(name: impl Into<String>, task_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mode: LoopMode::Build,
            task_file: task_file.into(),
            max_iterations: 0,
            reflect_every: 0,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    #[must_use]
    pub fn with_reflect_every(mut self, every: u32) -> Self {
        self.reflect_every = every;
        self
    }
}

/// Persisted state of one named loop.
///
/// # Example
///
/// ```
/// use ralph_loop::r#loop::state::{LoopState, LoopStatus, NewLoop};
///
/// let state = LoopState::new(NewLoop::new("demo", "TASKS.md"), 0);
/// assert_eq!(state.iteration, 1);
/// assert_eq!(state.status, LoopStatus::Running);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub name: String,
    pub mode: LoopMode,
    pub status: LoopStatus,
    /// 1-based; incremented once per completed turn.
    pub iteration: u32,
    /// 0 means unbounded.
    pub max_iterations: u32,
    pub task_file: PathBuf,
    /// 0 disables checkpoint turns.
    pub reflect_every: u32,
    #[serde(default)]
    pub compaction_count: u32,
    #[serde(default)]
    pub session_rotations: u32,
    #[serde(default)]
    pub no_progress_streak: u32,
    #[serde(default)]
    pub pending_hints: Vec<String>,
    #[serde(default)]
    pub sticky_hints: Vec<String>,
    /// Checklist `done` count at the last successful measurement.
    #[serde(default)]
    pub last_done: u32,
    /// A session rotation happened and the bootstrap turn has not finished.
    #[serde(default)]
    pub rotation_pending: bool,
    #[serde(default)]
    pub active_turn: Option<ActiveTurn>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub history: Vec<IterationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoopState {
    /// Create a fresh running loop.
    ///
    /// `initial_done` seeds the progress baseline from the task file as it
    /// is at creation time.
    #[must_use]
    pub fn new(spec: NewLoop, initial_done: u32) -> Self {
        let now = Utc::now();
        Self {
            version: LOOP_STATE_VERSION,
            name: spec.name,
            mode: spec.mode,
            status: LoopStatus::Running,
            iteration: 1,
            max_iterations: spec.max_iterations,
            task_file: spec.task_file,
            reflect_every: spec.reflect_every,
            compaction_count: 0,
            session_rotations: 0,
            no_progress_streak: 0,
            pending_hints: Vec::new(),
            sticky_hints: Vec::new(),
            last_done: initial_done,
            rotation_pending: false,
            active_turn: None,
            stop_reason: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once a bounded loop has used up its iterations.
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        self.max_iterations > 0 && self.iteration > self.max_iterations
    }

    /// True when the current iteration is a scheduled checkpoint.
    #[must_use]
    pub fn checkpoint_due(&self) -> bool {
        self.reflect_every > 0 && self.iteration % self.reflect_every == 0
    }

    /// Template for the next turn: checkpoint, then rotation, then mode.
    #[must_use]
    pub fn next_turn_kind(&self) -> TurnKind {
        if self.checkpoint_due() {
            TurnKind::Checkpoint
        } else if self.rotation_pending {
            TurnKind::Rotation
        } else {
            TurnKind::for_mode(self.mode)
        }
    }

    /// `" of N"` for bounded loops, empty otherwise.
    #[must_use]
    pub fn max_iterations_suffix(&self) -> String {
        if self.max_iterations > 0 {
            format!(" of {}", self.max_iterations)
        } else {
            String::new()
        }
    }

    /// Apply a checklist measurement; returns whether `done` increased.
    pub fn record_measurement(&mut self, done: u32) -> bool {
        let progressed = done > self.last_done;
        if progressed {
            self.no_progress_streak = 0;
        } else {
            self.no_progress_streak += 1;
        }
        self.last_done = done;
        progressed
    }

    /// Count a turn that produced nothing measurable.
    pub fn record_no_progress(&mut self) {
        self.no_progress_streak += 1;
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: LoopStatus, reason: StopReason) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.stop_reason = Some(reason);
        self.active_turn = None;
    }

    /// Append a history record, keeping at most `limit` entries.
    pub fn push_history(&mut self, record: IterationRecord, limit: usize) {
        self.history.push(record);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Check that a loop name is usable as a record key.
///
/// # Errors
///
/// Returns `InvalidName` for empty, overlong, or path-unsafe names.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| LoopError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 64 characters"));
    }
    if name.starts_with('.') {
        return Err(invalid("name must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("use only letters, digits, '-', '_' and '.'"));
    }
    Ok(())
}
