//! Turn start, turn end and cancellation for `LoopDriver`.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{task_digest, LoopDriver};
use crate::config::StuckPolicy;
use crate::error::{LoopError, Result};
use crate::prompt::PromptContext;
use crate::r#loop::marker::{Classification, MarkerScan};
use crate::r#loop::progress::ChecklistProgress;
use crate::r#loop::state::{
    ActiveTurn, IterationOutcome, IterationRecord, LoopStatus, StopReason, TurnKind,
};

/// A turn ready to hand to the agent runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnPlan {
    pub turn_id: Uuid,
    pub kind: TurnKind,
    pub iteration: u32,
    pub prompt: String,
    /// `None` when the task file does not exist.
    pub checklist: Option<ChecklistProgress>,
}

/// Result of asking the driver to start a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnStart {
    /// Dispatch this prompt.
    Dispatch(TurnPlan),
    /// The loop is not eligible for a turn right now.
    Refused { status: LoopStatus, reason: String },
    /// The loop just reached a terminal status instead of starting a turn.
    Stopped { reason: StopReason },
}

/// What the agent runtime produced for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutput {
    Text(String),
    /// Dispatch failed; the message is logged only.
    Failed(String),
}

/// Everything the driver decided at the end of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub kind: TurnKind,
    /// Iteration the turn ran as.
    pub iteration: u32,
    pub classification: Classification,
    pub outcome: IterationOutcome,
    /// Status after the turn.
    pub status: LoopStatus,
    pub no_progress_streak: u32,
    /// `None` when the task file was missing.
    pub checklist: Option<ChecklistProgress>,
    pub struggling: bool,
}

impl TurnReport {
    /// True if the loop will not dispatch again.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Result of a turn end notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEnd {
    Recorded(TurnReport),
    /// The loop reached a terminal status while the turn was running.
    Ignored { status: LoopStatus },
}

impl LoopDriver {
    /// Begin a turn: decide its kind, render its prompt and mark it in flight.
    ///
    /// Terminal, paused and (under the pause policy) stuck loops are refused.
    /// A bounded loop past its budget is aborted here.
    ///
    /// # Errors
    ///
    /// `TurnInFlight` if a turn was already started and not ended, plus any
    /// load/save failure.
    pub fn on_turn_start(&self, name: &str) -> Result<TurnStart> {
        let stuck_policy = self.settings().stuck_policy;

        self.update(name, |state| {
            if state.is_terminal() {
                return Ok(TurnStart::Refused {
                    status: state.status,
                    reason: format!("loop is {}", state.status),
                });
            }
            if state.active_turn.is_some() {
                return Err(LoopError::TurnInFlight {
                    name: state.name.clone(),
                });
            }
            match state.status {
                LoopStatus::Paused => {
                    return Ok(TurnStart::Refused {
                        status: state.status,
                        reason: "loop is paused; resume it to continue".to_string(),
                    });
                }
                LoopStatus::Stuck if stuck_policy == StuckPolicy::Pause => {
                    return Ok(TurnStart::Refused {
                        status: state.status,
                        reason: format!(
                            "loop is stuck after {} iterations without progress",
                            state.no_progress_streak
                        ),
                    });
                }
                _ => {}
            }
            if state.budget_exhausted() {
                warn!(
                    "Loop '{}' reached iteration {} of {}: iteration budget exhausted",
                    state.name, state.iteration, state.max_iterations
                );
                state.finish(LoopStatus::Aborted, StopReason::BudgetExhausted);
                state.touch();
                return Ok(TurnStart::Stopped {
                    reason: StopReason::BudgetExhausted,
                });
            }

            let kind = state.next_turn_kind();
            let task_text = self.read_task(state);
            if task_text.is_none() {
                warn!(
                    "Task file {} for loop '{}' is missing",
                    self.task_path(state).display(),
                    state.name
                );
            }
            let checklist = task_text.as_deref().map(ChecklistProgress::measure);
            let prompt = {
                let ctx = PromptContext::from_state(state, task_text.as_deref());
                self.renderer().render(kind, &ctx)
            };

            let mut turn = ActiveTurn::new(kind);
            turn.hints_consumed = state.pending_hints.len();
            let turn_id = turn.id;
            state.active_turn = Some(turn);

            info!(
                "Loop '{}': dispatching {} turn for iteration {}{}",
                state.name,
                kind,
                state.iteration,
                state.max_iterations_suffix()
            );
            debug!("Turn {} prompt is {} chars", turn_id, prompt.len());

            Ok(TurnStart::Dispatch(TurnPlan {
                turn_id,
                kind,
                iteration: state.iteration,
                prompt,
                checklist,
            }))
        })
    }

    /// Finish the in-flight turn with the agent's output.
    ///
    /// # Errors
    ///
    /// `NoTurnInFlight` when no turn was started, plus any load/save failure.
    pub fn on_turn_end(&self, name: &str, output: TurnOutput) -> Result<TurnEnd> {
        let history_limit = self.settings().history_limit;
        let detector = self.detector();

        self.update(name, |state| {
            if state.is_terminal() {
                debug!(
                    "Loop '{}' is {}; ignoring turn end",
                    state.name, state.status
                );
                return Ok(TurnEnd::Ignored {
                    status: state.status,
                });
            }
            let Some(turn) = state.active_turn.take() else {
                return Err(LoopError::NoTurnInFlight {
                    name: state.name.clone(),
                });
            };

            let text = match &output {
                TurnOutput::Text(text) => text.as_str(),
                TurnOutput::Failed(message) => {
                    warn!("Loop '{}': agent turn failed: {}", state.name, message);
                    ""
                }
            };

            let classification = MarkerScan::scan(text).classification();
            if classification == Classification::Conflict {
                warn!(
                    "Loop '{}': output contains both completion markers; treating as no marker",
                    state.name
                );
            }

            let task_text = self.read_task(state);
            let checklist = task_text.as_deref().map(ChecklistProgress::measure);
            let iteration = state.iteration;

            let outcome = match classification {
                Classification::Complete => {
                    info!("Loop '{}' completed at iteration {}", state.name, iteration);
                    state.finish(LoopStatus::Completed, StopReason::AgentCompleted);
                    IterationOutcome::Completed
                }
                Classification::Abort => {
                    warn!("Loop '{}' aborted by agent at iteration {}", state.name, iteration);
                    state.finish(LoopStatus::Aborted, StopReason::AgentAborted);
                    IterationOutcome::Aborted
                }
                Classification::Conflict | Classification::NoMarker => {
                    let outcome = if turn.kind == TurnKind::Checkpoint {
                        debug!("Loop '{}': checkpoint recorded", state.name);
                        IterationOutcome::Checkpoint
                    } else if text.trim().is_empty() {
                        state.record_no_progress();
                        IterationOutcome::Failed
                    } else if let Some(progress) = checklist {
                        if state.record_measurement(progress.done) {
                            info!("Loop '{}': progress {}", state.name, progress);
                            IterationOutcome::Progressed
                        } else {
                            debug!(
                                "Loop '{}': no progress ({}), streak {}",
                                state.name, progress, state.no_progress_streak
                            );
                            IterationOutcome::NoProgress
                        }
                    } else {
                        warn!(
                            "Loop '{}': task file missing, counting as no progress",
                            state.name
                        );
                        state.record_no_progress();
                        IterationOutcome::NoProgress
                    };

                    if turn.kind != TurnKind::Checkpoint && state.status.is_live() {
                        let struggling = detector.is_struggling(state);
                        match (state.status, struggling) {
                            (LoopStatus::Running, true) => {
                                warn!(
                                    "Loop '{}' is stuck: {} iterations without progress",
                                    state.name, state.no_progress_streak
                                );
                                state.status = LoopStatus::Stuck;
                            }
                            (LoopStatus::Stuck, false) => {
                                info!("Loop '{}' is making progress again", state.name);
                                state.status = LoopStatus::Running;
                            }
                            _ => {}
                        }
                    }

                    state.iteration += 1;
                    outcome
                }
            };

            let consumed = turn.hints_consumed.min(state.pending_hints.len());
            state.pending_hints.drain(..consumed);
            if turn.kind == TurnKind::Rotation {
                state.rotation_pending = false;
            }
            state.push_history(
                IterationRecord {
                    iteration,
                    kind: turn.kind,
                    outcome,
                    done: checklist.map_or(0, |c| c.done),
                    total: checklist.map_or(0, |c| c.total),
                    task_digest: task_text.as_deref().map(task_digest),
                    started_at: turn.started_at,
                    finished_at: Utc::now(),
                },
                history_limit,
            );
            state.touch();

            Ok(TurnEnd::Recorded(TurnReport {
                kind: turn.kind,
                iteration,
                classification,
                outcome,
                status: state.status,
                no_progress_streak: state.no_progress_streak,
                checklist,
                struggling: detector.is_struggling(state),
            }))
        })
    }

    /// Drop the in-flight turn, leaving the record as it was before it started.
    ///
    /// # Errors
    ///
    /// `NoTurnInFlight` when nothing is in flight.
    pub fn cancel_turn(&self, name: &str) -> Result<()> {
        self.update(name, |state| match state.active_turn.take() {
            Some(turn) => {
                info!(
                    "Loop '{}': cancelled {} turn for iteration {}",
                    state.name, turn.kind, state.iteration
                );
                Ok(())
            }
            None => Err(LoopError::NoTurnInFlight {
                name: state.name.clone(),
            }),
        })
    }

    /// Discard an in-flight turn left behind by a crashed process.
    ///
    /// Returns whether a stale turn was found.
    ///
    /// # Errors
    ///
    /// Returns load/save failures.
    pub fn discard_stale_turn(&self, name: &str) -> Result<bool> {
        self.update(name, |state| match state.active_turn.take() {
            Some(turn) => {
                warn!(
                    "Loop '{}': discarding stale {} turn {} started at {}",
                    state.name, turn.kind, turn.id, turn.started_at
                );
                Ok(true)
            }
            None => Ok(false),
        })
    }
}
