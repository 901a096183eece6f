//! User commands and external counters for `LoopDriver`.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::LoopDriver;
use crate::error::{LoopError, Result};
use crate::prompt::PromptContext;
use crate::r#loop::progress::{open_items, ChecklistProgress};
use crate::r#loop::state::{validate_name, LoopState, LoopStatus, NewLoop, StopReason};

/// Which hint list a new hint goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintScope {
    /// Injected into every prompt until removed.
    Sticky,
    /// Injected into the next prompt only.
    Pending,
}

/// A loop's state with its derived checklist counts.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOverview {
    pub state: LoopState,
    /// `None` when the task file is missing.
    pub checklist: Option<ChecklistProgress>,
    /// First unchecked item, if any.
    pub next_item: Option<String>,
    pub struggling: bool,
}

fn task_scaffold(name: &str) -> String {
    format!(
        "# Tasks: {name}\n\n\
         Replace this list with the work for this loop. The agent checks items\n\
         off as it finishes them.\n\n\
         - [ ] Describe the first task\n"
    )
}

impl LoopDriver {
    /// Create a new loop, scaffolding its task file if it does not exist.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `AlreadyExists`, or a failure writing the task file
    /// or the record.
    pub fn create(&self, spec: NewLoop) -> Result<LoopState> {
        validate_name(&spec.name)?;
        let name = spec.name.clone();

        self.locked(&name, |record| {
            if record.exists() {
                return Err(LoopError::AlreadyExists { name: name.clone() });
            }

            let task_path = if spec.task_file.is_absolute() {
                spec.task_file.clone()
            } else {
                self.project_dir().join(&spec.task_file)
            };

            let initial_done = match self.store().try_read_text(&task_path) {
                Some(text) => ChecklistProgress::measure(&text).done,
                None => {
                    if let Some(parent) = task_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&task_path, task_scaffold(&name))?;
                    info!("Created task file {}", task_path.display());
                    0
                }
            };

            let state = LoopState::new(spec, initial_done);
            record.save(&state)?;
            info!(
                "Created loop '{}' ({} mode, task file {})",
                state.name,
                state.mode,
                state.task_file.display()
            );
            Ok(state)
        })
    }

    /// Current state plus checklist counts.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load failure.
    pub fn overview(&self, name: &str) -> Result<LoopOverview> {
        let state = self.store().load(name)?;
        let task_text = self.read_task(&state);
        let checklist = task_text.as_deref().map(ChecklistProgress::measure);
        let next_item = task_text
            .as_deref()
            .and_then(|text| open_items(text).into_iter().next());
        let struggling = self.detector().is_struggling(&state);
        Ok(LoopOverview {
            state,
            checklist,
            next_item,
            struggling,
        })
    }

    /// Overviews for every loop in the project.
    ///
    /// Records that fail to load are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the loops directory cannot be listed.
    pub fn list(&self) -> Result<Vec<LoopOverview>> {
        let mut loops = Vec::new();
        for name in self.store().list()? {
            match self.overview(&name) {
                Ok(overview) => loops.push(overview),
                Err(e) => warn!("Skipping loop '{}': {}", name, e),
            }
        }
        Ok(loops)
    }

    /// Render the prompt the next turn would get, without starting it.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load failure.
    pub fn preview_prompt(&self, name: &str) -> Result<String> {
        let state = self.store().load(name)?;
        let task_text = self.read_task(&state);
        let ctx = PromptContext::from_state(&state, task_text.as_deref());
        Ok(self.renderer().render(state.next_turn_kind(), &ctx))
    }

    /// Pause a running or stuck loop.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the loop is live.
    pub fn pause(&self, name: &str) -> Result<LoopState> {
        self.update(name, |state| {
            if !state.status.is_live() {
                return Err(LoopError::invalid_transition(
                    &state.name,
                    state.status,
                    "pause",
                ));
            }
            state.status = LoopStatus::Paused;
            state.touch();
            info!("Paused loop '{}' at iteration {}", state.name, state.iteration);
            Ok(state.clone())
        })
    }

    /// Resume a paused or stuck loop. Resuming a running loop is a no-op.
    ///
    /// Resuming from `Stuck` clears the no-progress streak.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for terminal loops.
    pub fn resume(&self, name: &str) -> Result<LoopState> {
        self.update(name, |state| {
            match state.status {
                LoopStatus::Running => {
                    debug!("Loop '{}' is already running", state.name);
                }
                LoopStatus::Paused => {
                    state.status = LoopStatus::Running;
                    state.touch();
                    info!("Resumed loop '{}'", state.name);
                }
                LoopStatus::Stuck => {
                    state.status = LoopStatus::Running;
                    state.no_progress_streak = 0;
                    state.touch();
                    info!("Resumed stuck loop '{}'; streak cleared", state.name);
                }
                LoopStatus::Completed | LoopStatus::Aborted => {
                    return Err(LoopError::invalid_transition(
                        &state.name,
                        state.status,
                        "resume",
                    ));
                }
            }
            Ok(state.clone())
        })
    }

    /// Stop a loop for good.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the loop is already terminal.
    pub fn stop(&self, name: &str) -> Result<LoopState> {
        self.update(name, |state| {
            if state.is_terminal() {
                return Err(LoopError::invalid_transition(
                    &state.name,
                    state.status,
                    "stop",
                ));
            }
            state.finish(LoopStatus::Aborted, StopReason::UserStopped);
            state.touch();
            info!("Stopped loop '{}' at iteration {}", state.name, state.iteration);
            Ok(state.clone())
        })
    }

    /// Add a hint for future prompts.
    ///
    /// # Errors
    ///
    /// `InvalidHint` for blank text, `InvalidTransition` for terminal loops.
    pub fn add_hint(&self, name: &str, text: &str, scope: HintScope) -> Result<LoopState> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LoopError::InvalidHint {
                reason: "hint text must not be empty".to_string(),
            });
        }

        self.update(name, |state| {
            if state.is_terminal() {
                return Err(LoopError::invalid_transition(
                    &state.name,
                    state.status,
                    "add a hint to",
                ));
            }
            match scope {
                HintScope::Sticky => state.sticky_hints.push(text.to_string()),
                HintScope::Pending => state.pending_hints.push(text.to_string()),
            }
            state.touch();
            info!("Loop '{}': added {:?} hint", state.name, scope);
            Ok(state.clone())
        })
    }

    /// Remove a sticky hint by zero-based index, returning its text.
    ///
    /// # Errors
    ///
    /// `HintNotFound` when the index is out of range, `InvalidTransition`
    /// for terminal loops.
    pub fn remove_hint(&self, name: &str, index: usize) -> Result<String> {
        self.update(name, |state| {
            if state.is_terminal() {
                return Err(LoopError::invalid_transition(
                    &state.name,
                    state.status,
                    "remove a hint from",
                ));
            }
            if index >= state.sticky_hints.len() {
                return Err(LoopError::HintNotFound {
                    name: state.name.clone(),
                    index,
                });
            }
            let removed = state.sticky_hints.remove(index);
            state.touch();
            info!("Loop '{}': removed sticky hint {}", state.name, index);
            Ok(removed)
        })
    }

    /// Record that the host rotated the agent session.
    ///
    /// The counter always moves; a bootstrap turn is queued only for loops
    /// that can still dispatch.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load/save failure.
    pub fn on_session_rotated(&self, name: &str) -> Result<LoopState> {
        self.update(name, |state| {
            state.session_rotations += 1;
            if !state.is_terminal() {
                state.rotation_pending = true;
            }
            state.touch();
            info!(
                "Loop '{}': session rotation {}",
                state.name, state.session_rotations
            );
            Ok(state.clone())
        })
    }

    /// Record that the host compacted the agent's context.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load/save failure.
    pub fn on_compaction(&self, name: &str) -> Result<LoopState> {
        self.update(name, |state| {
            state.compaction_count += 1;
            state.touch();
            debug!(
                "Loop '{}': context compaction {}",
                state.name, state.compaction_count
            );
            Ok(state.clone())
        })
    }

    /// Note a tool call starting. Returns whether it waits on the user.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load/save failure.
    pub fn on_tool_call_start(&self, name: &str, tool: &str) -> Result<bool> {
        if !self.settings().is_waiting_tool(tool) {
            return Ok(false);
        }
        self.update(name, |state| {
            if let Some(turn) = state.active_turn.as_mut() {
                turn.awaiting_user = true;
                debug!("Loop '{}': waiting on user via {}", state.name, tool);
            }
            Ok(true)
        })
    }

    /// Note a tool call finishing. Returns whether it waited on the user.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load/save failure.
    pub fn on_tool_call_end(&self, name: &str, tool: &str) -> Result<bool> {
        if !self.settings().is_waiting_tool(tool) {
            return Ok(false);
        }
        self.update(name, |state| {
            if let Some(turn) = state.active_turn.as_mut() {
                turn.awaiting_user = false;
            }
            Ok(true)
        })
    }

    /// Handle the inactivity watchdog firing.
    ///
    /// Marks the loop `Stuck` only if it is `Running` with a turn in flight
    /// that is not waiting on the user; otherwise does nothing. Returns
    /// whether the loop was marked.
    ///
    /// # Errors
    ///
    /// `NotFound` or a load/save failure.
    pub fn on_inactivity_timeout(&self, name: &str) -> Result<bool> {
        self.update(name, |state| {
            let eligible = state.status == LoopStatus::Running
                && state
                    .active_turn
                    .as_ref()
                    .is_some_and(|turn| !turn.awaiting_user);
            if !eligible {
                debug!("Loop '{}': inactivity timer fired, nothing to do", state.name);
                return Ok(false);
            }
            warn!(
                "Loop '{}': no agent activity within the inactivity timeout; marking stuck",
                state.name
            );
            state.status = LoopStatus::Stuck;
            state.touch();
            Ok(true)
        })
    }

    /// Move a loop's record to the archive directory.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `TurnInFlight` while a turn is running.
    pub fn archive(&self, name: &str) -> Result<PathBuf> {
        self.locked(name, |record| {
            let state = record.load()?;
            if state.active_turn.is_some() && !state.is_terminal() {
                return Err(LoopError::TurnInFlight {
                    name: state.name.clone(),
                });
            }
            let path = record.archive()?;
            info!("Archived loop '{}' to {}", name, path.display());
            Ok(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::r#loop::driver::TurnStart;
    use crate::r#loop::state::TurnKind;
    use tempfile::TempDir;

    fn setup() -> (LoopDriver, TempDir) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("TASKS.md"), "- [x] a\n- [ ] b\n").unwrap();
        let driver = LoopDriver::with_settings(temp.path(), Settings::default()).unwrap();
        driver.create(NewLoop::new("demo", "TASKS.md")).unwrap();
        (driver, temp)
    }

    #[test]
    fn test_create_measures_baseline() {
        let (driver, _temp) = setup();
        let state = driver.store().load("demo").unwrap();
        assert_eq!(state.iteration, 1);
        assert_eq!(state.status, LoopStatus::Running);
        assert_eq!(state.last_done, 1);
    }

    #[test]
    fn test_create_rejects_duplicate_and_bad_names() {
        let (driver, _temp) = setup();
        assert!(matches!(
            driver.create(NewLoop::new("demo", "TASKS.md")),
            Err(LoopError::AlreadyExists { .. })
        ));
        assert!(matches!(
            driver.create(NewLoop::new("../escape", "TASKS.md")),
            Err(LoopError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_create_scaffolds_missing_task_file() {
        let (driver, temp) = setup();
        driver
            .create(NewLoop::new("fresh", "docs/fresh/TASKS.md"))
            .unwrap();
        let text = fs::read_to_string(temp.path().join("docs/fresh/TASKS.md")).unwrap();
        assert!(text.contains("- [ ]"));
        assert_eq!(driver.overview("fresh").unwrap().checklist.unwrap().done, 0);
    }

    #[test]
    fn test_overview_and_list() {
        let (driver, _temp) = setup();
        let overview = driver.overview("demo").unwrap();
        let checklist = overview.checklist.unwrap();
        assert_eq!((checklist.done, checklist.total), (1, 2));
        assert!(!overview.struggling);
        assert_eq!(driver.list().unwrap().len(), 1);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let (driver, _temp) = setup();
        assert_eq!(driver.pause("demo").unwrap().status, LoopStatus::Paused);
        assert!(matches!(
            driver.pause("demo"),
            Err(LoopError::InvalidTransition { .. })
        ));
        assert!(matches!(
            driver.on_turn_start("demo").unwrap(),
            TurnStart::Refused {
                status: LoopStatus::Paused,
                ..
            }
        ));
        assert_eq!(driver.resume("demo").unwrap().status, LoopStatus::Running);
        assert_eq!(driver.resume("demo").unwrap().status, LoopStatus::Running);
    }

    #[test]
    fn test_resume_from_stuck_clears_streak() {
        let (driver, _temp) = setup();
        driver
            .update("demo", |state| {
                state.status = LoopStatus::Stuck;
                state.no_progress_streak = 5;
                Ok(())
            })
            .unwrap();
        let state = driver.resume("demo").unwrap();
        assert_eq!(state.status, LoopStatus::Running);
        assert_eq!(state.no_progress_streak, 0);
    }

    #[test]
    fn test_stop_is_terminal() {
        let (driver, _temp) = setup();
        let state = driver.stop("demo").unwrap();
        assert_eq!(state.status, LoopStatus::Aborted);
        assert_eq!(state.stop_reason, Some(StopReason::UserStopped));

        assert!(driver.stop("demo").is_err());
        assert!(driver.resume("demo").is_err());
        assert!(driver.pause("demo").is_err());
        assert!(driver.add_hint("demo", "x", HintScope::Sticky).is_err());
    }

    #[test]
    fn test_hints() {
        let (driver, _temp) = setup();
        driver.add_hint("demo", "  first  ", HintScope::Sticky).unwrap();
        driver.add_hint("demo", "second", HintScope::Sticky).unwrap();
        driver.add_hint("demo", "once", HintScope::Pending).unwrap();

        let state = driver.store().load("demo").unwrap();
        assert_eq!(state.sticky_hints, vec!["first", "second"]);
        assert_eq!(state.pending_hints, vec!["once"]);

        assert_eq!(driver.remove_hint("demo", 0).unwrap(), "first");
        assert!(matches!(
            driver.remove_hint("demo", 5),
            Err(LoopError::HintNotFound { index: 5, .. })
        ));
        assert!(matches!(
            driver.add_hint("demo", "   ", HintScope::Pending),
            Err(LoopError::InvalidHint { .. })
        ));
    }

    #[test]
    fn test_session_rotation_queues_bootstrap() {
        let (driver, _temp) = setup();
        let state = driver.on_session_rotated("demo").unwrap();
        assert_eq!(state.session_rotations, 1);
        assert!(state.rotation_pending);
        assert_eq!(state.next_turn_kind(), TurnKind::Rotation);
        assert!(driver.preview_prompt("demo").unwrap().contains("rotation 1"));
    }

    #[test]
    fn test_rotation_counter_moves_on_terminal_loop() {
        let (driver, _temp) = setup();
        driver.stop("demo").unwrap();
        let state = driver.on_session_rotated("demo").unwrap();
        assert_eq!(state.session_rotations, 1);
        assert!(!state.rotation_pending);
        assert_eq!(driver.on_compaction("demo").unwrap().compaction_count, 1);
    }

    #[test]
    fn test_waiting_tool_blocks_inactivity() {
        let (driver, _temp) = setup();
        assert!(!driver.on_inactivity_timeout("demo").unwrap());

        driver.on_turn_start("demo").unwrap();
        assert!(driver.on_tool_call_start("demo", "AskUserQuestion").unwrap());
        assert!(!driver.on_inactivity_timeout("demo").unwrap());

        assert!(driver.on_tool_call_end("demo", "AskUserQuestion").unwrap());
        assert!(!driver.on_tool_call_start("demo", "Bash").unwrap());
        assert!(driver.on_inactivity_timeout("demo").unwrap());
        assert_eq!(
            driver.store().load("demo").unwrap().status,
            LoopStatus::Stuck
        );
        // A second firing finds the loop out of Running.
        assert!(!driver.on_inactivity_timeout("demo").unwrap());
    }

    #[test]
    fn test_archive_moves_record() {
        let (driver, _temp) = setup();
        let path = driver.archive("demo").unwrap();
        assert!(path.exists());
        assert!(matches!(
            driver.overview("demo"),
            Err(LoopError::NotFound { .. })
        ));
    }
}
