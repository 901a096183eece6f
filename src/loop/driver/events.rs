//! Host event dispatch.
//!
//! Hook-style hosts deliver lifecycle signals as [`HostEvent`] values; each
//! maps onto exactly one driver entry point.

use serde::{Deserialize, Serialize};

use super::{HintScope, LoopDriver, TurnEnd, TurnOutput, TurnStart};
use crate::error::Result;
use crate::r#loop::state::LoopState;

/// Every signal a host can send to a loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    TurnStart,
    TurnEnd { output: String },
    TurnFailed { message: String },
    TurnCancelled,
    ToolCallStart { tool: String },
    ToolCallEnd { tool: String },
    SessionRotated,
    Compacted,
    Pause,
    Resume,
    Stop,
    AddHint { text: String, sticky: bool },
    RemoveHint { index: usize },
    InactivityTimeout,
}

impl HostEvent {
    /// True for signals that show the agent is doing something.
    ///
    /// These rearm the inactivity watchdog.
    #[must_use]
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            HostEvent::TurnStart
                | HostEvent::TurnEnd { .. }
                | HostEvent::TurnFailed { .. }
                | HostEvent::TurnCancelled
                | HostEvent::ToolCallStart { .. }
                | HostEvent::ToolCallEnd { .. }
                | HostEvent::SessionRotated
                | HostEvent::Compacted
        )
    }
}

/// What handling an event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    TurnStarted(TurnStart),
    TurnEnded(TurnEnd),
    Updated(LoopState),
    HintRemoved(String),
    /// Whether the tool waits on the user.
    ToolCall { waiting: bool },
    /// Whether the watchdog marked the loop stuck.
    Inactivity { marked_stuck: bool },
    Cancelled,
}

impl LoopDriver {
    /// Route a host event to its entry point.
    ///
    /// # Errors
    ///
    /// Propagates the entry point's error.
    pub fn handle(&self, name: &str, event: HostEvent) -> Result<EventOutcome> {
        let outcome = match event {
            HostEvent::TurnStart => EventOutcome::TurnStarted(self.on_turn_start(name)?),
            HostEvent::TurnEnd { output } => {
                EventOutcome::TurnEnded(self.on_turn_end(name, TurnOutput::Text(output))?)
            }
            HostEvent::TurnFailed { message } => {
                EventOutcome::TurnEnded(self.on_turn_end(name, TurnOutput::Failed(message))?)
            }
            HostEvent::TurnCancelled => {
                self.cancel_turn(name)?;
                EventOutcome::Cancelled
            }
            HostEvent::ToolCallStart { tool } => EventOutcome::ToolCall {
                waiting: self.on_tool_call_start(name, &tool)?,
            },
            HostEvent::ToolCallEnd { tool } => EventOutcome::ToolCall {
                waiting: self.on_tool_call_end(name, &tool)?,
            },
            HostEvent::SessionRotated => EventOutcome::Updated(self.on_session_rotated(name)?),
            HostEvent::Compacted => EventOutcome::Updated(self.on_compaction(name)?),
            HostEvent::Pause => EventOutcome::Updated(self.pause(name)?),
            HostEvent::Resume => EventOutcome::Updated(self.resume(name)?),
            HostEvent::Stop => EventOutcome::Updated(self.stop(name)?),
            HostEvent::AddHint { text, sticky } => {
                let scope = if sticky {
                    HintScope::Sticky
                } else {
                    HintScope::Pending
                };
                EventOutcome::Updated(self.add_hint(name, &text, scope)?)
            }
            HostEvent::RemoveHint { index } => {
                EventOutcome::HintRemoved(self.remove_hint(name, index)?)
            }
            HostEvent::InactivityTimeout => EventOutcome::Inactivity {
                marked_stuck: self.on_inactivity_timeout(name)?,
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::r#loop::marker::COMPLETE_MARKER;
    use crate::r#loop::state::{LoopStatus, NewLoop};
    use tempfile::TempDir;

    #[test]
    fn test_event_json_shape() {
        let event: HostEvent =
            serde_json::from_str(r#"{"event":"tool_call_start","tool":"Bash"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::ToolCallStart {
                tool: "Bash".into()
            }
        );
        let json = serde_json::to_string(&HostEvent::Pause).unwrap();
        assert_eq!(json, r#"{"event":"pause"}"#);
    }

    #[test]
    fn test_activity_classification() {
        assert!(HostEvent::TurnStart.is_activity());
        assert!(HostEvent::ToolCallEnd { tool: "x".into() }.is_activity());
        assert!(!HostEvent::Pause.is_activity());
        assert!(!HostEvent::InactivityTimeout.is_activity());
    }

    #[test]
    fn test_handle_full_turn() {
        let temp = TempDir::new().unwrap();
        let driver = LoopDriver::with_settings(temp.path(), Settings::default()).unwrap();
        driver.create(NewLoop::new("demo", "TASKS.md")).unwrap();

        let started = driver.handle("demo", HostEvent::TurnStart).unwrap();
        assert!(matches!(
            started,
            EventOutcome::TurnStarted(TurnStart::Dispatch(_))
        ));

        let ended = driver
            .handle(
                "demo",
                HostEvent::TurnEnd {
                    output: COMPLETE_MARKER.to_string(),
                },
            )
            .unwrap();
        match ended {
            EventOutcome::TurnEnded(TurnEnd::Recorded(report)) => {
                assert_eq!(report.status, LoopStatus::Completed);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_handle_hint_events() {
        let temp = TempDir::new().unwrap();
        let driver = LoopDriver::with_settings(temp.path(), Settings::default()).unwrap();
        driver.create(NewLoop::new("demo", "TASKS.md")).unwrap();

        driver
            .handle(
                "demo",
                HostEvent::AddHint {
                    text: "keep it small".into(),
                    sticky: true,
                },
            )
            .unwrap();
        let removed = driver
            .handle("demo", HostEvent::RemoveHint { index: 0 })
            .unwrap();
        assert_eq!(removed, EventOutcome::HintRemoved("keep it small".into()));
    }
}
