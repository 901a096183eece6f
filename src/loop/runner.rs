//! Loop runner: drives one loop until it stops, pauses, or is refused.
//!
//! The runner owns nothing but a [`HostSession`] and an agent runtime; all
//! decisions are the driver's. Each cycle is start, dispatch, end.

use std::future::Future;

use tracing::{info, warn};

use super::driver::{LoopDriver, TurnEnd, TurnOutput, TurnStart};
use super::host::HostSession;
use super::state::{LoopStatus, StopReason};
use crate::config::StuckPolicy;
use crate::error::Result;
use crate::testing::AgentRuntime;

/// Why the runner returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// The loop reached a terminal status.
    Finished(StopReason),
    /// The driver refused the next turn (paused, or stuck under the pause policy).
    Refused(String),
    /// Interrupted by the caller; the in-flight turn was cancelled and the
    /// loop paused.
    Interrupted,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub name: String,
    pub turns: u32,
    pub status: LoopStatus,
    pub iteration: u32,
    pub exit: RunExit,
}

impl RunSummary {
    /// One-line description for CLI output.
    #[must_use]
    pub fn describe(&self) -> String {
        let why = match &self.exit {
            RunExit::Finished(reason) => reason.to_string(),
            RunExit::Refused(reason) => reason.clone(),
            RunExit::Interrupted => "interrupted".to_string(),
        };
        format!(
            "Loop '{}' {} after {} turn(s) at iteration {}: {}",
            self.name, self.status, self.turns, self.iteration, why
        )
    }
}

/// Drives a loop with an agent runtime.
pub struct LoopRunner<A: AgentRuntime> {
    session: HostSession,
    agent: A,
}

impl<A: AgentRuntime> LoopRunner<A> {
    /// Attach a runner to a loop.
    #[must_use]
    pub fn new(driver: LoopDriver, name: impl Into<String>, agent: A) -> Self {
        Self {
            session: HostSession::new(driver, name),
            agent,
        }
    }

    #[must_use]
    pub fn agent(&self) -> &A {
        &self.agent
    }

    #[must_use]
    pub fn session(&self) -> &HostSession {
        &self.session
    }

    /// Run until the loop stops or the driver refuses a turn.
    ///
    /// # Errors
    ///
    /// Returns persistence failures; agent failures are absorbed as turns
    /// without progress.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until done, or until `shutdown` resolves.
    ///
    /// On shutdown the in-flight turn is cancelled, leaving the record as it
    /// was before that turn, and the loop is paused.
    ///
    /// # Errors
    ///
    /// Returns persistence failures.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let name = self.session.name().to_string();
        let driver = self.session.driver();
        let pause_when_stuck = driver.settings().stuck_policy == StuckPolicy::Pause;

        driver.discard_stale_turn(&name)?;
        tokio::pin!(shutdown);

        let mut turns = 0;
        let exit = loop {
            let plan = match self.session.turn_start()? {
                TurnStart::Dispatch(plan) => plan,
                TurnStart::Refused { reason, .. } => break RunExit::Refused(reason),
                TurnStart::Stopped { reason } => break RunExit::Finished(reason),
            };

            let output = tokio::select! {
                result = self.agent.run_turn(&plan.prompt) => match result {
                    Ok(text) => TurnOutput::Text(text),
                    Err(e) => {
                        warn!("{} turn failed: {:#}", self.agent.name(), e);
                        TurnOutput::Failed(e.to_string())
                    }
                },
                () = &mut shutdown => {
                    info!("Interrupted during iteration {}; cancelling turn", plan.iteration);
                    driver.cancel_turn(&name)?;
                    driver.pause(&name)?;
                    break RunExit::Interrupted;
                }
            };
            turns += 1;

            match self.session.turn_end(output)? {
                TurnEnd::Recorded(report) => {
                    if report.is_final() {
                        let state = driver.store().load(&name)?;
                        break RunExit::Finished(
                            state.stop_reason.unwrap_or(StopReason::UserStopped),
                        );
                    }
                    if report.status == LoopStatus::Stuck && pause_when_stuck {
                        info!("Loop '{}' is stuck; waiting for the operator", name);
                    }
                }
                TurnEnd::Ignored { .. } => {
                    let state = driver.store().load(&name)?;
                    break RunExit::Finished(
                        state.stop_reason.unwrap_or(StopReason::UserStopped),
                    );
                }
            }
        };

        let state = driver.store().load(&name)?;
        let summary = RunSummary {
            name,
            turns,
            status: state.status,
            iteration: state.iteration,
            exit,
        };
        info!("{}", summary.describe());
        Ok(summary)
    }
}
