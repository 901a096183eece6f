//! Mock implementations of testing traits.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::traits::AgentRuntime;

/// One scripted turn.
#[derive(Debug, Clone)]
struct ScriptStep {
    output: std::result::Result<String, String>,
    /// Written before the turn returns, like an agent editing the task file.
    write: Option<(PathBuf, String)>,
    delay: Option<Duration>,
}

/// Agent runtime that replays a fixed script of turns.
///
/// Once the script runs out every further turn returns the fallback output
/// (empty by default).
///
/// # Example
///
/// ```rust,ignore
/// let agent = ScriptedAgent::new()
///     .reply_writing("TASKS.md", "- [x] a\n", "did a")
///     .reply("<promise>COMPLETE</promise>");
///
/// assert_eq!(agent.run_turn("prompt").await.unwrap(), "did a");
/// ```
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl ScriptedAgent {
    /// Create an agent with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: ScriptStep) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    /// Queue a turn that returns `output`.
    #[must_use]
    pub fn reply(self, output: &str) -> Self {
        self.push(ScriptStep {
            output: Ok(output.to_string()),
            write: None,
            delay: None,
        })
    }

    /// Queue a turn that overwrites `path` with `content`, then returns `output`.
    #[must_use]
    pub fn reply_writing(self, path: impl Into<PathBuf>, content: &str, output: &str) -> Self {
        self.push(ScriptStep {
            output: Ok(output.to_string()),
            write: Some((path.into(), content.to_string())),
            delay: None,
        })
    }

    /// Queue a turn that fails with `error`.
    #[must_use]
    pub fn fail(self, error: &str) -> Self {
        self.push(ScriptStep {
            output: Err(error.to_string()),
            write: None,
            delay: None,
        })
    }

    /// Queue a turn that sleeps for `delay` before returning `output`.
    #[must_use]
    pub fn reply_after(self, delay: Duration, output: &str) -> Self {
        self.push(ScriptStep {
            output: Ok(output.to_string()),
            write: None,
            delay: Some(delay),
        })
    }

    /// Output for turns past the end of the script.
    #[must_use]
    pub fn with_fallback(mut self, output: &str) -> Self {
        self.fallback = output.to_string();
        self
    }

    /// Number of turns run so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Scripted turns not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    async fn run_turn(&self, prompt: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let Some(step) = step else {
            return Ok(self.fallback.clone());
        };

        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((path, content)) = &step.write {
            std::fs::write(path, content)?;
        }
        match step.output {
            Ok(output) => Ok(output),
            Err(error) => bail!("{}", error),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
