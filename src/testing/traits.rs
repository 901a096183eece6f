//! Trait definitions for testable abstractions.
//!
//! The agent runtime is the only external dependency the loop needs
//! abstracted: everything else is the local file system.

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction for the host agent runtime.
///
/// One call is one turn: hand over a rendered prompt, get back the agent's
/// output text. An `Err` is a dispatch failure, which the driver counts as
/// a turn without progress rather than a fatal error.
///
/// # Example
///
/// ```rust,ignore
/// use ralph_loop::testing::AgentRuntime;
///
/// async fn one_turn(agent: &impl AgentRuntime, prompt: &str) -> String {
///     agent.run_turn(prompt).await.unwrap_or_default()
/// }
/// ```
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run a single agent turn with the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be run or exited abnormally.
    async fn run_turn(&self, prompt: &str) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "agent"
    }
}

#[async_trait]
impl<T: AgentRuntime + ?Sized> AgentRuntime for std::sync::Arc<T> {
    async fn run_turn(&self, prompt: &str) -> Result<String> {
        (**self).run_turn(prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
