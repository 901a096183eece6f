//! Testing infrastructure for the loop controller.
//!
//! - **Traits**: the [`AgentRuntime`] seam between the loop and the agent
//! - **Mocks**: [`ScriptedAgent`], a runtime that replays scripted turns
//! - **Fixtures**: temporary projects with a task file (test-only)
//! - **Assertions**: loop-state assertions with useful failure messages
//!
//! # Example
//!
//! ```rust,ignore
//! use ralph_loop::testing::{AgentRuntime, ScriptedAgent};
//!
//! let agent = ScriptedAgent::new()
//!     .reply("working on it")
//!     .reply("<promise>COMPLETE</promise>");
//! ```

pub mod assertions;
#[cfg(test)]
pub mod fixtures;
pub mod mocks;
pub mod traits;

pub use assertions::*;
#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r#loop::state::{LoopStatus, NewLoop, StopReason};

    #[tokio::test]
    async fn test_scripted_agent_replays_in_order() {
        let agent = ScriptedAgent::new().reply("one").fail("boom").reply("three");

        assert_eq!(agent.run_turn("p1").await.unwrap(), "one");
        assert!(agent
            .run_turn("p2")
            .await
            .unwrap_err()
            .to_string()
            .contains("boom"));
        assert_eq!(agent.run_turn("p3").await.unwrap(), "three");
        assert_eq!(agent.run_turn("p4").await.unwrap(), "");

        assert_eq!(agent.call_count(), 4);
        assert_eq!(agent.prompts(), vec!["p1", "p2", "p3", "p4"]);
        assert_eq!(agent.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_agent_fallback() {
        let agent = ScriptedAgent::new().with_fallback("still here");
        assert_eq!(agent.run_turn("p").await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn test_scripted_agent_writes_file() {
        let fixture = TestFixture::two_open_tasks();
        let agent = ScriptedAgent::new().reply_writing(
            fixture.task_path(),
            "- [x] first\n- [ ] second\n",
            "did first",
        );
        agent.run_turn("p").await.unwrap();
        let text = std::fs::read_to_string(fixture.task_path()).unwrap();
        assert!(text.contains("- [x] first"));
    }

    #[test]
    fn test_fixture_driver() {
        let fixture = TestFixture::two_open_tasks();
        let driver = fixture.driver();
        let state = driver
            .create(NewLoop::new("demo", TestFixture::TASK_FILE))
            .unwrap();
        assert_status(&state, LoopStatus::Running);

        let stopped = driver.stop("demo").unwrap();
        assert_stopped(&stopped, StopReason::UserStopped);
    }
}
