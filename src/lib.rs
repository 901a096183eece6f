//! ralph-loop - resumable build/plan loop controller
//!
//! Drives a coding agent through repeated iterations against a persistent
//! task file until the agent signals completion or abort, or an iteration
//! budget runs out. Loop state survives process restarts.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`] - Settings loading and validation
//! - [`error`] - Error types and handling
//! - [`store`] - Atomic, locked persistence of loop state records
//! - [`r#loop`] - The loop state machine and its detectors
//! - [`prompt`] - Prompt templates and rendering
//! - [`testing`] - Testing infrastructure (traits, mocks, fixtures)
//!
//! # Example
//!
//! ```rust,ignore
//! use ralph_loop::r#loop::{LoopDriver, LoopRunner, NewLoop};
//! use ralph_loop::r#loop::operations::CliAgentRuntime;
//!
//! let driver = LoopDriver::open(".")?;
//! driver.create(NewLoop::new("auth", "TASKS.md").with_max_iterations(20))?;
//!
//! let agent = CliAgentRuntime::new(".", &driver.settings().agent);
//! let summary = LoopRunner::new(driver, "auth", agent).run().await?;
//! println!("{}", summary.describe());
//! ```

pub mod config;
pub mod error;
pub mod r#loop;
pub mod prompt;
pub mod store;
pub mod testing;

// Re-export commonly used types
pub use error::{LoopError, Result};

pub use config::{AgentCommandConfig, Settings, StuckPolicy};

pub use r#loop::marker::{classify, Classification, ABORT_MARKER, COMPLETE_MARKER};
pub use r#loop::progress::ChecklistProgress;
pub use r#loop::{
    HostEvent, HostSession, LoopDriver, LoopMode, LoopRunner, LoopState, LoopStatus, NewLoop,
    RunExit, RunSummary, TurnOutput, TurnStart,
};

pub use store::StateStore;

pub use testing::{AgentRuntime, ScriptedAgent};
