//! Loop controller module.
//!
//! - [`state`] - persisted loop state and its transitions
//! - [`progress`] - checklist progress meter
//! - [`marker`] - completion/abort marker protocol
//! - [`struggle`] - no-progress detection
//! - [`driver`] - the per-loop state machine and host event dispatch
//! - [`watchdog`] - inactivity timer
//! - [`host`] - driver plus watchdog for hook-style hosts
//! - [`runner`] - drives a loop with an agent runtime
//! - [`operations`] - real agent runtime backed by a CLI command
//!
//! # Architecture
//!
//! Data flows one way per iteration:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ LoopDriver  │────>│ StateStore   │────>│ LoopState   │
//! │             │     │              │     │             │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!       │                    │                    │
//!       v                    v                    v
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ Prompt      │     │ Checklist    │     │ Struggle    │
//! │ Renderer    │     │ Progress     │     │ Detector    │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!       │
//!       v
//! ┌─────────────┐     ┌──────────────┐
//! │ Agent       │────>│ Marker       │──> back to LoopDriver
//! │ Runtime     │     │ Scan         │
//! └─────────────┘     └──────────────┘
//! ```

pub mod driver;
pub mod host;
pub mod marker;
pub mod operations;
pub mod progress;
pub mod runner;
pub mod state;
pub mod struggle;
pub mod watchdog;

// Re-exports for convenience
pub use driver::{HostEvent, LoopDriver, TurnOutput, TurnStart};
pub use host::HostSession;
pub use runner::{LoopRunner, RunExit, RunSummary};
pub use state::{LoopMode, LoopState, LoopStatus, NewLoop};
