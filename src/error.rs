//! Error types for the loop controller.
//!
//! Only persistence-class failures and invalid user commands surface as
//! errors. Missing task files and conflicting markers are absorbed into
//! loop state and reported through `tracing`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for loop controller operations
#[derive(Error, Debug)]
pub enum LoopError {
    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// No state record exists for the loop name
    #[error("Loop '{name}' not found. Start it with `ralph-loop start {name}`")]
    NotFound { name: String },

    /// A live record already exists for the loop name
    #[error("Loop '{name}' already exists")]
    AlreadyExists { name: String },

    /// Loop name cannot be used as a record key
    #[error("Invalid loop name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    // =========================================================================
    // State Machine Errors
    // =========================================================================
    /// Command not valid for the loop's current status
    #[error("Cannot {action} loop '{name}' while it is {status}")]
    InvalidTransition {
        name: String,
        status: String,
        action: String,
    },

    /// A turn is already in flight for this loop
    #[error("Loop '{name}' already has a turn in flight")]
    TurnInFlight { name: String },

    /// Turn end or cancel without a matching turn start
    #[error("Loop '{name}' has no turn in flight")]
    NoTurnInFlight { name: String },

    /// Hint index out of range
    #[error("Loop '{name}' has no sticky hint at index {index}")]
    HintNotFound { name: String, index: usize },

    /// Hint text rejected
    #[error("Invalid hint: {reason}")]
    InvalidHint { reason: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// State record exists but cannot be parsed
    #[error("Corrupted loop state at {path}: {message}")]
    CorruptState { path: PathBuf, message: String },

    /// State record was written by a newer schema
    #[error("Unsupported loop state version {found} (supported up to {supported})")]
    IncompatibleVersion { found: u32, supported: u32 },

    /// Failed to acquire the per-record file lock
    #[error("Failed to lock {path}: {message}")]
    Lock { path: PathBuf, message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Agent Runtime Errors
    // =========================================================================
    /// Agent runtime could not be used at all
    #[error("Agent runtime error: {message}")]
    Agent { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        name: impl Into<String>,
        status: impl ToString,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            name: name.into(),
            status: status.to_string(),
            action: action.into(),
        }
    }

    /// Create an agent runtime error
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is a persistence failure.
    ///
    /// Persistence failures leave the turn failed-but-retryable: the
    /// previous record is still intact on disk.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Json(_) | Self::Lock { .. } | Self::CorruptState { .. }
        )
    }

    /// Check if the caller can fix this without touching stored state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::TurnInFlight { .. }
                | Self::NoTurnInFlight { .. }
                | Self::HintNotFound { .. }
                | Self::InvalidHint { .. }
                | Self::InvalidTransition { .. }
                | Self::Io(_)
                | Self::Lock { .. }
                | Self::Agent { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::AlreadyExists { .. } | Self::InvalidName { .. } => 3,
            Self::InvalidTransition { .. }
            | Self::TurnInFlight { .. }
            | Self::NoTurnInFlight { .. }
            | Self::HintNotFound { .. }
            | Self::InvalidHint { .. } => 4,
            Self::CorruptState { .. } | Self::IncompatibleVersion { .. } => 5,
            Self::Agent { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for loop controller results
pub type Result<T> = std::result::Result<T, LoopError>;
