//! Configuration management for the loop controller.
//!
//! Settings are read from `.ralph/settings.json` in the project directory.
//! Every key is optional; a missing file yields the defaults.
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "struggleThreshold": 4,
//!   "inactivityTimeoutSecs": 900,
//!   "stuckPolicy": "pause",
//!   "waitingTools": ["ask_user"],
//!   "agent": { "command": "claude", "args": ["-p"] }
//! }
//! ```

use crate::error::{LoopError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (relative to the project) holding all controller files.
pub const RALPH_DIR: &str = ".ralph";

/// What the driver does with a loop that entered `Stuck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StuckPolicy {
    /// Keep dispatching turns; the status only flags degraded confidence.
    #[default]
    Continue,
    /// Refuse new turns until the user resumes the loop.
    Pause,
}

impl std::fmt::Display for StuckPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StuckPolicy::Continue => write!(f, "continue"),
            StuckPolicy::Pause => write!(f, "pause"),
        }
    }
}

impl std::str::FromStr for StuckPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(StuckPolicy::Continue),
            "pause" => Ok(StuckPolicy::Pause),
            other => Err(format!(
                "Invalid stuck policy '{}'. Valid options: continue, pause",
                other
            )),
        }
    }
}

/// External agent command used by `ralph-loop run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCommandConfig {
    /// Executable name or path
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Arguments passed before the prompt is written to stdin
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Per-turn timeout in seconds (0 = no timeout)
    #[serde(default = "default_agent_timeout", rename = "timeoutSecs")]
    pub timeout_secs: u64,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["-p".to_string(), "--dangerously-skip-permissions".to_string()]
}

fn default_agent_timeout() -> u64 {
    3600
}

impl Default for AgentCommandConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            timeout_secs: default_agent_timeout(),
        }
    }
}

impl AgentCommandConfig {
    /// Turn timeout, or `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Controller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Consecutive no-progress iterations before a loop counts as stuck.
    #[serde(default = "default_struggle_threshold", rename = "struggleThreshold")]
    pub struggle_threshold: u32,

    /// Seconds without turn activity before the watchdog flags the loop.
    /// Zero disables the watchdog.
    #[serde(
        default = "default_inactivity_timeout",
        rename = "inactivityTimeoutSecs"
    )]
    pub inactivity_timeout_secs: u64,

    #[serde(default, rename = "stuckPolicy")]
    pub stuck_policy: StuckPolicy,

    /// Tools that block on the user; they suspend inactivity tracking.
    #[serde(default = "default_waiting_tools", rename = "waitingTools")]
    pub waiting_tools: Vec<String>,

    /// Number of iteration records kept in each loop's history.
    #[serde(default = "default_history_limit", rename = "historyLimit")]
    pub history_limit: usize,

    /// Directory with `build.md`, `plan.md`, `checkpoint.md`, `rotation.md`
    /// overrides. Relative paths resolve against the project directory.
    #[serde(default, rename = "templatesDir")]
    pub templates_dir: Option<PathBuf>,

    #[serde(default)]
    pub agent: AgentCommandConfig,
}

fn default_struggle_threshold() -> u32 {
    3
}

fn default_inactivity_timeout() -> u64 {
    600
}

fn default_waiting_tools() -> Vec<String> {
    vec!["ask_user".to_string(), "AskUserQuestion".to_string()]
}

fn default_history_limit() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            struggle_threshold: default_struggle_threshold(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            stuck_policy: StuckPolicy::default(),
            waiting_tools: default_waiting_tools(),
            history_limit: default_history_limit(),
            templates_dir: None,
            agent: AgentCommandConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a project directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed,
    /// or fails validation.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::settings_path(project_dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| LoopError::config_with_path(e.to_string(), path.clone()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(RALPH_DIR).join("settings.json")
    }

    /// Get the directory holding loop state records
    pub fn loops_dir(project_dir: &Path) -> PathBuf {
        project_dir.join(RALPH_DIR).join("loops")
    }

    /// Get the directory holding archived loop records
    pub fn archive_dir(project_dir: &Path) -> PathBuf {
        Self::loops_dir(project_dir).join("archive")
    }

    /// Resolve the template override directory, if configured.
    #[must_use]
    pub fn resolved_templates_dir(&self, project_dir: &Path) -> Option<PathBuf> {
        self.templates_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                project_dir.join(dir)
            }
        })
    }

    /// Inactivity timeout, or `None` when the watchdog is disabled.
    #[must_use]
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.inactivity_timeout_secs > 0).then(|| Duration::from_secs(self.inactivity_timeout_secs))
    }

    /// Whether a tool call means the agent is waiting on the user.
    #[must_use]
    pub fn is_waiting_tool(&self, tool: &str) -> bool {
        self.waiting_tools.iter().any(|t| t == tool)
    }

    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.struggle_threshold == 0 {
            return Err(LoopError::InvalidConfig {
                field: "struggleThreshold".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.history_limit == 0 {
            return Err(LoopError::InvalidConfig {
                field: "historyLimit".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.agent.command.trim().is_empty() {
            return Err(LoopError::InvalidConfig {
                field: "agent.command".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.waiting_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(LoopError::InvalidConfig {
                field: "waitingTools".into(),
                reason: "tool names must not be empty".into(),
            });
        }
        Ok(())
    }
}
