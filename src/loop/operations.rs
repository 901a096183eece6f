//! Real agent runtime backed by a command-line agent.
//!
//! Spawns the configured command (the `claude` CLI by default) once per
//! turn, writes the prompt to its stdin and captures stdout as the turn's
//! output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::config::AgentCommandConfig;
use crate::error::LoopError;
use crate::testing::AgentRuntime;

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Agent runtime that runs an external command per turn.
#[derive(Debug, Clone)]
pub struct CliAgentRuntime {
    project_dir: PathBuf,
    command: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CliAgentRuntime {
    /// Create a runtime for the given directory and agent settings.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>, config: &AgentCommandConfig) -> Self {
        Self {
            project_dir: project_dir.into(),
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check that the agent command can be found on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Agent` if the command is not installed.
    pub fn ensure_available(&self) -> crate::error::Result<PathBuf> {
        which::which(&self.command).map_err(|e| {
            LoopError::agent(format!(
                "The '{}' command is not installed or not in PATH: {}",
                self.command, e
            ))
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl AgentRuntime for CliAgentRuntime {
    async fn run_turn(&self, prompt: &str) -> Result<String> {
        debug!(
            "Running {} {:?} ({} chars prompt)",
            self.command,
            self.args,
            prompt.len()
        );

        let mut child = AsyncCommand::new(&self.command)
            .args(&self.args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn agent command '{}'", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to agent stdin")?;
            stdin.flush().await?;
            drop(stdin);
        }

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => bail!("Agent turn timed out after {}s", limit.as_secs()),
            },
            None => child.wait_with_output().await,
        }
        .context("Failed to read agent output")?;

        if !output.status.success() {
            bail!(
                "Agent exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr_tail(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runtime(command: &str, args: &[&str], timeout_secs: u64) -> (CliAgentRuntime, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = AgentCommandConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs,
        };
        (CliAgentRuntime::new(temp.path(), &config), temp)
    }

    #[test]
    fn test_construction_from_config() {
        let (rt, temp) = runtime("claude", &["-p"], 60);
        assert_eq!(rt.command(), "claude");
        assert_eq!(rt.project_dir, temp.path());
        assert_eq!(rt.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_missing_command_is_agent_error() {
        let (rt, _temp) = runtime("definitely-not-an-agent-binary-xyz", &[], 0);
        assert!(matches!(
            rt.ensure_available(),
            Err(LoopError::Agent { .. })
        ));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prompt_goes_to_stdin() {
        let (rt, _temp) = runtime("cat", &[], 10);
        let output = rt.run_turn("hello agent").await.unwrap();
        assert_eq!(output, "hello agent");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let (rt, _temp) = runtime("sh", &["-c", "cat >/dev/null; echo oops >&2; exit 3"], 10);
        let err = rt.run_turn("x").await.unwrap_err().to_string();
        assert!(err.contains("code 3"));
        assert!(err.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_failure() {
        let (rt, _temp) = runtime("sh", &["-c", "cat >/dev/null; sleep 5"], 1);
        let err = rt.run_turn("x").await.unwrap_err().to_string();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (rt, _temp) = runtime("definitely-not-an-agent-binary-xyz", &[], 0);
        assert!(rt.run_turn("x").await.is_err());
    }
}
