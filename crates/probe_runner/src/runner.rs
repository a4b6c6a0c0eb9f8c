//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerResult;

/// Result of a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code from the process (-1 when terminated by a signal)
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_error_line(&self) -> &str {
        fn last(s: &str) -> Option<&str> {
            s.lines().filter(|l| !l.trim().is_empty()).last()
        }
        last(&self.stderr)
            .or_else(|| last(&self.stdout))
            .unwrap_or("no output")
    }
}

/// Executes commands on the host or inside a container.
///
/// Dropping the future returned by [`CommandRunner::run`] must stop the
/// underlying process; [`CommandRunner::settle`] waits until such stops finish.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Check if a program can be executed.
    async fn is_available(&self, program: &str) -> RunnerResult<bool>;

    /// Run a command to completion, capturing its output.
    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig) -> RunnerResult<ExecutionResult>;

    /// Wait for processes abandoned by dropped runs to exit.
    async fn settle(&self) {}
}
