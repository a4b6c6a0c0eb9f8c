//! Mock command runner for testing.
//!
//! Provides a scriptable implementation of [`CommandRunner`] so provisioning
//! workflows can be exercised without real binaries or containers.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    /// Make the mock actually sleep for this long before answering.
    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Mock command runner.
///
/// Responses are scripted per sub-command (the first argument). Each
/// sub-command has a queue; the last queued response repeats once the queue
/// drains. Unscripted sub-commands succeed with empty output.
#[derive(Clone, Default)]
pub struct MockRunner {
    /// Scripted responses keyed by sub-command.
    responses: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Programs reported as unavailable.
    unavailable: Arc<RwLock<Vec<String>>>,
    /// Simulated failure to return (as a string message for ExecutionFailed).
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the given sub-command.
    pub fn respond(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.responses
            .write()
            .entry(subcommand.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Queue a response for `output <key>` invocations.
    pub fn respond_output(self, key: &str, response: MockResponse) -> Self {
        self.respond(format!("output:{}", key), response)
    }

    /// Report a program as not installed.
    pub fn set_unavailable(self, program: impl Into<String>) -> Self {
        self.unavailable.write().push(program.into());
        self
    }

    /// Fail every call with a runner error.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Get calls for a specific sub-command.
    pub fn calls_for(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Number of calls for a specific sub-command.
    pub fn count_for(&self, subcommand: &str) -> usize {
        self.calls_for(subcommand).len()
    }

    fn response_key(spec: &CommandSpec) -> String {
        match spec.subcommand() {
            Some("output") => {
                let key = spec
                    .args
                    .iter()
                    .skip(1)
                    .find(|a| !a.starts_with('-'))
                    .cloned()
                    .unwrap_or_default();
                format!("output:{}", key)
            }
            Some(sub) => sub.to_string(),
            None => String::new(),
        }
    }

    fn next_response(&self, key: &str) -> MockResponse {
        let mut responses = self.responses.write();
        match responses.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockResponse::success("")),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockResponse::success("")),
            None => MockResponse::success(""),
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        Ok(!self.unavailable.read().iter().any(|p| p == program))
    }

    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig) -> RunnerResult<ExecutionResult> {
        self.captured_calls.write().push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            env: spec.env.clone(),
            workdir: spec.workdir.clone(),
        });

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }

        let response = self.next_response(&Self::response_key(spec));

        if response.duration_ms > 0 {
            let limit_ms = run_config.timeout_seconds.saturating_mul(1000);
            if limit_ms > 0 && response.duration_ms > limit_ms {
                tokio::time::sleep(Duration::from_millis(limit_ms)).await;
                return Err(RunnerError::Timeout(run_config.timeout_seconds));
            }
            tokio::time::sleep(Duration::from_millis(response.duration_ms)).await;
        }

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_scripted_by_subcommand() {
        let runner = MockRunner::new()
            .respond("apply", MockResponse::failure(1, "quota exceeded"))
            .respond("destroy", MockResponse::success("Destroy complete!"));

        let apply = CommandSpec::new("terraform").arg("apply");
        let destroy = CommandSpec::new("terraform").arg("destroy");

        let r1 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r1.exit_code, 1);
        assert_eq!(r1.stderr, "quota exceeded");

        let r2 = runner.run(&destroy, &RunConfig::default()).await.unwrap();
        assert!(r2.success());
        assert_eq!(runner.count_for("apply"), 1);
        assert_eq!(runner.count_for("destroy"), 1);
    }

    #[tokio::test]
    async fn test_mock_runner_queue_then_repeat_last() {
        let runner = MockRunner::new()
            .respond("destroy", MockResponse::failure(1, "first"))
            .respond("destroy", MockResponse::success("second"));
        let spec = CommandSpec::new("terraform").arg("destroy");

        let r1 = runner.run(&spec, &RunConfig::default()).await.unwrap();
        let r2 = runner.run(&spec, &RunConfig::default()).await.unwrap();
        let r3 = runner.run(&spec, &RunConfig::default()).await.unwrap();

        assert_eq!(r1.stderr, "first");
        assert_eq!(r2.stdout, "second");
        assert_eq!(r3.stdout, "second");
    }

    #[tokio::test]
    async fn test_mock_runner_output_keys() {
        let runner = MockRunner::new()
            .respond_output("storage_account_name", MockResponse::success("\"sa1\"\n"));
        let spec = CommandSpec::new("terraform").args(["output", "-no-color", "-json", "storage_account_name"]);

        let result = runner.run(&spec, &RunConfig::default()).await.unwrap();
        assert_eq!(result.stdout, "\"sa1\"\n");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_env() {
        let runner = MockRunner::new();
        let spec = CommandSpec::new("terraform")
            .arg("apply")
            .workdir("/infra")
            .env("TF_VAR_postfix", "ab12cd34");

        runner.run(&spec, &RunConfig::default()).await.unwrap();

        let calls = runner.calls_for("apply");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].env.get("TF_VAR_postfix").map(String::as_str), Some("ab12cd34"));
        assert_eq!(calls[0].workdir, Some(PathBuf::from("/infra")));
    }

    #[tokio::test]
    async fn test_mock_runner_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("simulated error");
        let spec = CommandSpec::new("terraform").arg("init");

        let result = runner.run(&spec, &RunConfig::default()).await;
        assert!(result.is_err());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_runner_availability() {
        let runner = MockRunner::new().set_unavailable("terraform");
        assert!(!runner.is_available("terraform").await.unwrap());
        assert!(runner.is_available("docker").await.unwrap());
    }
}
