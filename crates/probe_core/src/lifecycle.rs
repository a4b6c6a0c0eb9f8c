//! Provision-verify-teardown lifecycle.
//!
//! [`LifecycleController`] drives one run through
//! `Idle → Applying → Applied → Verifying → TornDown`. Any failure jumps
//! straight to teardown. [`LifecycleController::run`] supervises the whole
//! pipeline and destroys the resources exactly once on every exit path,
//! including cancellation and the run deadline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use probe_iac::{DeclaredOutputs, IacError, NormalizedOutputs, OutputKey, ProvisioningTool};

use crate::context::RunContext;
use crate::error::{ProbeError, ProbeResult};
use crate::report::{RunFailure, RunReport, TeardownOutcome};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::verifier::{VerificationResult, Verifier};

/// Lifecycle states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Applying,
    Applied,
    Verifying,
    TornDown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Applying => "applying",
            LifecycleState::Applied => "applied",
            LifecycleState::Verifying => "verifying",
            LifecycleState::TornDown => "torn_down",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::TornDown)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attach the stage name to a tool error.
fn stage_error(stage: &str, err: IacError) -> ProbeError {
    match ProbeError::from(err) {
        ProbeError::Timeout { seconds, .. } => ProbeError::Timeout {
            stage: stage.to_string(),
            seconds,
        },
        other => other,
    }
}

/// Drives a single run. Not reusable: create one per run.
pub struct LifecycleController {
    tool: Arc<dyn ProvisioningTool>,
    verifier: Verifier,
    teardown_retry: RetryConfig,
    run_deadline: Option<Duration>,
    state: LifecycleState,
    outputs: Option<NormalizedOutputs>,
    verification: Option<VerificationResult>,
    teardown: Option<TeardownOutcome>,
}

impl LifecycleController {
    pub fn new(tool: Arc<dyn ProvisioningTool>, verifier: Verifier) -> Self {
        Self {
            tool,
            verifier,
            teardown_retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            run_deadline: None,
            state: LifecycleState::Idle,
            outputs: None,
            verification: None,
            teardown: None,
        }
    }

    /// Destroy attempt policy.
    pub fn with_teardown_retry(mut self, retry: RetryConfig) -> Self {
        self.teardown_retry = retry;
        self
    }

    /// Deadline for apply, collection and verification together.
    pub fn with_run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn outputs(&self) -> Option<&NormalizedOutputs> {
        self.outputs.as_ref()
    }

    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    pub fn teardown_outcome(&self) -> Option<&TeardownOutcome> {
        self.teardown.as_ref()
    }

    fn transition(&mut self, to: LifecycleState) {
        info!(from = %self.state, to = %to, "Lifecycle transition");
        self.state = to;
    }

    fn invalid(&self, action: &str) -> ProbeError {
        ProbeError::InvalidState {
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    /// Create the resources. Allowed once, from `Idle`.
    pub async fn apply(&mut self, ctx: &RunContext) -> ProbeResult<()> {
        if self.state != LifecycleState::Idle {
            return Err(self.invalid("apply"));
        }
        self.transition(LifecycleState::Applying);

        let vars = ctx.input_variables();
        debug!(run_id = %ctx.run_id, vars = ?vars, "Applying");
        self.tool
            .apply(ctx.working_directory(), &vars)
            .await
            .map_err(|e| stage_error("apply", e))?;

        self.transition(LifecycleState::Applied);
        Ok(())
    }

    /// Read all declared outputs. Any missing key fails the whole set.
    pub async fn collect_outputs(&mut self, ctx: &RunContext) -> ProbeResult<DeclaredOutputs> {
        if self.state != LifecycleState::Applied {
            return Err(self.invalid("collect outputs"));
        }

        let mut declared = DeclaredOutputs::new();
        for key in OutputKey::ALL {
            let raw = self
                .tool
                .output(ctx.working_directory(), key.as_str())
                .await
                .map_err(|e| stage_error("output", e))?;
            debug!(run_id = %ctx.run_id, key = %key, "Collected output");
            declared.insert(key, raw);
        }
        Ok(declared)
    }

    /// Check live state against `outputs`.
    pub async fn verify(
        &mut self,
        ctx: &RunContext,
        outputs: &NormalizedOutputs,
    ) -> ProbeResult<VerificationResult> {
        if self.state != LifecycleState::Applied {
            return Err(self.invalid("verify"));
        }
        self.transition(LifecycleState::Verifying);

        let result = self.verifier.verify(ctx.subscription_id(), outputs).await;
        self.verification = Some(result.clone());
        Ok(result)
    }

    /// Destroy everything the run created. Runs at most once; destroy is
    /// retried up to the configured attempt cap.
    pub async fn teardown(&mut self, ctx: &RunContext) -> ProbeResult<()> {
        if self.teardown.is_some() || self.state.is_terminal() {
            return Err(self.invalid("tear down"));
        }
        info!(run_id = %ctx.run_id, state = %self.state, "Tearing down");

        // An interrupted apply must finish writing state before destroy reads it.
        self.tool.settle().await;

        let vars = ctx.input_variables();
        let tool: &dyn ProvisioningTool = self.tool.as_ref();
        let dir = ctx.working_directory();
        let vars = &vars;
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result = retry_with_backoff(&self.teardown_retry, "destroy", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            tool.destroy(dir, vars)
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        let outcome = TeardownOutcome {
            attempts,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            state_dir: result
                .is_err()
                .then(|| ctx.working_directory().to_path_buf()),
        };
        self.teardown = Some(outcome);
        self.transition(LifecycleState::TornDown);

        match result {
            Ok(()) => {
                info!(run_id = %ctx.run_id, attempts, "Teardown complete");
                Ok(())
            }
            Err(e) => {
                error!(
                    run_id = %ctx.run_id,
                    attempts,
                    error = %e,
                    "Teardown failed; resources may still exist"
                );
                Err(ProbeError::TeardownFailure {
                    attempts,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn pipeline(&mut self, ctx: &RunContext) -> ProbeResult<()> {
        self.apply(ctx).await?;

        let declared = self.collect_outputs(ctx).await?;
        let outputs = declared.normalize()?;
        self.outputs = Some(outputs.clone());

        let result = self.verify(ctx, &outputs).await?;
        if !result.passed() {
            return Err(ProbeError::VerificationMismatch {
                failed: result.failed_names(),
            });
        }
        Ok(())
    }

    /// Run the full lifecycle and always tear down afterwards.
    ///
    /// `cancel` and the run deadline interrupt apply, collection and
    /// verification; an interrupted provisioning process is killed. Teardown
    /// itself is never interrupted.
    pub async fn run(mut self, ctx: &RunContext, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        info!(
            run_id = %ctx.run_id,
            dir = %ctx.working_directory().display(),
            "Starting run"
        );

        let deadline = self.run_deadline;
        let outcome = {
            let pipeline = self.pipeline(ctx);
            tokio::pin!(pipeline);

            let expired = async {
                match deadline {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                result = &mut pipeline => result,
                _ = cancel.cancelled() => Err(ProbeError::Cancelled(
                    "cancellation requested".to_string(),
                )),
                _ = expired => Err(ProbeError::Timeout {
                    stage: "run".to_string(),
                    seconds: deadline.map(|d| d.as_secs()).unwrap_or_default(),
                }),
            }
        };

        let primary = outcome.err();
        if let Some(err) = &primary {
            match err {
                ProbeError::VerificationMismatch { .. } => {
                    warn!(run_id = %ctx.run_id, error = %err, "Run failed")
                }
                _ => error!(run_id = %ctx.run_id, error = %err, "Run failed"),
            }
        }

        let teardown_error = self.teardown(ctx).await.err();
        let failure = primary
            .as_ref()
            .or(teardown_error.as_ref())
            .map(RunFailure::from);

        let report = RunReport {
            run_id: ctx.run_id.clone(),
            state: self.state,
            outputs: self.outputs.take(),
            verification: self.verification.take(),
            failure,
            teardown: self.teardown.take().unwrap_or_default(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            run_id = %report.run_id,
            passed = report.passed(),
            duration_ms = report.duration_ms(),
            "Run finished"
        );
        report
    }
}
