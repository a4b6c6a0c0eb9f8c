//! Run reports.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use probe_iac::NormalizedOutputs;

use crate::error::{FailureKind, ProbeError};
use crate::lifecycle::LifecycleState;
use crate::naming::RunId;
use crate::verifier::VerificationResult;

/// Why a run did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProbeError> for RunFailure {
    fn from(err: &ProbeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What happened during teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownOutcome {
    /// Destroy attempts made
    pub attempts: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Directory holding the state needed to destroy what is left, set when
    /// teardown failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

/// Complete record of one provision-verify-teardown run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<NormalizedOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    /// The first failure of the run. A teardown failure only appears here
    /// when nothing failed before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub teardown: TeardownOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Apply, collection and every check succeeded, and teardown completed.
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.teardown.succeeded
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Teardown failed, whatever else happened.
    pub fn leaked_resources(&self) -> bool {
        !self.teardown.succeeded
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
