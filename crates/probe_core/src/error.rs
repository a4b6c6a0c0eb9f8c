//! Error types for the core module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use probe_iac::IacError;
use probe_runner::RunnerError;

/// Result type alias for core operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can end or fail a run.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Entropy source exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Verification mismatch in {} check(s): {}", .failed.len(), .failed.join(", "))]
    VerificationMismatch { failed: Vec<String> },

    #[error("Teardown failed after {attempts} attempt(s): {message}")]
    TeardownFailure { attempts: u32, message: String },

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid lifecycle transition: cannot {action} while {state}")]
    InvalidState { state: String, action: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<IacError> for ProbeError {
    fn from(err: IacError) -> Self {
        match err {
            IacError::MalformedOutput(_) | IacError::EmptyOutput { .. } => {
                ProbeError::MalformedOutput(err.to_string())
            }
            IacError::Runner(RunnerError::Timeout(seconds)) => ProbeError::Timeout {
                stage: "terraform".to_string(),
                seconds,
            },
            other => ProbeError::ProvisioningFailure(other.to_string()),
        }
    }
}

/// Coarse failure category, stable for reports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingConfiguration,
    ResourceExhausted,
    ProvisioningFailure,
    MalformedOutput,
    VerificationMismatch,
    TeardownFailure,
    Timeout,
    Cancelled,
    Internal,
}

impl ProbeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::MissingConfiguration(_) | ProbeError::Config(_) => {
                FailureKind::MissingConfiguration
            }
            ProbeError::ResourceExhausted(_) => FailureKind::ResourceExhausted,
            ProbeError::ProvisioningFailure(_) => FailureKind::ProvisioningFailure,
            ProbeError::MalformedOutput(_) => FailureKind::MalformedOutput,
            ProbeError::VerificationMismatch { .. } => FailureKind::VerificationMismatch,
            ProbeError::TeardownFailure { .. } => FailureKind::TeardownFailure,
            ProbeError::Timeout { .. } => FailureKind::Timeout,
            ProbeError::Cancelled(_) => FailureKind::Cancelled,
            ProbeError::InvalidState { .. } | ProbeError::Io(_) | ProbeError::Yaml(_) => {
                FailureKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iac_errors_map_to_taxonomy() {
        let malformed: ProbeError = IacError::MalformedOutput("bad".to_string()).into();
        assert_eq!(malformed.kind(), FailureKind::MalformedOutput);

        let empty: ProbeError = IacError::EmptyOutput { key: "storage_account_name".to_string() }.into();
        assert_eq!(empty.kind(), FailureKind::MalformedOutput);

        let apply: ProbeError = IacError::ApplyFailed("boom".to_string()).into();
        assert_eq!(apply.kind(), FailureKind::ProvisioningFailure);
        assert!(apply.to_string().contains("boom"));

        let timeout: ProbeError = IacError::Runner(RunnerError::Timeout(1800)).into();
        assert_eq!(timeout.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_mismatch_message_lists_checks() {
        let err = ProbeError::VerificationMismatch {
            failed: vec!["account_kind_matches".to_string(), "sku_tier_matches".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Verification mismatch in 2 check(s): account_kind_matches, sku_tier_matches"
        );
    }
}
