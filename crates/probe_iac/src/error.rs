//! Error types for IaC module.

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Terraform not available: {0}")]
    TerraformNotAvailable(String),

    #[error("Terraform init failed: {0}")]
    InitFailed(String),

    #[error("Terraform apply failed: {0}")]
    ApplyFailed(String),

    #[error("Terraform destroy failed: {0}")]
    DestroyFailed(String),

    #[error("Terraform output '{key}' failed: {message}")]
    OutputFailed { key: String, message: String },

    #[error("Output '{key}' is empty")]
    EmptyOutput { key: String },

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Runner error: {0}")]
    Runner(#[from] probe_runner::RunnerError),
}
