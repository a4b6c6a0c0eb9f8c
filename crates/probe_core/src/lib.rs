//! # probe_core
//!
//! Provision-verify-teardown lifecycle for infrastructure definitions.
//!
//! A run provisions a storage definition under a fresh run id, reads its
//! declared outputs, checks them against live cloud state and destroys
//! everything again, whatever happened in between.
//!
//! # Architecture
//!
//! - **Naming**: collision-resistant run ids from the OS CSPRNG
//! - **Credentials**: the only place environment variables are read
//! - **Lifecycle**: the state machine and its teardown guarantee
//! - **Verifier**: concurrent live-state checks with bounded retries
//! - **Probe**: wires configuration, credentials and the controller together
//! - **Workspace**: private copies of a definition for concurrent runs
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use probe_core::{Probe, ProbeConfig, ProcessEnv};
//! use probe_azure::ArmClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let probe = Probe::new(ProbeConfig::default(), Arc::new(terraform));
//! let report = probe
//!     .execute(&ProcessEnv, "./infra".as_ref(), |ctx| {
//!         Ok(Arc::new(ArmClient::new(ctx.cloud, ctx.credentials.service_principal())))
//!     }, CancellationToken::new())
//!     .await?;
//! assert!(report.passed());
//! ```

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod probe;
pub mod report;
pub mod retry;
pub mod verifier;
pub mod workspace;

// Re-export main types for convenience
pub use config::{ProbeConfig, StageTimeouts, TerraformSettings, CONFIG_FILE_NAME};
pub use context::RunContext;
pub use credentials::{
    CredentialResolver, Credentials, EnvSource, ProcessEnv, VariableNames, CLOUD_ENVIRONMENT_VAR,
};
pub use error::{FailureKind, ProbeError, ProbeResult};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use naming::{RunId, DEFAULT_RUN_ID_LENGTH};
pub use probe::Probe;
pub use report::{RunFailure, RunReport, TeardownOutcome};
pub use retry::{retry_with_backoff, RetryConfig};
pub use verifier::{CheckName, CheckOutcome, VerificationResult, Verifier};
pub use workspace::RunWorkspace;
