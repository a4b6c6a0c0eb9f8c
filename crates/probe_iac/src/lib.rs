//! # probe_iac
//!
//! Provisioning-tool integration for infraprobe.
//!
//! This crate drives Terraform through apply, output and destroy, and turns
//! its raw outputs into canonical values that can be compared against live
//! cloud state.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use probe_iac::{InputVariables, OutputKey, ProvisioningTool, TerraformRunner};
//! use probe_runner::{CliRunner, CliRunnerOptions};
//!
//! # async fn run() -> probe_iac::IacResult<()> {
//! let tf = TerraformRunner::new(Arc::new(CliRunner::new(CliRunnerOptions::default())));
//! let vars = InputVariables::new().set("postfix", "ab12cd34");
//!
//! tf.apply(Path::new("./infra"), &vars).await?;
//! let account = tf.output(Path::new("./infra"), OutputKey::StorageAccountName.as_str()).await?;
//! let account = probe_iac::normalize(&account)?;
//! tf.destroy(Path::new("./infra"), &vars).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod normalize;
pub mod outputs;
pub mod provisioning;
pub mod terraform;

pub use error::{IacError, IacResult};
pub use normalize::normalize;
pub use outputs::{DeclaredOutputs, NormalizedOutputs, OutputKey};
pub use provisioning::{InputVariables, ProvisioningTool};
pub use terraform::{TerraformResult, TerraformRunner, TerraformTimeouts};
