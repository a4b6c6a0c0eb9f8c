//! # probe_runner
//!
//! Process execution wrapper for infraprobe.
//!
//! Provisioning tools are driven through the [`CommandRunner`] trait, either
//! as host processes or inside Docker/Podman containers.
//!
//! # Features
//!
//! - **Host or container**: the same [`CommandSpec`] runs locally or wrapped in `docker run`
//! - **Runtime Detection**: Auto-detect Docker vs Podman
//! - **Timeouts and cancellation**: child processes are interrupted, then killed after a grace period
//! - **Dry-Run Mode**: Log commands without execution
//! - **Secret masking**: secret environment values never reach the logs
//! - **Mock Runner**: Scripted responses for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use probe_runner::{CliRunner, CliRunnerOptions, CommandRunner, CommandSpec, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliRunner::new(CliRunnerOptions::default());
//!
//!     let spec = CommandSpec::new("terraform")
//!         .args(["init", "-input=false"])
//!         .workdir("./infra");
//!
//!     let result = runner.run(&spec, &RunConfig::default()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod mock;
pub mod runner;

pub use cli::{CliRunner, CliRunnerOptions, ContainerRuntime, LogStream, DEFAULT_STOP_GRACE};
pub use config::{CommandSpec, ContainerConfig, MountConfig, RunConfig, MASK};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandRunner, ExecutionResult};
