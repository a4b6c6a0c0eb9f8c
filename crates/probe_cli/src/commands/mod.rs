//! CLI command definitions.

use clap::{Parser, Subcommand};
use thiserror::Error;

use probe_core::FailureKind;

pub mod check_env;
pub mod normalize;
pub mod run;

/// infraprobe - provision, verify and tear down infrastructure definitions
#[derive(Parser)]
#[command(name = "infraprobe")]
#[command(version, about = "infraprobe - provision, verify and tear down infrastructure definitions")]
#[command(long_about = r#"
infraprobe applies a Terraform storage definition under a fresh run id, checks
the live Azure resources against the declared outputs, and always destroys
what it created.

COMMANDS:
  run        → Full provision-verify-teardown lifecycle
  check-env  → Check that the credential variables are set
  normalize  → Print the canonical form of a raw output value

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or missing configuration
  3 - Verification failure
  5 - Provisioning failure
  6 - Teardown failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "INFRAPROBE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision, verify and tear down
    Run(run::RunArgs),

    /// Check credential variables without provisioning anything
    #[command(name = "check-env")]
    CheckEnv(check_env::CheckEnvArgs),

    /// Normalize a raw provisioning-tool output value
    Normalize(normalize::NormalizeArgs),
}

/// One or more runs completed without passing.
#[derive(Debug, Error)]
#[error("{failed} of {total} run(s) failed ({kind:?})")]
pub struct RunsFailed {
    /// Failure kind of the first failing run
    pub kind: FailureKind,
    pub failed: usize,
    pub total: usize,
}
