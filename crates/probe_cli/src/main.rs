//! infraprobe CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or missing configuration
//! - 3: Verification failure
//! - 5: Provisioning failure
//! - 6: Teardown failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, RunsFailed};
use probe_core::{FailureKind, ProbeError};
use probe_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VERIFICATION_FAILURE: u8 = 3;
    pub const PROVISIONING_FAILURE: u8 = 5;
    pub const TEARDOWN_FAILURE: u8 = 6;
}

const DEFAULT_FILTER: &str = "warn,infraprobe=info,probe_core=info,probe_iac=info";
const VERBOSE_FILTER: &str =
    "info,infraprobe=debug,probe_core=debug,probe_iac=debug,probe_runner=debug,probe_azure=debug";

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        VERBOSE_FILTER
    } else if cli.quiet {
        "error"
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so --json output on stdout stays parseable.
    let json = cli
        .log_json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text = (!cli.log_json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let log_result = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::CheckEnv(args) => commands::check_env::execute(args).await,
        Commands::Normalize(args) => commands::normalize::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn exit_code_for(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::MissingConfiguration => ExitCodes::INVALID_ARGS,
        FailureKind::VerificationMismatch => ExitCodes::VERIFICATION_FAILURE,
        FailureKind::ProvisioningFailure | FailureKind::MalformedOutput => {
            ExitCodes::PROVISIONING_FAILURE
        }
        FailureKind::TeardownFailure => ExitCodes::TEARDOWN_FAILURE,
        FailureKind::ResourceExhausted
        | FailureKind::Timeout
        | FailureKind::Cancelled
        | FailureKind::Internal => ExitCodes::GENERAL_ERROR,
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(failed) = e.downcast_ref::<RunsFailed>() {
        return exit_code_for(failed.kind);
    }
    if let Some(err) = e.downcast_ref::<ProbeError>() {
        return exit_code_for(err.kind());
    }
    if e.downcast_ref::<IacError>().is_some() {
        return ExitCodes::PROVISIONING_FAILURE;
    }
    ExitCodes::GENERAL_ERROR
}
