//! Run command - Provision, verify and tear down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use probe_azure::{ArmClient, ResourceApi};
use probe_core::{Probe, ProbeConfig, ProbeResult, ProcessEnv, RunContext, RunReport};
use probe_iac::{IacError, OutputKey, ProvisioningTool, TerraformRunner};
use probe_runner::{CliRunner, CliRunnerOptions};

use super::RunsFailed;

/// Container runtime selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeArg {
    Docker,
    Podman,
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory containing the infrastructure definition
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Configuration file (defaults to infraprobe.yaml in --dir)
    #[arg(short, long, env = "INFRAPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Concurrent runs, each against a private copy of --dir
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=16))]
    pub parallel: u16,

    /// Log the terraform commands without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print run reports as JSON
    #[arg(long)]
    pub json: bool,

    /// Terraform binary on the host
    #[arg(long, env = "INFRAPROBE_TERRAFORM")]
    pub terraform: Option<String>,

    /// Run terraform inside this container image
    #[arg(long, env = "INFRAPROBE_TERRAFORM_IMAGE")]
    pub image: Option<String>,

    /// Container image tag
    #[arg(long, requires = "image")]
    pub tag: Option<String>,

    /// Container runtime (auto-detected if not set)
    #[arg(long, value_enum, requires = "image")]
    pub runtime: Option<RuntimeArg>,

    /// Stream terraform output while it runs
    #[arg(long)]
    pub stream: bool,

    /// Overall deadline per run in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Destroy attempts before giving up
    #[arg(long)]
    pub destroy_attempts: Option<u32>,

    /// Read attempts per verification check
    #[arg(long)]
    pub verify_attempts: Option<u32>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the file configuration.
    fn apply_overrides(&self, mut config: ProbeConfig) -> ProbeResult<ProbeConfig> {
        if let Some(binary) = &self.terraform {
            config.terraform.binary = binary.clone();
        }
        if let Some(image) = &self.image {
            config.terraform.image = Some(image.clone());
        }
        if let Some(tag) = &self.tag {
            config.terraform.tag = tag.clone();
        }
        if self.stream {
            config.terraform.stream_logs = true;
        }
        if let Some(timeout) = self.timeout {
            config.timeouts.run = timeout;
        }
        if let Some(attempts) = self.destroy_attempts {
            config.teardown.max_attempts = attempts;
        }
        if let Some(attempts) = self.verify_attempts {
            config.verification.max_attempts = attempts;
        }
        config.validate()?;
        Ok(config)
    }

    fn runner_options(&self) -> CliRunnerOptions {
        let mut options = CliRunnerOptions::new();
        if self.dry_run {
            options = options.dry_run();
        }
        match self.runtime {
            Some(RuntimeArg::Docker) => options.prefer_docker(),
            Some(RuntimeArg::Podman) => options.prefer_podman(),
            None => options,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn terraform(config: &ProbeConfig, options: CliRunnerOptions) -> TerraformRunner {
    let runner = CliRunner::new(options);
    let tf = TerraformRunner::new(Arc::new(runner))
        .with_binary(&config.terraform.binary)
        .with_timeouts(config.timeouts.terraform())
        .with_streaming(config.terraform.stream_logs);

    match &config.terraform.image {
        Some(image) => tf.with_image(image, &config.terraform.tag),
        None => tf,
    }
}

fn arm_client(ctx: &RunContext) -> ProbeResult<Arc<dyn ResourceApi>> {
    Ok(Arc::new(ArmClient::new(
        ctx.cloud,
        ctx.credentials.service_principal(),
    )))
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let dir = absolute(&args.dir)?;
    let config = ProbeConfig::load_or_default(args.config.as_deref(), &dir)
        .context("failed to load configuration")?;
    let config = args.apply_overrides(config)?;
    let tf = Arc::new(terraform(&config, args.runner_options()));

    if args.dry_run {
        return dry_run(config, tf, &dir).await;
    }

    if !tf.is_available().await? {
        return Err(IacError::TerraformNotAvailable(config.terraform.binary.clone()).into());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, tearing down before exit");
            interrupt.cancel();
        }
    });

    let probe = Probe::new(config, tf);
    let isolate = args.parallel > 1;
    info!("Starting {} run(s) against {}", args.parallel, dir.display());

    let results = join_all(
        (0..args.parallel).map(|_| run_one(&probe, &dir, isolate, cancel.clone())),
    )
    .await;

    let mut reports = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    if let Some(err) = first_error {
        return Err(err).context("run could not start");
    }

    let failed: Vec<_> = reports.iter().filter(|r| !r.passed()).collect();
    match failed.first() {
        None => Ok(()),
        Some(first) => Err(RunsFailed {
            kind: first
                .failure_kind()
                .unwrap_or(probe_core::FailureKind::TeardownFailure),
            failed: failed.len(),
            total: reports.len(),
        }
        .into()),
    }
}

async fn run_one(
    probe: &Probe,
    dir: &Path,
    isolate: bool,
    cancel: CancellationToken,
) -> ProbeResult<RunReport> {
    if isolate {
        probe.execute_isolated(&ProcessEnv, dir, arm_client, cancel).await
    } else {
        probe.execute(&ProcessEnv, dir, arm_client, cancel).await
    }
}

/// Resolve everything and log the terraform commands a run would execute.
async fn dry_run(config: ProbeConfig, tf: Arc<TerraformRunner>, dir: &Path) -> Result<()> {
    let probe = Probe::new(config, tf.clone());
    let ctx = probe.prepare(&ProcessEnv, dir)?;
    let vars = ctx.input_variables();

    tf.apply(dir, &vars).await?;
    for key in OutputKey::ALL {
        tf.output(dir, key.as_str()).await?;
    }
    tf.destroy(dir, &vars).await?;

    println!("🧪 Dry run {} in {}", ctx.run_id, dir.display());
    println!("   Cloud: {}", ctx.cloud);
    println!("   Variables: {:?}", vars);
    println!("   Nothing was provisioned");
    Ok(())
}

fn print_report(report: &RunReport) {
    let verdict = if report.passed() { "✅ PASSED" } else { "❌ FAILED" };
    println!(
        "{} run {} ({:.1}s)",
        verdict,
        report.run_id,
        report.duration_ms() as f64 / 1000.0
    );

    if let Some(verification) = &report.verification {
        for check in &verification.checks {
            if check.passed {
                println!("   ✅ {}", check.check);
            } else if let Some(error) = &check.error {
                println!(
                    "   ❌ {}: {} (after {} attempt(s))",
                    check.check, error, check.attempts
                );
            } else {
                println!(
                    "   ❌ {}: expected {:?}, observed {:?} (after {} attempt(s))",
                    check.check, check.expected, check.observed, check.attempts
                );
            }
        }
    }

    if let Some(failure) = &report.failure {
        println!("   Failure ({:?}): {}", failure.kind, failure.message);
    }

    let teardown = &report.teardown;
    if teardown.succeeded {
        println!("   🧹 Teardown: ok after {} attempt(s)", teardown.attempts);
    } else {
        println!(
            "   ⚠️  Teardown FAILED after {} attempt(s): {}",
            teardown.attempts,
            teardown.error.as_deref().unwrap_or("unknown error")
        );
        println!("      Resources tagged with run id {} may still exist", report.run_id);
        if let Some(state_dir) = &teardown.state_dir {
            println!(
                "      Terraform state kept in {}; run `terraform destroy` there to clean up",
                state_dir.display()
            );
        }
    }
}
