//! Check-env command - Report which credential variables are set.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use probe_core::{
    CredentialResolver, EnvSource, ProbeConfig, ProbeError, ProcessEnv, CLOUD_ENVIRONMENT_VAR,
};

#[derive(Args)]
pub struct CheckEnvArgs {
    /// Configuration file with custom variable names
    #[arg(short, long, env = "INFRAPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct VariableStatus {
    name: String,
    set: bool,
}

#[derive(Debug, Serialize)]
struct EnvReport {
    variables: Vec<VariableStatus>,
    cloud: Option<String>,
    cloud_error: Option<String>,
}

fn inspect(env: &dyn EnvSource, config: &ProbeConfig) -> EnvReport {
    let resolver = CredentialResolver::new(env, config.variables.clone());
    let missing = resolver.missing();

    let variables = config
        .variables
        .credential_vars()
        .iter()
        .map(|name| VariableStatus {
            name: name.to_string(),
            set: !missing.iter().any(|m| m == name),
        })
        .collect();

    let (cloud, cloud_error) = match resolver.cloud_environment() {
        Ok(cloud) => (Some(cloud.to_string()), None),
        Err(e) => (None, Some(e.to_string())),
    };

    EnvReport {
        variables,
        cloud,
        cloud_error,
    }
}

pub async fn execute(args: CheckEnvArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = ProbeConfig::load_or_default(args.config.as_deref(), &cwd)
        .context("failed to load configuration")?;

    let report = inspect(&ProcessEnv, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🔑 Credential variables:");
        for var in &report.variables {
            let mark = if var.set { "✅" } else { "❌" };
            println!("   {} {}", mark, var.name);
        }
        match (&report.cloud, &report.cloud_error) {
            (Some(cloud), _) => println!("☁️  Cloud ({}): {}", CLOUD_ENVIRONMENT_VAR, cloud),
            (None, Some(e)) => println!("☁️  Cloud ({}): ❌ {}", CLOUD_ENVIRONMENT_VAR, e),
            (None, None) => {}
        }
    }

    let missing: Vec<_> = report
        .variables
        .iter()
        .filter(|v| !v.set)
        .map(|v| v.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ProbeError::MissingConfiguration(format!(
            "environment variable(s) {} must be set",
            missing.join(", ")
        ))
        .into());
    }
    if let Some(e) = report.cloud_error {
        return Err(ProbeError::Config(e).into());
    }
    Ok(())
}
