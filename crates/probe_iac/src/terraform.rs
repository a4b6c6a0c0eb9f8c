//! Terraform driver on top of a [`CommandRunner`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use probe_runner::{CommandRunner, CommandSpec, ContainerConfig, RunConfig};

use crate::error::{IacError, IacResult};
use crate::provisioning::{InputVariables, ProvisioningTool};

/// Result of a Terraform operation.
#[derive(Debug)]
pub struct TerraformResult {
    pub success: bool,
    pub output: String,
    pub exit_code: i64,
}

/// Per-command timeouts in seconds (0 = none).
#[derive(Debug, Clone)]
pub struct TerraformTimeouts {
    pub init: u64,
    pub apply: u64,
    pub output: u64,
    pub destroy: u64,
}

impl Default for TerraformTimeouts {
    fn default() -> Self {
        Self {
            init: 600,
            apply: 1800,
            output: 60,
            destroy: 1800,
        }
    }
}

/// Terraform runner executing on the host or in a container.
pub struct TerraformRunner {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    container: Option<ContainerConfig>,
    timeouts: TerraformTimeouts,
    stream_logs: bool,
}

impl TerraformRunner {
    /// Create a Terraform runner using the `terraform` binary on PATH.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
            container: None,
            timeouts: TerraformTimeouts::default(),
            stream_logs: false,
        }
    }

    /// Use a specific terraform binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run terraform inside a container image instead of on the host.
    pub fn with_image(mut self, image: impl Into<String>, tag: impl Into<String>) -> Self {
        self.container = Some(ContainerConfig::new(image).tag(tag).name_prefix("infraprobe-tf"));
        self
    }

    pub fn with_timeouts(mut self, timeouts: TerraformTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Echo terraform output while it runs.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }

    /// Check that terraform can be executed.
    pub async fn is_available(&self) -> IacResult<bool> {
        if self.container.is_some() {
            return Ok(true);
        }
        Ok(self.runner.is_available(&self.binary).await?)
    }

    /// Run terraform init.
    pub async fn init(&self, working_dir: &Path) -> IacResult<TerraformResult> {
        info!("Running terraform init in {:?}", working_dir);
        self.run_command(
            working_dir,
            &["init", "-input=false", "-no-color"],
            None,
            self.timeouts.init,
        )
        .await
    }

    /// Run terraform apply without prompting.
    pub async fn apply_once(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<TerraformResult> {
        info!("Running terraform apply in {:?}", working_dir);
        self.run_command(
            working_dir,
            &["apply", "-auto-approve", "-input=false", "-no-color"],
            Some(vars),
            self.timeouts.apply,
        )
        .await
    }

    /// Run terraform output for a single key in JSON form.
    pub async fn output_json(&self, working_dir: &Path, key: &str) -> IacResult<TerraformResult> {
        debug!("Reading terraform output {}", key);
        self.run_command(
            working_dir,
            &["output", "-no-color", "-json", key],
            None,
            self.timeouts.output,
        )
        .await
    }

    /// Run terraform destroy without prompting.
    pub async fn destroy_once(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<TerraformResult> {
        info!("Running terraform destroy in {:?}", working_dir);
        self.run_command(
            working_dir,
            &["destroy", "-auto-approve", "-input=false", "-no-color"],
            Some(vars),
            self.timeouts.destroy,
        )
        .await
    }

    /// Build the command for a terraform invocation.
    fn command(&self, working_dir: &Path, args: &[&str], vars: Option<&InputVariables>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .args(args.iter().copied())
            .workdir(working_dir)
            .env("TF_IN_AUTOMATION", "1");

        // Input variables travel as TF_VAR_* so their values never appear on a command line.
        if let Some(vars) = vars {
            for (name, value, secret) in vars.iter() {
                let key = format!("TF_VAR_{}", name);
                spec = if secret {
                    spec.secret_env(key, value)
                } else {
                    spec.env(key, value)
                };
            }
        }

        if let Some(container) = &self.container {
            spec = spec.container(container.clone());
        }
        spec
    }

    async fn run_command(
        &self,
        working_dir: &Path,
        args: &[&str],
        vars: Option<&InputVariables>,
        timeout: u64,
    ) -> IacResult<TerraformResult> {
        let spec = self.command(working_dir, args, vars);
        let run_config = RunConfig::default()
            .timeout(timeout)
            .stream_logs(self.stream_logs);

        debug!("Executing terraform {:?}", args);

        let result = self.runner.run(&spec, &run_config).await?;
        if !result.success() {
            warn!(
                "terraform {} exited with code {}",
                args.first().copied().unwrap_or_default(),
                result.exit_code
            );
        }

        Ok(TerraformResult {
            success: result.success(),
            output: if result.success() {
                result.stdout.clone()
            } else {
                result.last_error_line().to_string()
            },
            exit_code: result.exit_code,
        })
    }
}

#[async_trait]
impl ProvisioningTool for TerraformRunner {
    async fn apply(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()> {
        let init = self.init(working_dir).await?;
        if !init.success {
            return Err(IacError::InitFailed(init.output));
        }

        let apply = self.apply_once(working_dir, vars).await?;
        if !apply.success {
            return Err(IacError::ApplyFailed(apply.output));
        }
        Ok(())
    }

    async fn output(&self, working_dir: &Path, key: &str) -> IacResult<String> {
        let result = self.output_json(working_dir, key).await?;
        if !result.success {
            return Err(IacError::OutputFailed {
                key: key.to_string(),
                message: result.output,
            });
        }
        Ok(result.output)
    }

    async fn destroy(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()> {
        let result = self.destroy_once(working_dir, vars).await?;
        if !result.success {
            return Err(IacError::DestroyFailed(result.output));
        }
        Ok(())
    }

    async fn settle(&self) {
        self.runner.settle().await
    }
}
