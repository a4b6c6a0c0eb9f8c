//! Top-level entry point wiring configuration, credentials and the lifecycle.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use probe_azure::ResourceApi;
use probe_iac::ProvisioningTool;

use crate::config::ProbeConfig;
use crate::context::RunContext;
use crate::credentials::{CredentialResolver, EnvSource};
use crate::error::{ProbeError, ProbeResult};
use crate::lifecycle::LifecycleController;
use crate::naming;
use crate::report::RunReport;
use crate::verifier::Verifier;
use crate::workspace::RunWorkspace;

/// Builds run contexts and controllers from one configuration.
pub struct Probe {
    config: ProbeConfig,
    tool: Arc<dyn ProvisioningTool>,
}

impl Probe {
    pub fn new(config: ProbeConfig, tool: Arc<dyn ProvisioningTool>) -> Self {
        Self { config, tool }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Resolve credentials, check the working directory and mint a run id.
    ///
    /// Fails before anything is provisioned.
    pub fn prepare(&self, env: &dyn EnvSource, dir: &Path) -> ProbeResult<RunContext> {
        let resolver = CredentialResolver::new(env, self.config.variables.clone());
        let credentials = resolver.resolve()?;
        let cloud = resolver.cloud_environment()?;

        if !dir.is_dir() {
            return Err(ProbeError::MissingConfiguration(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }

        let run_id = naming::generate(self.config.run_id_length)?;
        info!(run_id = %run_id, cloud = %cloud, "Prepared run");
        Ok(RunContext::new(run_id, credentials, dir, cloud))
    }

    /// A fresh controller for one run against `api`.
    pub fn controller(&self, api: Arc<dyn ResourceApi>) -> LifecycleController {
        let verifier = Verifier::new(api)
            .with_retry(self.config.verification.clone())
            .with_read_timeout(self.config.timeouts.read_timeout());

        LifecycleController::new(self.tool.clone(), verifier)
            .with_teardown_retry(self.config.teardown.clone())
            .with_run_deadline(self.config.timeouts.run_deadline())
    }

    /// Prepare and run one full lifecycle.
    ///
    /// `api_for` builds the resource API client once credentials are known.
    /// Errors are only returned for failures before provisioning starts;
    /// everything after that is recorded in the report.
    pub async fn execute<F>(
        &self,
        env: &dyn EnvSource,
        dir: &Path,
        api_for: F,
        cancel: CancellationToken,
    ) -> ProbeResult<RunReport>
    where
        F: FnOnce(&RunContext) -> ProbeResult<Arc<dyn ResourceApi>>,
    {
        let ctx = self.prepare(env, dir)?;
        let api = api_for(&ctx)?;
        Ok(self.controller(api).run(&ctx, cancel).await)
    }

    /// Run one lifecycle against a private copy of `dir`.
    ///
    /// The copy is removed afterwards unless teardown failed: it then holds
    /// the only state that can destroy what is left, and its path is
    /// recorded in the report.
    pub async fn execute_isolated<F>(
        &self,
        env: &dyn EnvSource,
        dir: &Path,
        api_for: F,
        cancel: CancellationToken,
    ) -> ProbeResult<RunReport>
    where
        F: FnOnce(&RunContext) -> ProbeResult<Arc<dyn ResourceApi>>,
    {
        let workspace = RunWorkspace::stage(dir)?;
        let mut report = self.execute(env, workspace.path(), api_for, cancel).await?;

        if report.leaked_resources() {
            let kept = workspace.keep();
            warn!(
                run_id = %report.run_id,
                state_dir = %kept.display(),
                "Keeping run workspace for manual cleanup"
            );
            report.teardown.state_dir = Some(kept);
        }
        Ok(report)
    }
}
