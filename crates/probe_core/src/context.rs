//! Per-run execution context.

use std::path::{Path, PathBuf};

use probe_azure::{AccountRef, CloudEnvironment};
use probe_iac::{InputVariables, NormalizedOutputs};

use crate::credentials::Credentials;
use crate::naming::RunId;

/// Everything one run needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub credentials: Credentials,
    pub working_directory: PathBuf,
    pub cloud: CloudEnvironment,
}

impl RunContext {
    pub fn new(
        run_id: RunId,
        credentials: Credentials,
        working_directory: impl Into<PathBuf>,
        cloud: CloudEnvironment,
    ) -> Self {
        Self {
            run_id,
            credentials,
            working_directory: working_directory.into(),
            cloud,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn subscription_id(&self) -> &str {
        self.credentials.subscription_id()
    }

    /// Input variables for apply and destroy. Credentials are secret; the
    /// postfix is the lowercased run id.
    pub fn input_variables(&self) -> InputVariables {
        let names = self.credentials.names();
        InputVariables::new()
            .set_secret(&names.subscription, self.credentials.subscription_id())
            .set_secret(&names.client_id, self.credentials.client_id())
            .set_secret(&names.client_secret, self.credentials.client_secret())
            .set_secret(&names.tenant_id, self.credentials.tenant_id())
            .set(&names.postfix, self.run_id.as_str().to_lowercase())
    }

    /// Account reference for resource API reads.
    pub fn account_ref(&self, outputs: &NormalizedOutputs) -> AccountRef {
        AccountRef::new(
            self.subscription_id(),
            outputs.resource_group_name(),
            outputs.storage_account_name(),
        )
    }
}
