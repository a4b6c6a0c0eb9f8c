//! Credential resolution from the environment.
//!
//! This is the only place ambient process state is read. Everything
//! downstream receives credentials through the [`RunContext`](crate::RunContext).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use probe_azure::{CloudEnvironment, ServicePrincipal};

use crate::error::{ProbeError, ProbeResult};

/// Environment variable selecting the sovereign cloud.
pub const CLOUD_ENVIRONMENT_VAR: &str = "AZURE_ENVIRONMENT";

/// Source of environment variables.
pub trait EnvSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Variable names shared by the environment and the infrastructure
/// definition's input variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableNames {
    pub subscription: String,
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    /// Input variable receiving the run id
    pub postfix: String,
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            subscription: "subscription".to_string(),
            client_id: "client_id".to_string(),
            client_secret: "client_secret".to_string(),
            tenant_id: "tenant_id".to_string(),
            postfix: "postfix".to_string(),
        }
    }
}

impl VariableNames {
    /// Credential variable names in resolution order.
    pub fn credential_vars(&self) -> [&str; 4] {
        [
            &self.subscription,
            &self.client_id,
            &self.client_secret,
            &self.tenant_id,
        ]
    }
}

/// The four secrets a run needs. Wiped from memory on drop.
#[derive(Clone)]
pub struct Credentials {
    names: VariableNames,
    subscription_id: Zeroizing<String>,
    client_id: Zeroizing<String>,
    client_secret: Zeroizing<String>,
    tenant_id: Zeroizing<String>,
}

impl Credentials {
    pub fn new(
        names: VariableNames,
        subscription_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            names,
            subscription_id: Zeroizing::new(subscription_id.into()),
            client_id: Zeroizing::new(client_id.into()),
            client_secret: Zeroizing::new(client_secret.into()),
            tenant_id: Zeroizing::new(tenant_id.into()),
        }
    }

    pub fn names(&self) -> &VariableNames {
        &self.names
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Service principal for the resource API client.
    pub fn service_principal(&self) -> ServicePrincipal {
        ServicePrincipal {
            tenant_id: self.tenant_id.to_string(),
            client_id: self.client_id.to_string(),
            client_secret: self.client_secret.clone(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("subscription_id", &"***")
            .field("client_id", &"***")
            .field("client_secret", &"***")
            .field("tenant_id", &"***")
            .finish()
    }
}

/// Reads the credential variables and the cloud environment.
pub struct CredentialResolver<'a> {
    env: &'a dyn EnvSource,
    names: VariableNames,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(env: &'a dyn EnvSource, names: VariableNames) -> Self {
        Self { env, names }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.env.get(name).filter(|v| !v.trim().is_empty())
    }

    /// Names of required variables that are unset or blank.
    pub fn missing(&self) -> Vec<String> {
        self.names
            .credential_vars()
            .iter()
            .filter(|name| self.lookup(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Resolve all four credentials, or report every missing variable.
    pub fn resolve(&self) -> ProbeResult<Credentials> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ProbeError::MissingConfiguration(format!(
                "environment variable(s) {} must be set",
                missing.join(", ")
            )));
        }

        let read = |name: &str| self.lookup(name).unwrap_or_default();
        debug!("Resolved credentials from {:?}", self.names.credential_vars());

        Ok(Credentials::new(
            self.names.clone(),
            read(&self.names.subscription),
            read(&self.names.client_id),
            read(&self.names.client_secret),
            read(&self.names.tenant_id),
        ))
    }

    /// Cloud environment named by `AZURE_ENVIRONMENT`, public cloud if unset.
    pub fn cloud_environment(&self) -> ProbeResult<CloudEnvironment> {
        let name = self.env.get(CLOUD_ENVIRONMENT_VAR).unwrap_or_default();
        CloudEnvironment::from_name(&name).map_err(|e| ProbeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env() -> HashMap<String, String> {
        [
            ("subscription", "sub-id"),
            ("client_id", "client"),
            ("client_secret", "hunter2"),
            ("tenant_id", "tenant"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_resolve_all_present() {
        let env = full_env();
        let creds = CredentialResolver::new(&env, VariableNames::default())
            .resolve()
            .unwrap();

        assert_eq!(creds.subscription_id(), "sub-id");
        assert_eq!(creds.client_secret(), "hunter2");
        assert_eq!(creds.service_principal().tenant_id, "tenant");
    }

    #[test]
    fn test_each_missing_variable_is_fatal() {
        for name in ["subscription", "client_id", "client_secret", "tenant_id"] {
            let mut env = full_env();
            env.remove(name);

            let err = CredentialResolver::new(&env, VariableNames::default())
                .resolve()
                .unwrap_err();
            assert!(matches!(err, ProbeError::MissingConfiguration(ref m) if m.contains(name)));
        }
    }

    #[test]
    fn test_blank_counts_as_missing_and_all_are_listed() {
        let mut env = full_env();
        env.insert("tenant_id".to_string(), "   ".to_string());
        env.remove("client_id");

        let resolver = CredentialResolver::new(&env, VariableNames::default());
        assert_eq!(resolver.missing(), vec!["client_id", "tenant_id"]);
    }

    #[test]
    fn test_custom_variable_names() {
        let env: HashMap<String, String> = [
            ("ARM_SUBSCRIPTION_ID", "s"),
            ("ARM_CLIENT_ID", "c"),
            ("ARM_CLIENT_SECRET", "x"),
            ("ARM_TENANT_ID", "t"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let names = VariableNames {
            subscription: "ARM_SUBSCRIPTION_ID".to_string(),
            client_id: "ARM_CLIENT_ID".to_string(),
            client_secret: "ARM_CLIENT_SECRET".to_string(),
            tenant_id: "ARM_TENANT_ID".to_string(),
            ..Default::default()
        };

        let creds = CredentialResolver::new(&env, names).resolve().unwrap();
        assert_eq!(creds.tenant_id(), "t");
    }

    #[test]
    fn test_debug_hides_everything() {
        let env = full_env();
        let creds = CredentialResolver::new(&env, VariableNames::default())
            .resolve()
            .unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sub-id"));
    }

    #[test]
    fn test_cloud_environment() {
        let mut env = full_env();
        let resolver = CredentialResolver::new(&env, VariableNames::default());
        assert_eq!(resolver.cloud_environment().unwrap(), CloudEnvironment::AzurePublicCloud);

        env.insert(CLOUD_ENVIRONMENT_VAR.to_string(), "AzureUSGovernmentCloud".to_string());
        let resolver = CredentialResolver::new(&env, VariableNames::default());
        assert_eq!(
            resolver.cloud_environment().unwrap(),
            CloudEnvironment::AzureUSGovernmentCloud
        );
    }
}
