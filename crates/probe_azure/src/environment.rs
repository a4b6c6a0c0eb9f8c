//! Azure cloud environment metadata.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Sovereign cloud the resources live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CloudEnvironment {
    #[default]
    AzurePublicCloud,
    AzureUSGovernmentCloud,
    AzureChinaCloud,
    AzureGermanCloud,
}

impl CloudEnvironment {
    pub fn all() -> Vec<Self> {
        vec![
            Self::AzurePublicCloud,
            Self::AzureUSGovernmentCloud,
            Self::AzureChinaCloud,
            Self::AzureGermanCloud,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzurePublicCloud => "AzurePublicCloud",
            Self::AzureUSGovernmentCloud => "AzureUSGovernmentCloud",
            Self::AzureChinaCloud => "AzureChinaCloud",
            Self::AzureGermanCloud => "AzureGermanCloud",
        }
    }

    /// Parse an environment name. Matching is case-insensitive; an empty
    /// name selects the public cloud.
    pub fn from_name(name: &str) -> ApiResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Self::AzurePublicCloud);
        }
        Self::all()
            .into_iter()
            .find(|env| env.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ApiError::UnknownEnvironment(name.to_string()))
    }

    /// DNS suffix for storage endpoints.
    pub fn storage_suffix(&self) -> &'static str {
        match self {
            Self::AzurePublicCloud => "core.windows.net",
            Self::AzureUSGovernmentCloud => "core.usgovcloudapi.net",
            Self::AzureChinaCloud => "core.chinacloudapi.cn",
            Self::AzureGermanCloud => "core.cloudapi.de",
        }
    }

    /// Resource Manager endpoint, with trailing slash.
    pub fn resource_manager(&self) -> &'static str {
        match self {
            Self::AzurePublicCloud => "https://management.azure.com/",
            Self::AzureUSGovernmentCloud => "https://management.usgovcloudapi.net/",
            Self::AzureChinaCloud => "https://management.chinacloudapi.cn/",
            Self::AzureGermanCloud => "https://management.microsoftazure.de/",
        }
    }

    /// Active Directory authority host, with trailing slash.
    pub fn authority_host(&self) -> &'static str {
        match self {
            Self::AzurePublicCloud => "https://login.microsoftonline.com/",
            Self::AzureUSGovernmentCloud => "https://login.microsoftonline.us/",
            Self::AzureChinaCloud => "https://login.chinacloudapi.cn/",
            Self::AzureGermanCloud => "https://login.microsoftonline.de/",
        }
    }
}

impl std::fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
