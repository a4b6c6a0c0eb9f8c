//! Declared outputs of the storage definition under test.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};
use crate::normalize::normalize;

/// Output keys the infrastructure definition must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKey {
    ResourceGroupName,
    StorageAccountName,
    StorageAccountAccountTier,
    StorageAccountAccountKind,
    StorageContainerName,
    StorageFileshareName,
}

impl OutputKey {
    pub const ALL: [OutputKey; 6] = [
        OutputKey::ResourceGroupName,
        OutputKey::StorageAccountName,
        OutputKey::StorageAccountAccountTier,
        OutputKey::StorageAccountAccountKind,
        OutputKey::StorageContainerName,
        OutputKey::StorageFileshareName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKey::ResourceGroupName => "resource_group_name",
            OutputKey::StorageAccountName => "storage_account_name",
            OutputKey::StorageAccountAccountTier => "storage_account_account_tier",
            OutputKey::StorageAccountAccountKind => "storage_account_account_kind",
            OutputKey::StorageContainerName => "storage_container_name",
            OutputKey::StorageFileshareName => "storage_fileshare_name",
        }
    }
}

impl std::fmt::Display for OutputKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw output values as reported by the provisioning tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredOutputs {
    values: BTreeMap<OutputKey, String>,
}

impl DeclaredOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: OutputKey, raw: impl Into<String>) {
        self.values.insert(key, raw.into());
    }

    pub fn with(mut self, key: OutputKey, raw: impl Into<String>) -> Self {
        self.insert(key, raw);
        self
    }

    pub fn get(&self, key: OutputKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Normalize every value. Fails unless all six keys are present and
    /// non-empty after normalization.
    pub fn normalize(&self) -> IacResult<NormalizedOutputs> {
        let mut normalized = BTreeMap::new();
        for key in OutputKey::ALL {
            let raw = self.values.get(&key).ok_or_else(|| IacError::OutputFailed {
                key: key.to_string(),
                message: "not collected".to_string(),
            })?;
            let value = normalize(raw).map_err(|e| match e {
                IacError::MalformedOutput(msg) => {
                    IacError::MalformedOutput(format!("output '{}': {}", key, msg))
                }
                other => other,
            })?;
            if value.is_empty() {
                return Err(IacError::EmptyOutput { key: key.to_string() });
            }
            normalized.insert(key, value);
        }
        Ok(NormalizedOutputs { values: normalized })
    }
}

/// Canonicalized outputs. Only constructible with the full key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedOutputs {
    values: BTreeMap<OutputKey, String>,
}

impl NormalizedOutputs {
    fn value(&self, key: OutputKey) -> &str {
        self.values.get(&key).map(String::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: OutputKey) -> &str {
        self.value(key)
    }

    pub fn resource_group_name(&self) -> &str {
        self.value(OutputKey::ResourceGroupName)
    }

    pub fn storage_account_name(&self) -> &str {
        self.value(OutputKey::StorageAccountName)
    }

    pub fn account_tier(&self) -> &str {
        self.value(OutputKey::StorageAccountAccountTier)
    }

    pub fn account_kind(&self) -> &str {
        self.value(OutputKey::StorageAccountAccountKind)
    }

    pub fn container_name(&self) -> &str {
        self.value(OutputKey::StorageContainerName)
    }

    pub fn file_share_name(&self) -> &str {
        self.value(OutputKey::StorageFileshareName)
    }
}
