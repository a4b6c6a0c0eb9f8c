//! Resource API seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

/// Identifies a storage account for read queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
}

impl AccountRef {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            account_name: account_name.into(),
        }
    }
}

/// Read-only queries against the live resource API.
///
/// Every call hits the API; implementations must not cache, since callers
/// poll these to wait out propagation delay.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn storage_account_exists(&self, account: &AccountRef) -> ApiResult<bool>;

    async fn container_exists(&self, account: &AccountRef, container: &str) -> ApiResult<bool>;

    async fn file_share_exists(&self, account: &AccountRef, share: &str) -> ApiResult<bool>;

    /// Whether anonymous public access is enabled on a blob container.
    async fn container_public_access(&self, account: &AccountRef, container: &str) -> ApiResult<bool>;

    async fn account_kind(&self, account: &AccountRef) -> ApiResult<String>;

    async fn account_sku_tier(&self, account: &AccountRef) -> ApiResult<String>;

    /// Primary blob endpoint, e.g. `https://sa1.blob.core.windows.net/`.
    async fn account_blob_endpoint(&self, account: &AccountRef) -> ApiResult<String>;

    /// Storage DNS suffix of the cloud environment the client targets.
    async fn storage_uri_suffix(&self) -> ApiResult<String>;
}
