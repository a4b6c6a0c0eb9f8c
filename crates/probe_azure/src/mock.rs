//! Scripted resource API for testing.
//!
//! Serves a fixed [`ObservedState`] and can inject transient errors or stale
//! answers per operation to model propagation delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::api::{AccountRef, ResourceApi};
use crate::error::{ApiError, ApiResult};

/// Facts the mock reports about its one storage account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservedState {
    pub account_exists: bool,
    pub container_exists: bool,
    pub file_share_exists: bool,
    pub container_public_access: bool,
    pub account_kind: String,
    pub sku_tier: String,
    pub blob_endpoint: String,
}

/// Operations exposed by [`ResourceApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    AccountExists,
    ContainerExists,
    FileShareExists,
    PublicAccess,
    Kind,
    SkuTier,
    BlobEndpoint,
    UriSuffix,
}

#[derive(Debug, Default, Clone)]
struct Fault {
    errors: u32,
    stale: u32,
    always_error: bool,
    delay: Option<Duration>,
}

/// Mock resource API.
#[derive(Clone)]
pub struct MockResourceApi {
    state: Arc<RwLock<ObservedState>>,
    uri_suffix: Arc<RwLock<String>>,
    faults: Arc<RwLock<HashMap<ApiOperation, Fault>>>,
    calls: Arc<RwLock<HashMap<ApiOperation, u32>>>,
    queried: Arc<RwLock<Vec<AccountRef>>>,
}

impl MockResourceApi {
    pub fn new(state: ObservedState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            uri_suffix: Arc::new(RwLock::new("core.windows.net".to_string())),
            faults: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            queried: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A healthy account `name` with a private container and a file share.
    pub fn healthy(name: &str, kind: &str, tier: &str) -> Self {
        Self::new(ObservedState {
            account_exists: true,
            container_exists: true,
            file_share_exists: true,
            container_public_access: false,
            account_kind: kind.to_string(),
            sku_tier: tier.to_string(),
            blob_endpoint: format!("https://{}.blob.core.windows.net/", name),
        })
    }

    pub fn with_uri_suffix(self, suffix: impl Into<String>) -> Self {
        *self.uri_suffix.write() = suffix.into();
        self
    }

    /// Mutate the served state.
    pub fn update(&self, f: impl FnOnce(&mut ObservedState)) {
        f(&mut self.state.write());
    }

    /// Fail the first `times` calls of `op` with a transient error.
    pub fn fail_times(self, op: ApiOperation, times: u32) -> Self {
        self.faults.write().entry(op).or_default().errors = times;
        self
    }

    /// Fail every call of `op`.
    pub fn always_fail(self, op: ApiOperation) -> Self {
        self.faults.write().entry(op).or_default().always_error = true;
        self
    }

    /// Answer the first `times` calls of `op` as if the resource had not
    /// propagated yet (absent, empty, or public).
    pub fn stale_times(self, op: ApiOperation, times: u32) -> Self {
        self.faults.write().entry(op).or_default().stale = times;
        self
    }

    /// Delay every call of `op`.
    pub fn delay(self, op: ApiOperation, delay: Duration) -> Self {
        self.faults.write().entry(op).or_default().delay = Some(delay);
        self
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: ApiOperation) -> u32 {
        self.calls.read().get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> u32 {
        self.calls.read().values().sum()
    }

    /// Every account reference queried, in call order.
    pub fn queried_accounts(&self) -> Vec<AccountRef> {
        self.queried.read().clone()
    }

    /// Record the call and decide whether it is answered normally.
    /// Returns `Ok(true)` for a stale answer.
    async fn enter(&self, op: ApiOperation, account: Option<&AccountRef>) -> ApiResult<bool> {
        *self.calls.write().entry(op).or_insert(0) += 1;
        if let Some(account) = account {
            self.queried.write().push(account.clone());
        }

        let delay = self.faults.read().get(&op).and_then(|f| f.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut faults = self.faults.write();
        let Some(fault) = faults.get_mut(&op) else {
            return Ok(false);
        };
        if fault.always_error {
            return Err(ApiError::Unavailable(format!("{:?} is failing", op)));
        }
        if fault.errors > 0 {
            fault.errors -= 1;
            return Err(ApiError::Unavailable(format!("{:?} transient failure", op)));
        }
        if fault.stale > 0 {
            fault.stale -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl ResourceApi for MockResourceApi {
    async fn storage_account_exists(&self, account: &AccountRef) -> ApiResult<bool> {
        let stale = self.enter(ApiOperation::AccountExists, Some(account)).await?;
        Ok(!stale && self.state.read().account_exists)
    }

    async fn container_exists(&self, account: &AccountRef, _container: &str) -> ApiResult<bool> {
        let stale = self.enter(ApiOperation::ContainerExists, Some(account)).await?;
        Ok(!stale && self.state.read().container_exists)
    }

    async fn file_share_exists(&self, account: &AccountRef, _share: &str) -> ApiResult<bool> {
        let stale = self.enter(ApiOperation::FileShareExists, Some(account)).await?;
        Ok(!stale && self.state.read().file_share_exists)
    }

    async fn container_public_access(&self, account: &AccountRef, _container: &str) -> ApiResult<bool> {
        let stale = self.enter(ApiOperation::PublicAccess, Some(account)).await?;
        Ok(stale || self.state.read().container_public_access)
    }

    async fn account_kind(&self, account: &AccountRef) -> ApiResult<String> {
        let stale = self.enter(ApiOperation::Kind, Some(account)).await?;
        Ok(if stale { String::new() } else { self.state.read().account_kind.clone() })
    }

    async fn account_sku_tier(&self, account: &AccountRef) -> ApiResult<String> {
        let stale = self.enter(ApiOperation::SkuTier, Some(account)).await?;
        Ok(if stale { String::new() } else { self.state.read().sku_tier.clone() })
    }

    async fn account_blob_endpoint(&self, account: &AccountRef) -> ApiResult<String> {
        let stale = self.enter(ApiOperation::BlobEndpoint, Some(account)).await?;
        Ok(if stale { String::new() } else { self.state.read().blob_endpoint.clone() })
    }

    async fn storage_uri_suffix(&self) -> ApiResult<String> {
        self.enter(ApiOperation::UriSuffix, None).await?;
        Ok(self.uri_suffix.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountRef {
        AccountRef::new("sub", "rg", "sa1")
    }

    #[tokio::test]
    async fn test_healthy_state() {
        let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

        assert!(api.storage_account_exists(&account()).await.unwrap());
        assert!(!api.container_public_access(&account(), "data").await.unwrap());
        assert_eq!(api.account_kind(&account()).await.unwrap(), "StorageV2");
        assert_eq!(
            api.account_blob_endpoint(&account()).await.unwrap(),
            "https://sa1.blob.core.windows.net/"
        );
        assert_eq!(api.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard")
            .fail_times(ApiOperation::Kind, 2);

        assert!(api.account_kind(&account()).await.is_err());
        assert!(api.account_kind(&account()).await.is_err());
        assert_eq!(api.account_kind(&account()).await.unwrap(), "StorageV2");
        assert_eq!(api.calls(ApiOperation::Kind), 3);
    }

    #[tokio::test]
    async fn test_stale_answers() {
        let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard")
            .stale_times(ApiOperation::ContainerExists, 1);

        assert!(!api.container_exists(&account(), "data").await.unwrap());
        assert!(api.container_exists(&account(), "data").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_queried_accounts() {
        let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");
        api.update(|s| s.account_kind = "Storage".to_string());

        assert_eq!(api.account_kind(&account()).await.unwrap(), "Storage");
        assert_eq!(api.queried_accounts(), vec![account()]);
    }
}
