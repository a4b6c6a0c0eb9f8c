//! Checks provisioned outputs against live resource state.
//!
//! Seven independent checks run concurrently. Each read is retried with
//! bounded backoff to absorb propagation delay, and a failing check never
//! stops the others from reporting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use probe_azure::{AccountRef, ApiError, ApiResult, ResourceApi};
use probe_iac::NormalizedOutputs;

use crate::retry::{retry_with_backoff, RetryConfig};

/// Default timeout for a single read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The verification checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    StorageAccountExists,
    ContainerExists,
    FileShareExists,
    ContainerPublicAccessDisabled,
    AccountKindMatches,
    SkuTierMatches,
    BlobEndpointMatches,
}

impl CheckName {
    pub const ALL: [CheckName; 7] = [
        CheckName::StorageAccountExists,
        CheckName::ContainerExists,
        CheckName::FileShareExists,
        CheckName::ContainerPublicAccessDisabled,
        CheckName::AccountKindMatches,
        CheckName::SkuTierMatches,
        CheckName::BlobEndpointMatches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::StorageAccountExists => "storage_account_exists",
            CheckName::ContainerExists => "container_exists",
            CheckName::FileShareExists => "file_share_exists",
            CheckName::ContainerPublicAccessDisabled => "container_public_access_disabled",
            CheckName::AccountKindMatches => "account_kind_matches",
            CheckName::SkuTierMatches => "sku_tier_matches",
            CheckName::BlobEndpointMatches => "blob_endpoint_matches",
        }
    }
}

impl std::fmt::Display for CheckName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: CheckName,
    pub expected: String,
    /// Last observed value; empty when no read succeeded
    pub observed: String,
    pub passed: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcomes, one per check in [`CheckName::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub checks: Vec<CheckOutcome>,
}

impl VerificationResult {
    /// True only when every check ran and passed.
    pub fn passed(&self) -> bool {
        self.checks.len() == CheckName::ALL.len() && self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failures().iter().map(|c| c.check.to_string()).collect()
    }

    pub fn get(&self, check: CheckName) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.check == check)
    }
}

#[derive(Debug, Clone)]
struct Reading {
    expected: String,
    observed: String,
}

impl Reading {
    fn new(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    fn flag(expected: bool, observed: bool) -> Self {
        Self::new(expected.to_string(), observed.to_string())
    }

    fn matches(&self) -> bool {
        self.expected == self.observed
    }
}

#[derive(Debug, Error)]
enum ReadFailure {
    #[error("{0}")]
    Api(ApiError),

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("expected {:?}, observed {:?}", .0.expected, .0.observed)]
    Mismatch(Reading),
}

/// Expected blob endpoint for `account` in a cloud with storage `suffix`.
pub fn expected_blob_endpoint(account: &str, suffix: &str) -> String {
    format!("https://{}.blob.{}/", account, suffix)
}

async fn read_blob_endpoint(api: &dyn ResourceApi, account: &AccountRef) -> ApiResult<Reading> {
    let suffix = api.storage_uri_suffix().await?;
    let observed = api.account_blob_endpoint(account).await?;
    Ok(Reading::new(
        expected_blob_endpoint(&account.account_name, &suffix),
        observed,
    ))
}

/// Runs the checks against a [`ResourceApi`].
pub struct Verifier {
    api: Arc<dyn ResourceApi>,
    retry: RetryConfig,
    read_timeout: Duration,
}

impl Verifier {
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self {
            api,
            retry: RetryConfig::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Run every check against the account named in `outputs`.
    pub async fn verify(&self, subscription_id: &str, outputs: &NormalizedOutputs) -> VerificationResult {
        let account = AccountRef::new(
            subscription_id,
            outputs.resource_group_name(),
            outputs.storage_account_name(),
        );
        info!(account = %account.account_name, "Verifying provisioned resources");

        let api: &dyn ResourceApi = self.api.as_ref();
        let account = &account;
        let container = outputs.container_name();
        let share = outputs.file_share_name();
        let kind = outputs.account_kind();
        let tier = outputs.account_tier();

        let checks: Vec<BoxFuture<'_, CheckOutcome>> = vec![
            self.run_check(CheckName::StorageAccountExists, "true", move || async move {
                api.storage_account_exists(account)
                    .await
                    .map(|exists| Reading::flag(true, exists))
            })
            .boxed(),
            self.run_check(CheckName::ContainerExists, "true", move || async move {
                api.container_exists(account, container)
                    .await
                    .map(|exists| Reading::flag(true, exists))
            })
            .boxed(),
            self.run_check(CheckName::FileShareExists, "true", move || async move {
                api.file_share_exists(account, share)
                    .await
                    .map(|exists| Reading::flag(true, exists))
            })
            .boxed(),
            self.run_check(CheckName::ContainerPublicAccessDisabled, "false", move || async move {
                api.container_public_access(account, container)
                    .await
                    .map(|public| Reading::flag(false, public))
            })
            .boxed(),
            self.run_check(CheckName::AccountKindMatches, kind, move || async move {
                api.account_kind(account)
                    .await
                    .map(|observed| Reading::new(kind, observed))
            })
            .boxed(),
            self.run_check(CheckName::SkuTierMatches, tier, move || async move {
                api.account_sku_tier(account)
                    .await
                    .map(|observed| Reading::new(tier, observed))
            })
            .boxed(),
            // The expected endpoint depends on a read, so nothing is known
            // up front.
            self.run_check(CheckName::BlobEndpointMatches, String::new(), move || {
                read_blob_endpoint(api, account)
            })
            .boxed(),
        ];

        let result = VerificationResult {
            checks: join_all(checks).await,
        };

        if result.passed() {
            info!(account = %account.account_name, "All checks passed");
        } else {
            warn!(
                account = %account.account_name,
                failed = ?result.failed_names(),
                "Verification failed"
            );
        }
        result
    }

    /// Retry `read` until it matches or attempts run out. `fallback_expected`
    /// is reported when no read ever succeeded.
    async fn run_check<F, Fut>(
        &self,
        check: CheckName,
        fallback_expected: impl Into<String>,
        mut read: F,
    ) -> CheckOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ApiResult<Reading>>,
    {
        let fallback_expected = fallback_expected.into();
        let read_timeout = self.read_timeout;
        let mut attempts = 0u32;

        let result = retry_with_backoff(&self.retry, check.as_str(), || {
            attempts += 1;
            let pending = read();
            async move {
                let reading = match tokio::time::timeout(read_timeout, pending).await {
                    Ok(Ok(reading)) => reading,
                    Ok(Err(e)) => return Err(ReadFailure::Api(e)),
                    Err(_) => return Err(ReadFailure::Timeout(read_timeout)),
                };
                if reading.matches() {
                    Ok(reading)
                } else {
                    Err(ReadFailure::Mismatch(reading))
                }
            }
        })
        .await;

        match result {
            Ok(reading) => {
                debug!(check = %check, attempts, observed = %reading.observed, "Check passed");
                CheckOutcome {
                    check,
                    expected: reading.expected,
                    observed: reading.observed,
                    passed: true,
                    attempts,
                    error: None,
                }
            }
            Err(ReadFailure::Mismatch(reading)) => {
                warn!(
                    check = %check,
                    attempts,
                    expected = %reading.expected,
                    observed = %reading.observed,
                    "Check mismatch"
                );
                CheckOutcome {
                    check,
                    expected: reading.expected,
                    observed: reading.observed,
                    passed: false,
                    attempts,
                    error: None,
                }
            }
            Err(e) => {
                warn!(check = %check, attempts, error = %e, "Check could not read live state");
                CheckOutcome {
                    check,
                    expected: fallback_expected,
                    observed: String::new(),
                    passed: false,
                    attempts,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
