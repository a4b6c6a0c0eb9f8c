//! Azure Resource Manager client for storage account queries.
//!
//! Authenticates as a service principal (client-credentials grant) and reads
//! storage account, blob container and file share resources over REST.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use crate::api::{AccountRef, ResourceApi};
use crate::environment::CloudEnvironment;
use crate::error::{ApiError, ApiResult};

const DEFAULT_API_VERSION: &str = "2023-01-01";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Service principal used to authenticate against Azure AD.
#[derive(Clone)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
}

impl std::fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

struct CachedToken {
    value: Zeroizing<String>,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct StorageAccountResource {
    kind: Option<String>,
    sku: Option<Sku>,
    properties: Option<AccountProperties>,
}

#[derive(Debug, Deserialize)]
struct Sku {
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountProperties {
    primary_endpoints: Option<Endpoints>,
}

#[derive(Debug, Deserialize)]
struct Endpoints {
    blob: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobContainerResource {
    properties: Option<ContainerProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerProperties {
    public_access: Option<String>,
}

/// Resource Manager client.
pub struct ArmClient {
    environment: CloudEnvironment,
    principal: ServicePrincipal,
    api_version: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl ArmClient {
    pub fn new(environment: CloudEnvironment, principal: ServicePrincipal) -> Self {
        Self {
            environment,
            principal,
            api_version: DEFAULT_API_VERSION.to_string(),
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Use an explicit HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn environment(&self) -> CloudEnvironment {
        self.environment
    }

    async fn bearer(&self) -> ApiResult<Zeroizing<String>> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}{}/oauth2/v2.0/token",
            self.environment.authority_host(),
            self.principal.tenant_id
        );
        let scope = format!("{}.default", self.environment.resource_manager());
        debug!("Requesting management token for client {}", self.principal.client_id);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.principal.client_id.as_str()),
                ("client_secret", self.principal.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("token request returned {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        let value = Zeroizing::new(token.access_token);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    /// GET a resource; `None` when it does not exist.
    async fn get_resource<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        let url = format!(
            "{}{}?api-version={}",
            self.environment.resource_manager(),
            path,
            self.api_version
        );
        let token = self.bearer().await?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.as_str())
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Status {
                    status: status.as_u16(),
                    url,
                    body,
                })
            }
        }
    }

    async fn account(&self, account: &AccountRef) -> ApiResult<StorageAccountResource> {
        self.get_resource(&account_path(account))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("storage account {}", account.account_name)))
    }
}

fn account_path(account: &AccountRef) -> String {
    format!(
        "subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
        account.subscription_id, account.resource_group, account.account_name
    )
}

fn container_path(account: &AccountRef, container: &str) -> String {
    format!("{}/blobServices/default/containers/{}", account_path(account), container)
}

fn share_path(account: &AccountRef, share: &str) -> String {
    format!("{}/fileServices/default/shares/{}", account_path(account), share)
}

/// Anything other than `None` grants anonymous read access.
fn public_access_enabled(level: Option<&str>) -> bool {
    !matches!(level, None | Some("None") | Some("none") | Some(""))
}

#[async_trait]
impl ResourceApi for ArmClient {
    async fn storage_account_exists(&self, account: &AccountRef) -> ApiResult<bool> {
        let resource: Option<IgnoredAny> = self.get_resource(&account_path(account)).await?;
        Ok(resource.is_some())
    }

    async fn container_exists(&self, account: &AccountRef, container: &str) -> ApiResult<bool> {
        let resource: Option<IgnoredAny> = self.get_resource(&container_path(account, container)).await?;
        Ok(resource.is_some())
    }

    async fn file_share_exists(&self, account: &AccountRef, share: &str) -> ApiResult<bool> {
        let resource: Option<IgnoredAny> = self.get_resource(&share_path(account, share)).await?;
        Ok(resource.is_some())
    }

    async fn container_public_access(&self, account: &AccountRef, container: &str) -> ApiResult<bool> {
        let resource: BlobContainerResource = self
            .get_resource(&container_path(account, container))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("blob container {}", container)))?;
        let level = resource.properties.and_then(|p| p.public_access);
        Ok(public_access_enabled(level.as_deref()))
    }

    async fn account_kind(&self, account: &AccountRef) -> ApiResult<String> {
        self.account(account)
            .await?
            .kind
            .ok_or_else(|| ApiError::Decode("storage account has no kind".to_string()))
    }

    async fn account_sku_tier(&self, account: &AccountRef) -> ApiResult<String> {
        self.account(account)
            .await?
            .sku
            .and_then(|sku| sku.tier)
            .ok_or_else(|| ApiError::Decode("storage account has no sku tier".to_string()))
    }

    async fn account_blob_endpoint(&self, account: &AccountRef) -> ApiResult<String> {
        self.account(account)
            .await?
            .properties
            .and_then(|p| p.primary_endpoints)
            .and_then(|e| e.blob)
            .ok_or_else(|| ApiError::Decode("storage account has no blob endpoint".to_string()))
    }

    async fn storage_uri_suffix(&self) -> ApiResult<String> {
        Ok(self.environment.storage_suffix().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountRef {
        AccountRef::new("00000000-0000-0000-0000-000000000000", "rg-probe", "sa1")
    }

    #[test]
    fn test_resource_paths() {
        assert_eq!(
            account_path(&account()),
            "subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg-probe/providers/Microsoft.Storage/storageAccounts/sa1"
        );
        assert!(container_path(&account(), "data").ends_with("/storageAccounts/sa1/blobServices/default/containers/data"));
        assert!(share_path(&account(), "share").ends_with("/storageAccounts/sa1/fileServices/default/shares/share"));
    }

    #[test]
    fn test_public_access_levels() {
        assert!(!public_access_enabled(None));
        assert!(!public_access_enabled(Some("None")));
        assert!(public_access_enabled(Some("Blob")));
        assert!(public_access_enabled(Some("Container")));
    }

    #[test]
    fn test_account_resource_decoding() {
        let body = r#"{
            "kind": "StorageV2",
            "sku": {"name": "Standard_LRS", "tier": "Standard"},
            "properties": {"primaryEndpoints": {"blob": "https://sa1.blob.core.windows.net/"}}
        }"#;
        let resource: StorageAccountResource = serde_json::from_str(body).unwrap();

        assert_eq!(resource.kind.as_deref(), Some("StorageV2"));
        assert_eq!(resource.sku.and_then(|s| s.tier).as_deref(), Some("Standard"));
        assert_eq!(
            resource.properties.and_then(|p| p.primary_endpoints).and_then(|e| e.blob).as_deref(),
            Some("https://sa1.blob.core.windows.net/")
        );
    }

    #[test]
    fn test_principal_debug_hides_secret() {
        let principal = ServicePrincipal {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: Zeroizing::new("hunter2".to_string()),
        };
        assert!(!format!("{:?}", principal).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_uri_suffix_follows_environment() {
        let principal = ServicePrincipal {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: Zeroizing::new("secret".to_string()),
        };
        let client = ArmClient::new(CloudEnvironment::AzureChinaCloud, principal);
        assert_eq!(client.storage_uri_suffix().await.unwrap(), "core.chinacloudapi.cn");
    }
}
