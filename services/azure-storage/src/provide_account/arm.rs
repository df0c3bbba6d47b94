use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH};
use http::{Method, StatusCode};
use log::debug;
use percent_encoding::utf8_percent_encode;
use sapmon_core::utils::Redact;
use sapmon_core::{Context, Error, Result};
use serde::Deserialize;

use crate::constants::*;
use crate::{AccountMetadata, ProvideAccount};

/// ArmAccountProvider looks storage accounts up through Azure Resource Manager.
///
/// Requests are authenticated with a bearer token for the management plane,
/// loaded from
///
/// - the token given by [`ArmAccountProvider::with_access_token`]
/// - env value: [`AZURE_ACCESS_TOKEN`]
/// - the Azure Instance Metadata Service (managed identity of the VM)
///
/// - [Storage Accounts - Get Properties](https://learn.microsoft.com/en-us/rest/api/storagerp/storage-accounts/get-properties)
/// - [Storage Accounts - List Keys](https://learn.microsoft.com/en-us/rest/api/storagerp/storage-accounts/list-keys)
#[derive(Clone, Default)]
pub struct ArmAccountProvider {
    subscription_id: Option<String>,
    resource_group: Option<String>,
    access_token: Option<String>,
    management_endpoint: Option<String>,
    imds_endpoint: Option<String>,
}

impl Debug for ArmAccountProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmAccountProvider")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("access_token", &Redact::from(&self.access_token))
            .field("management_endpoint", &self.management_endpoint)
            .field("imds_endpoint", &self.imds_endpoint)
            .finish()
    }
}

impl ArmAccountProvider {
    /// Look accounts up in `resource_group` of `subscription_id`.
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            resource_group: Some(resource_group.into()),
            ..Default::default()
        }
    }

    /// Fill unset fields from env.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        let envs = ctx.env_vars();
        let get = |key: &str| envs.get(key).filter(|v| !v.is_empty()).cloned();

        self.subscription_id = self.subscription_id.or_else(|| get(AZURE_SUBSCRIPTION_ID));
        self.resource_group = self.resource_group.or_else(|| get(AZURE_RESOURCE_GROUP));
        self.access_token = self.access_token.or_else(|| get(AZURE_ACCESS_TOKEN));
        self.management_endpoint = self
            .management_endpoint
            .or_else(|| get(AZURE_MANAGEMENT_ENDPOINT));
        self.imds_endpoint = self.imds_endpoint.or_else(|| get(AZURE_IMDS_ENDPOINT));
        self
    }

    /// Use a fixed bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Use another management endpoint, for example `https://management.chinacloudapi.cn`.
    pub fn with_management_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.management_endpoint = Some(endpoint.into());
        self
    }

    /// Use another instance metadata token endpoint.
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = Some(endpoint.into());
        self
    }

    fn management_endpoint(&self) -> &str {
        self.management_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_MANAGEMENT_ENDPOINT)
            .trim_end_matches('/')
    }

    fn account_url(&self, name: &str, action: &str) -> Option<String> {
        let (subscription_id, resource_group) =
            (self.subscription_id.as_ref()?, self.resource_group.as_ref()?);

        Some(format!(
            "{}/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}{action}?api-version={MANAGEMENT_API_VERSION}",
            self.management_endpoint()
        ))
    }

    async fn access_token(&self, ctx: &Context) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }
        if let Some(token) = ctx.env_var(AZURE_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            return Ok(token);
        }

        let endpoint = self.imds_endpoint.as_deref().unwrap_or(DEFAULT_IMDS_ENDPOINT);
        let resource = format!("{}/", self.management_endpoint());
        let url = format!(
            "{endpoint}?api-version=2018-02-01&resource={}",
            utf8_percent_encode(&resource, &AZURE_QUERY_ENCODE_SET)
        );

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(&url)
            .header("Metadata", "true")
            .body(Bytes::new())?;
        let resp = ctx.http_send(req).await?;
        if !resp.status().is_success() {
            let body = String::from_utf8_lossy(resp.body()).into_owned();
            return Err(Error::protocol(resp.status(), body)
                .with_context("failed to get management token from instance metadata service"));
        }

        let token: AccessTokenResponse = serde_json::from_slice(resp.body()).map_err(|e| {
            Error::parse("failed to parse instance metadata token response").with_source(e)
        })?;
        Ok(token.access_token)
    }

    async fn send(&self, ctx: &Context, method: Method, url: &str) -> Result<Option<Bytes>> {
        let token = self.access_token(ctx).await?;
        let mut value: http::HeaderValue = format!("Bearer {token}").parse()?;
        value.set_sensitive(true);

        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(url)
            .header(AUTHORIZATION, value);
        if method == Method::POST {
            builder = builder.header(CONTENT_LENGTH, 0);
        }
        let req = builder.body(Bytes::new())?;

        debug!("sending {method} {url}");
        let resp = ctx.http_send(req).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.into_body())),
            status => {
                let body = String::from_utf8_lossy(resp.body()).into_owned();
                Err(Error::protocol(status, body).with_context(format!("{method} {url}")))
            }
        }
    }
}

#[async_trait]
impl ProvideAccount for ArmAccountProvider {
    async fn provide_metadata(&self, ctx: &Context, name: &str) -> Result<Option<AccountMetadata>> {
        let Some(url) = self.account_url(name, "") else {
            debug!("subscription or resource group not set, skipping management lookup");
            return Ok(None);
        };
        let Some(body) = self.send(ctx, Method::GET, &url).await? else {
            return Ok(None);
        };

        let account: StorageAccountResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::parse("failed to parse storage account").with_source(e))?;
        Ok(Some(AccountMetadata {
            name: account.name,
            account_type: account.sku.name,
            table_endpoint: account.properties.primary_endpoints.table,
            blob_endpoint: account.properties.primary_endpoints.blob,
        }))
    }

    async fn provide_primary_key(&self, ctx: &Context, name: &str) -> Result<Option<String>> {
        let Some(url) = self.account_url(name, "/listKeys") else {
            return Ok(None);
        };
        let Some(body) = self.send(ctx, Method::POST, &url).await? else {
            return Ok(None);
        };

        let keys: ListKeysResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::parse("failed to parse storage account keys").with_source(e))?;
        let primary = keys
            .keys
            .iter()
            .find(|v| v.key_name.eq_ignore_ascii_case("key1"))
            .or_else(|| keys.keys.first())
            .map(|v| v.value.clone());
        Ok(primary)
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct StorageAccountResponse {
    name: String,
    sku: Sku,
    #[serde(default)]
    properties: StorageAccountProperties,
}

#[derive(Deserialize)]
struct Sku {
    name: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageAccountProperties {
    #[serde(default)]
    primary_endpoints: PrimaryEndpoints,
}

#[derive(Default, Deserialize)]
struct PrimaryEndpoints {
    blob: Option<String>,
    table: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListKeysResponse {
    keys: Vec<StorageAccountKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageAccountKey {
    key_name: String,
    value: String,
}
