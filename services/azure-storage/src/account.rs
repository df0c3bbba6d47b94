use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

use log::debug;
use sapmon_core::hash::base64_decode;
use sapmon_core::utils::Redact;
use sapmon_core::{Context, Error, Result};

use crate::{Config, EndpointResolver, ProvideAccount, StorageService};

/// Account metadata as published by the management plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountMetadata {
    /// Storage account name.
    pub name: String,
    /// Account type tag, for example `Standard_LRS` or `Premium_LRS`.
    pub account_type: String,
    /// Primary table endpoint, for example `https://acct.table.core.windows.net/`.
    pub table_endpoint: Option<String>,
    /// Primary blob endpoint, for example `https://acct.blob.core.windows.net/`.
    pub blob_endpoint: Option<String>,
}

/// A resolved storage account: everything needed to sign requests for it.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccountRef {
    /// Storage account name.
    pub name: String,
    /// Base64 encoded primary access key.
    pub primary_key: String,
    /// REST DNS suffix, for example `windows.net`.
    pub endpoint_suffix: String,
    /// Account type tag.
    pub account_type: String,
}

impl Debug for StorageAccountRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccountRef")
            .field("name", &self.name)
            .field("primary_key", &Redact::from(&self.primary_key))
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("account_type", &self.account_type)
            .finish()
    }
}

impl StorageAccountRef {
    /// Create a new account reference.
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        endpoint_suffix: impl Into<String>,
        account_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            endpoint_suffix: endpoint_suffix.into(),
            account_type: account_type.into(),
        }
    }

    /// Host serving `service` for this account: `<name>.<service>.core.<suffix>`.
    pub fn host(&self, service: StorageService) -> String {
        format!(
            "{}.{}.core.{}",
            self.name,
            service.endpoint_name(),
            self.endpoint_suffix
        )
    }

    /// Whether this is a premium (SSD backed) account.
    pub fn is_premium(&self) -> bool {
        self.account_type.to_ascii_lowercase().starts_with("premium")
    }
}

/// AccountCache memoizes account resolution for the lifetime of the cache.
///
/// Entries are only ever added. Once an account is cached, every caller gets
/// the same `Arc`, so all requests for a name are signed with the same key and
/// suffix even when lookups race.
pub struct AccountCache {
    provider: Arc<dyn ProvideAccount>,
    resolver: EndpointResolver,
    accounts: Mutex<HashMap<String, Arc<StorageAccountRef>>>,
}

impl Debug for AccountCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCache")
            .field("provider", &self.provider)
            .field("resolver", &self.resolver)
            .field("accounts", &self.accounts)
            .finish()
    }
}

impl AccountCache {
    /// Create a new cache backed by `provider`.
    pub fn new(provider: impl ProvideAccount, config: &Config) -> Self {
        Self {
            provider: Arc::new(provider),
            resolver: EndpointResolver::new(config.endpoint_suffix()),
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the cache with an already resolved account.
    pub fn with_account(self, account: StorageAccountRef) -> Self {
        self.accounts
            .lock()
            .expect("lock poisoned")
            .entry(account.name.clone())
            .or_insert_with(|| Arc::new(account));
        self
    }

    /// Get a cached account without resolving it.
    pub fn get(&self, name: &str) -> Option<Arc<StorageAccountRef>> {
        self.accounts.lock().expect("lock poisoned").get(name).cloned()
    }

    /// Number of cached accounts.
    pub fn len(&self) -> usize {
        self.accounts.lock().expect("lock poisoned").len()
    }

    /// Whether the cache holds no account.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve an account by name, hitting the provider only on first use.
    pub async fn resolve(&self, ctx: &Context, name: &str) -> Result<Arc<StorageAccountRef>> {
        if let Some(account) = self.get(name) {
            debug!("storage account {name} served from cache");
            return Ok(account);
        }

        let metadata = self
            .provider
            .provide_metadata(ctx, name)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("storage account {name} not found")))?;
        let primary_key = self
            .provider
            .provide_primary_key(ctx, name)
            .await?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::credential_invalid(format!("no access key found for storage account {name}"))
            })?;
        // Reject unusable keys before anything gets signed with them.
        base64_decode(&primary_key).map_err(|e| e.with_context(format!("account: {name}")))?;

        let endpoint_suffix = self.resolver.resolve(&metadata);
        let account = Arc::new(StorageAccountRef {
            name: name.to_string(),
            primary_key,
            endpoint_suffix,
            account_type: metadata.account_type,
        });
        debug!("storage account resolved: {account:?}");

        let mut accounts = self.accounts.lock().expect("lock poisoned");
        Ok(accounts
            .entry(name.to_string())
            .or_insert(account)
            .clone())
    }
}
