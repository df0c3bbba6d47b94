use async_trait::async_trait;
use log::debug;
use sapmon_core::{Context, Result};

use crate::constants::*;
use crate::{AccountMetadata, ConnectionString, ProvideAccount};

/// EnvAccountProvider serves the account configured in env.
///
/// - [`AZURE_STORAGE_CONNECTION_STRING`], or
/// - [`AZURE_STORAGE_ACCOUNT`] together with [`AZURE_STORAGE_KEY`].
///
/// Only the account named there is served.
#[derive(Clone, Debug, Default)]
pub struct EnvAccountProvider {}

impl EnvAccountProvider {
    /// Create a new env provider.
    pub fn new() -> Self {
        Self {}
    }

    fn load(&self, ctx: &Context, name: &str) -> Result<Option<(AccountMetadata, Option<String>)>> {
        let envs = ctx.env_vars();

        if let Some(conn_str) = envs
            .get(AZURE_STORAGE_CONNECTION_STRING)
            .filter(|v| !v.is_empty())
        {
            let conn = ConnectionString::parse(conn_str)?;
            if conn.account_name() == Some(name) {
                return Ok(Some((
                    conn.metadata()?,
                    conn.account_key().map(str::to_string),
                )));
            }
        }

        if envs.get(AZURE_STORAGE_ACCOUNT).map(String::as_str) == Some(name) {
            let metadata = AccountMetadata {
                name: name.to_string(),
                ..Default::default()
            };
            return Ok(Some((metadata, envs.get(AZURE_STORAGE_KEY).cloned())));
        }

        debug!("storage account {name} is not configured in env");
        Ok(None)
    }
}

#[async_trait]
impl ProvideAccount for EnvAccountProvider {
    async fn provide_metadata(&self, ctx: &Context, name: &str) -> Result<Option<AccountMetadata>> {
        Ok(self.load(ctx, name)?.map(|(metadata, _)| metadata))
    }

    async fn provide_primary_key(&self, ctx: &Context, name: &str) -> Result<Option<String>> {
        Ok(self.load(ctx, name)?.and_then(|(_, key)| key))
    }
}
