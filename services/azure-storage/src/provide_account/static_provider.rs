use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use sapmon_core::utils::Redact;
use sapmon_core::{Context, Result};

use crate::{AccountMetadata, ProvideAccount};

/// StaticAccountProvider serves accounts known up front.
#[derive(Clone, Default)]
pub struct StaticAccountProvider {
    accounts: HashMap<String, (AccountMetadata, String)>,
}

impl Debug for StaticAccountProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_map();
        for (name, (metadata, key)) in &self.accounts {
            d.entry(name, &(metadata, Redact::from(key)));
        }
        d.finish()
    }
}

impl StaticAccountProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with its primary key.
    pub fn with_account(mut self, metadata: AccountMetadata, primary_key: impl Into<String>) -> Self {
        self.accounts
            .insert(metadata.name.clone(), (metadata, primary_key.into()));
        self
    }
}

#[async_trait]
impl ProvideAccount for StaticAccountProvider {
    async fn provide_metadata(
        &self,
        _: &Context,
        name: &str,
    ) -> Result<Option<AccountMetadata>> {
        Ok(self.accounts.get(name).map(|(metadata, _)| metadata.clone()))
    }

    async fn provide_primary_key(&self, _: &Context, name: &str) -> Result<Option<String>> {
        Ok(self.accounts.get(name).map(|(_, key)| key.clone()))
    }
}
