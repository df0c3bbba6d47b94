use std::fmt::{self, Debug};

use async_trait::async_trait;
use log::{debug, warn};
use sapmon_core::{Context, Result};

use crate::{AccountMetadata, ArmAccountProvider, EnvAccountProvider, ProvideAccount};

/// A chain of account providers that will be tried in order.
///
/// Provider errors are logged and the next provider is tried.
pub struct ProvideAccountChain {
    providers: Vec<Box<dyn ProvideAccount>>,
}

impl ProvideAccountChain {
    /// Create a new empty chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Add a provider to the chain.
    pub fn push(mut self, provider: impl ProvideAccount) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl Default for ProvideAccountChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ProvideAccountChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvideAccountChain")
            .field("providers_count", &self.providers.len())
            .finish()
    }
}

#[async_trait]
impl ProvideAccount for ProvideAccountChain {
    async fn provide_metadata(&self, ctx: &Context, name: &str) -> Result<Option<AccountMetadata>> {
        for provider in &self.providers {
            match provider.provide_metadata(ctx, name).await {
                Ok(Some(metadata)) => return Ok(Some(metadata)),
                Ok(None) => debug!("no metadata of {name} in provider: {provider:?}"),
                Err(e) => warn!("loading metadata of {name} from {provider:?} failed: {e}"),
            }
        }

        Ok(None)
    }

    async fn provide_primary_key(&self, ctx: &Context, name: &str) -> Result<Option<String>> {
        for provider in &self.providers {
            match provider.provide_primary_key(ctx, name).await {
                Ok(Some(key)) => return Ok(Some(key)),
                Ok(None) => debug!("no key of {name} in provider: {provider:?}"),
                Err(e) => warn!("loading key of {name} from {provider:?} failed: {e}"),
            }
        }

        Ok(None)
    }
}

/// DefaultAccountProvider tries env first, then Azure Resource Manager.
#[derive(Debug)]
pub struct DefaultAccountProvider {
    chain: ProvideAccountChain,
}

impl Default for DefaultAccountProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultAccountProvider {
    /// Create a provider using the default sources.
    pub fn new() -> Self {
        Self {
            chain: ProvideAccountChain::new()
                .push(EnvAccountProvider::new())
                .push(ArmAccountProvider::default()),
        }
    }

    /// Create a provider whose management lookup is configured from env.
    pub fn from_env(ctx: &Context) -> Self {
        Self {
            chain: ProvideAccountChain::new()
                .push(EnvAccountProvider::new())
                .push(ArmAccountProvider::default().from_env(ctx)),
        }
    }
}

#[async_trait]
impl ProvideAccount for DefaultAccountProvider {
    async fn provide_metadata(&self, ctx: &Context, name: &str) -> Result<Option<AccountMetadata>> {
        self.chain.provide_metadata(ctx, name).await
    }

    async fn provide_primary_key(&self, ctx: &Context, name: &str) -> Result<Option<String>> {
        self.chain.provide_primary_key(ctx, name).await
    }
}
