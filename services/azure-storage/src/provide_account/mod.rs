use std::fmt::Debug;

use async_trait::async_trait;
use sapmon_core::{Context, Result};

use crate::AccountMetadata;

mod static_provider;
pub use static_provider::StaticAccountProvider;

mod env;
pub use env::EnvAccountProvider;

mod arm;
pub use arm::ArmAccountProvider;

mod chain;
pub use chain::{DefaultAccountProvider, ProvideAccountChain};

/// ProvideAccount looks storage accounts up by name.
///
/// Returning `Ok(None)` means this provider doesn't know the account.
#[async_trait]
pub trait ProvideAccount: Debug + Send + Sync + 'static {
    /// Load the metadata of account `name`.
    async fn provide_metadata(&self, ctx: &Context, name: &str)
        -> Result<Option<AccountMetadata>>;

    /// Load the base64 encoded primary access key of account `name`.
    async fn provide_primary_key(&self, ctx: &Context, name: &str) -> Result<Option<String>>;
}
