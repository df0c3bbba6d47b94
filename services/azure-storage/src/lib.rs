//! Azure Storage client for SAP monitoring verification
//!
//! This crate talks to the storage account used by the SAP monitoring
//! extension of a virtual machine:
//! - Shared Key signing of blob and table requests
//! - Storage analytics (logging and minute metrics) reconciliation
//! - Waiting for telemetry rows written asynchronously by the extension
//! - Premium disk performance tier lookup
//!
//! # Example
//!
//! ```rust,no_run
//! use sapmon_azure_storage::{
//!     AccountCache, AnalyticsReconciler, Config, DefaultAccountProvider,
//!     EventualConsistencyPoller, StorageManagementClient, TableFilter,
//!     METRICS_TABLE_PREFIX,
//! };
//! use sapmon_core::{Context, OsEnv, Result};
//! use sapmon_http_send_reqwest::ReqwestHttpSend;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new()
//!         .with_http_send(ReqwestHttpSend::try_new()?)
//!         .with_env(OsEnv);
//!     let config = Config::default().from_env(&ctx)?;
//!
//!     let cache = AccountCache::new(DefaultAccountProvider::from_env(&ctx), &config);
//!     let account = cache.resolve(&ctx, "sapmonacct").await?;
//!
//!     let client = StorageManagementClient::new(ctx.clone(), &config);
//!     AnalyticsReconciler::new(client.clone())
//!         .ensure_enabled(&account)
//!         .await?;
//!
//!     let poller = EventualConsistencyPoller::new(client, config.poller_config());
//!     let filter = TableFilter::prefix(METRICS_TABLE_PREFIX, "PartitionKey ne ''");
//!     let outcome = poller.wait_for_row(&account, &filter).await?;
//!     println!("metrics visible: {}", outcome.matched);
//!
//!     Ok(())
//! }
//! ```

mod constants;

mod config;
pub use config::Config;

mod account;
pub use account::{AccountCache, AccountMetadata, StorageAccountRef};

mod endpoint;
pub use endpoint::{EndpointPattern, EndpointResolver, ENDPOINT_PATTERNS};

mod connection_string;
pub use connection_string::ConnectionString;

mod provide_account;
pub use provide_account::*;

mod sign_request;
pub use sign_request::{RequestSigner, SignedRequest, StorageService};

mod client;
pub use client::{Entity, StorageManagementClient};

mod analytics;
pub use analytics::{
    AnalyticsConfig, AnalyticsReconciler, Logging, Metrics, ReconcileOutcome, RetentionPolicy,
    StorageServiceProperties, BASELINE_RETENTION_DAYS,
};

mod table;
pub use table::{
    encode_partition_key, metrics_filter, performance_counters_filter, quote, reverse_ticks,
    TableFilter, METRICS_TABLE_PREFIX, PERFORMANCE_COUNTERS_TABLE,
};

mod poller;
pub use poller::{EventualConsistencyPoller, PollOutcome, PollerConfig};

mod disk;
pub use disk::{DiskSizer, PerformanceTier};

#[cfg(test)]
mod testing;
