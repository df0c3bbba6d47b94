//! Storage analytics (logging and metrics) reconciliation.

use log::{debug, info};
use quick_xml::{de, se};
use sapmon_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::{StorageAccountRef, StorageManagementClient};

/// Retention in days applied to logs and metrics by the baseline.
pub const BASELINE_RETENTION_DAYS: i32 = 13;

const ANALYTICS_VERSION: &str = "1.0";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// `StorageServiceProperties` document of the blob service.
///
/// Only analytics related elements are modeled. Elements left out of a PUT
/// (`Cors`, `DefaultServiceVersion`, ...) are kept unchanged by the service.
///
/// - [Set Blob Service Properties](https://learn.microsoft.com/en-us/rest/api/storageservices/set-blob-service-properties)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "StorageServiceProperties", rename_all = "PascalCase")]
pub struct StorageServiceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour_metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute_metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Logging {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metrics {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(
        rename = "IncludeAPIs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub include_apis: Option<bool>,
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetentionPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,
}

impl RetentionPolicy {
    fn days(days: i32) -> Self {
        Self {
            enabled: true,
            days: Some(days),
        }
    }
}

impl StorageServiceProperties {
    /// The baseline every monitored account must carry.
    pub fn baseline() -> Self {
        let metrics = Metrics {
            version: ANALYTICS_VERSION.to_string(),
            enabled: true,
            include_apis: Some(true),
            retention_policy: RetentionPolicy::days(BASELINE_RETENTION_DAYS),
        };

        Self {
            logging: Some(Logging {
                version: ANALYTICS_VERSION.to_string(),
                delete: true,
                read: true,
                write: true,
                retention_policy: RetentionPolicy::days(BASELINE_RETENTION_DAYS),
            }),
            hour_metrics: Some(metrics.clone()),
            minute_metrics: Some(metrics),
        }
    }

    /// Parse a service properties document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        de::from_str(xml)
            .map_err(|e| Error::parse("failed to parse storage service properties").with_source(e))
    }

    /// Render this document, including the XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let body = se::to_string(self).map_err(|e| {
            Error::unexpected("failed to serialize storage service properties").with_source(e)
        })?;
        Ok(format!("{XML_DECLARATION}{body}"))
    }
}

/// The analytics settings that decide compliance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsConfig {
    pub logging_read: bool,
    pub logging_write: bool,
    pub logging_delete: bool,
    pub minute_metrics_enabled: bool,
    pub minute_metrics_retention_enabled: bool,
    pub minute_metrics_retention_days: Option<i32>,
}

impl From<&StorageServiceProperties> for AnalyticsConfig {
    fn from(props: &StorageServiceProperties) -> Self {
        let logging = props.logging.clone().unwrap_or_default();
        let minute = props.minute_metrics.clone().unwrap_or_default();

        Self {
            logging_read: logging.read,
            logging_write: logging.write,
            logging_delete: logging.delete,
            minute_metrics_enabled: minute.enabled,
            minute_metrics_retention_enabled: minute.retention_policy.enabled,
            minute_metrics_retention_days: minute.retention_policy.days,
        }
    }
}

impl AnalyticsConfig {
    /// Parse the analytics settings out of a service properties document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(Self::from(&StorageServiceProperties::from_xml(xml)?))
    }

    /// Whether logging and minute metrics are set up for monitoring.
    ///
    /// Hour metrics are not inspected even though the baseline writes them.
    pub fn is_compliant(&self) -> bool {
        self.logging_read
            && self.logging_write
            && self.logging_delete
            && self.minute_metrics_enabled
            && self.minute_metrics_retention_enabled
            && self.minute_metrics_retention_days.is_some_and(|v| v >= 0)
    }

    /// The settings written by [`StorageServiceProperties::baseline`].
    pub fn desired() -> Self {
        Self::from(&StorageServiceProperties::baseline())
    }
}

/// Result of [`AnalyticsReconciler::ensure_enabled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The account was already compliant, nothing was written.
    AlreadyCompliant,
    /// The baseline was written.
    Updated,
}

/// AnalyticsReconciler brings an account's analytics settings to the baseline.
#[derive(Debug, Clone)]
pub struct AnalyticsReconciler {
    client: StorageManagementClient,
}

impl AnalyticsReconciler {
    /// Create a new reconciler.
    pub fn new(client: StorageManagementClient) -> Self {
        Self { client }
    }

    /// Ensure logging and metrics are enabled on `account`.
    ///
    /// Read and write failures are returned as is.
    pub async fn ensure_enabled(&self, account: &StorageAccountRef) -> Result<ReconcileOutcome> {
        let current = self.client.get_service_properties(account).await?;
        if current.is_compliant() {
            debug!("storage analytics of {} already enabled", account.name);
            return Ok(ReconcileOutcome::AlreadyCompliant);
        }

        info!(
            "enabling storage analytics of {}, current settings: {current:?}",
            account.name
        );
        let xml = StorageServiceProperties::baseline().to_xml()?;
        self.client.set_service_properties(account, xml).await?;

        Ok(ReconcileOutcome::Updated)
    }
}
