//! Derive the DNS suffix of a storage account from its published endpoints.

use http::Uri;
use log::warn;
use sapmon_core::{Error, Result};

use crate::AccountMetadata;

/// A `<scheme>://<host>.<service>.core.<suffix>/` endpoint pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPattern {
    scheme: &'static str,
    service: &'static str,
}

impl EndpointPattern {
    /// Create a pattern for the given scheme and service label.
    pub const fn new(scheme: &'static str, service: &'static str) -> Self {
        Self { scheme, service }
    }

    /// Match `endpoint` against this pattern and return the captured suffix.
    ///
    /// ```
    /// use sapmon_azure_storage::EndpointPattern;
    ///
    /// let pattern = EndpointPattern::new("https", "table");
    /// assert_eq!(
    ///     pattern.capture("https://acct.table.core.windows.net/").as_deref(),
    ///     Some("windows.net")
    /// );
    /// assert_eq!(pattern.capture("http://acct.table.core.windows.net/"), None);
    /// ```
    pub fn capture(&self, endpoint: &str) -> Option<String> {
        let uri: Uri = endpoint.trim().parse().ok()?;
        if !uri.scheme_str()?.eq_ignore_ascii_case(self.scheme) {
            return None;
        }
        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return None;
        }

        let host = uri.host()?;
        let marker = format!(".{}.core.", self.service);
        let (account, suffix) = host.split_once(&marker)?;
        if account.is_empty() || suffix.is_empty() {
            return None;
        }

        Some(suffix.to_string())
    }
}

/// Patterns in match priority order.
pub const ENDPOINT_PATTERNS: [EndpointPattern; 4] = [
    EndpointPattern::new("http", "table"),
    EndpointPattern::new("https", "table"),
    EndpointPattern::new("http", "blob"),
    EndpointPattern::new("https", "blob"),
];

/// EndpointResolver derives the REST DNS suffix for an account.
///
/// Sovereign clouds publish endpoints under their own suffix
/// (`chinacloudapi.cn`, `usgovcloudapi.net`, ...), so the suffix is read from
/// the account instead of being hard coded.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    default_suffix: String,
}

impl EndpointResolver {
    /// Create a resolver falling back to `default_suffix`.
    pub fn new(default_suffix: impl Into<String>) -> Self {
        Self {
            default_suffix: default_suffix.into(),
        }
    }

    /// Resolve the suffix, failing when no endpoint matches.
    pub fn try_resolve(&self, metadata: &AccountMetadata) -> Result<String> {
        for pattern in ENDPOINT_PATTERNS {
            let endpoint = match pattern.service {
                "table" => metadata.table_endpoint.as_deref(),
                _ => metadata.blob_endpoint.as_deref(),
            };
            if let Some(suffix) = endpoint.and_then(|v| pattern.capture(v)) {
                return Ok(suffix);
            }
        }

        Err(Error::resolution(format!(
            "no endpoint of storage account {} matches <scheme>://<host>.<service>.core.<suffix>/",
            metadata.name
        )))
    }

    /// Resolve the suffix, degrading to the default suffix with a warning.
    pub fn resolve(&self, metadata: &AccountMetadata) -> String {
        match self.try_resolve(metadata) {
            Ok(suffix) => suffix,
            Err(err) => {
                warn!("{err}, falling back to endpoint suffix {}", self.default_suffix);
                self.default_suffix.clone()
            }
        }
    }
}
