use std::collections::HashMap;

use sapmon_core::{Error, Result};

use crate::{AccountMetadata, StorageService};

/// A parsed [Azure storage connection string][1].
///
/// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionString {
    key_values: HashMap<String, String>,
}

impl ConnectionString {
    /// Parse `conn_str`.
    pub fn parse(conn_str: &str) -> Result<Self> {
        Ok(Self {
            key_values: parse_into_key_values(conn_str)?,
        })
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    /// The `AccountName` field.
    pub fn account_name(&self) -> Option<&str> {
        self.get("AccountName")
    }

    /// The `AccountKey` field.
    pub fn account_key(&self) -> Option<&str> {
        self.get("AccountKey")
    }

    /// Endpoint of `service`, either given explicitly or built from
    /// `DefaultEndpointsProtocol`, `AccountName` and `EndpointSuffix`.
    pub fn endpoint(&self, service: StorageService) -> Result<Option<String>> {
        let key = match service {
            StorageService::Blob => "BlobEndpoint",
            StorageService::Table => "TableEndpoint",
        };
        if let Some(endpoint) = self.get(key) {
            return Ok(Some(endpoint.to_string()));
        }

        let (account_name, endpoint_suffix) =
            match (self.account_name(), self.get("EndpointSuffix")) {
                (Some(name), Some(suffix)) => (name, suffix),
                // Can't build an endpoint if one of them is missing
                _ => return Ok(None),
            };

        let protocol = self.get("DefaultEndpointsProtocol").unwrap_or("https");
        if protocol != "http" && protocol != "https" {
            return Err(Error::config_invalid(format!(
                "invalid DefaultEndpointsProtocol: {protocol}"
            )));
        }

        // EndpointSuffix is usually given as `core.windows.net`.
        let endpoint_suffix = endpoint_suffix
            .strip_prefix("core.")
            .unwrap_or(endpoint_suffix);
        Ok(Some(format!(
            "{protocol}://{account_name}.{}.core.{endpoint_suffix}/",
            service.endpoint_name()
        )))
    }

    /// Account metadata described by this connection string.
    pub fn metadata(&self) -> Result<AccountMetadata> {
        let name = self.account_name().ok_or_else(|| {
            Error::config_invalid("connection string has no AccountName")
        })?;

        Ok(AccountMetadata {
            name: name.to_string(),
            account_type: String::new(),
            table_endpoint: self.endpoint(StorageService::Table)?,
            blob_endpoint: self.endpoint(StorageService::Blob)?,
        })
    }
}

fn parse_into_key_values(conn_str: &str) -> Result<HashMap<String, String>> {
    conn_str
        .trim()
        .replace('\n', "")
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| -> Result<(String, String)> {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                Error::config_invalid(format!(
                    "invalid connection string, expected '=' in field: {field}"
                ))
            })?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}
