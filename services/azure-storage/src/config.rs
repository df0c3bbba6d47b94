use std::time::Duration;

use log::warn;
use sapmon_core::{Context, Error, Result};

use crate::constants::*;
use crate::PollerConfig;

/// Config carries the tunables shared by every storage component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// `endpoint_suffix` is used when an account's endpoints don't match the
    /// expected pattern. It will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_ENDPOINT_SUFFIX`]
    /// - default: `windows.net`
    pub endpoint_suffix: Option<String>,
    /// `service_version` is sent as `x-ms-version`. It will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_SERVICE_VERSION`]
    /// - default: `2014-02-14`
    pub service_version: Option<String>,
    /// How long to wait for telemetry rows to appear.
    ///
    /// - env value: [`SAPMON_POLL_TIMEOUT_SECS`]
    /// - default: 5 minutes
    pub poll_timeout: Option<Duration>,
    /// How long to sleep between two table queries.
    ///
    /// - env value: [`SAPMON_POLL_INTERVAL_SECS`]
    /// - default: 5 seconds
    pub poll_interval: Option<Duration>,
}

impl Config {
    /// Load config from env.
    ///
    /// Values already set on the config take precedence.
    pub fn from_env(mut self, ctx: &Context) -> Result<Self> {
        let envs = ctx.env_vars();

        if self.endpoint_suffix.is_none() {
            self.endpoint_suffix = envs
                .get(AZURE_STORAGE_ENDPOINT_SUFFIX)
                .filter(|v| !v.is_empty())
                .cloned();
        }

        if self.service_version.is_none() {
            self.service_version = envs
                .get(AZURE_STORAGE_SERVICE_VERSION)
                .filter(|v| !v.is_empty())
                .cloned();
        }

        if self.poll_timeout.is_none() {
            if let Some(v) = envs.get(SAPMON_POLL_TIMEOUT_SECS) {
                self.poll_timeout = Some(parse_secs(SAPMON_POLL_TIMEOUT_SECS, v)?);
            }
        }

        if self.poll_interval.is_none() {
            if let Some(v) = envs.get(SAPMON_POLL_INTERVAL_SECS) {
                self.poll_interval = Some(parse_secs(SAPMON_POLL_INTERVAL_SECS, v)?);
            }
        }

        Ok(self)
    }

    /// Set the default endpoint suffix.
    pub fn with_endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = Some(suffix.into());
        self
    }

    /// Set the storage service version.
    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Endpoint suffix to fall back to.
    pub fn endpoint_suffix(&self) -> &str {
        self.endpoint_suffix
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
    }

    /// Storage service version to sign requests with.
    pub fn service_version(&self) -> &str {
        self.service_version
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_VERSION)
    }

    /// Poller timings derived from this config.
    pub fn poller_config(&self) -> PollerConfig {
        let default = PollerConfig::default();
        let config = PollerConfig {
            timeout: self.poll_timeout.unwrap_or(default.timeout),
            poll_interval: self.poll_interval.unwrap_or(default.poll_interval),
        };

        if config.poll_interval.is_zero() {
            warn!("poll interval is zero, table queries will be issued back to back");
        }
        config
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| {
            Error::config_invalid(format!("{key} must be a number of seconds, got {value:?}"))
                .with_source(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapmon_core::{ErrorKind, StaticEnv};
    use std::collections::HashMap;

    fn ctx(envs: &[(&str, &str)]) -> Context {
        Context::new().with_env(StaticEnv {
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    #[test]
    fn test_defaults() {
        let config = Config::default().from_env(&ctx(&[])).unwrap();

        assert_eq!(config.endpoint_suffix(), "windows.net");
        assert_eq!(config.service_version(), "2014-02-14");
        assert_eq!(config.poller_config(), PollerConfig::default());
    }

    #[test]
    fn test_from_env() {
        let config = Config::default()
            .from_env(&ctx(&[
                (AZURE_STORAGE_ENDPOINT_SUFFIX, "chinacloudapi.cn"),
                (SAPMON_POLL_TIMEOUT_SECS, "60"),
                (SAPMON_POLL_INTERVAL_SECS, "2"),
            ]))
            .unwrap();

        assert_eq!(config.endpoint_suffix(), "chinacloudapi.cn");
        let poller = config.poller_config();
        assert_eq!(poller.timeout, Duration::from_secs(60));
        assert_eq!(poller.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_explicit_values_win() {
        let config = Config::default()
            .with_endpoint_suffix("usgovcloudapi.net")
            .from_env(&ctx(&[(AZURE_STORAGE_ENDPOINT_SUFFIX, "chinacloudapi.cn")]))
            .unwrap();

        assert_eq!(config.endpoint_suffix(), "usgovcloudapi.net");
    }

    #[test]
    fn test_invalid_timeout() {
        let err = Config::default()
            .from_env(&ctx(&[(SAPMON_POLL_TIMEOUT_SECS, "five minutes")]))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
