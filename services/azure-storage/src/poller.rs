use std::time::Duration;

use log::{debug, warn};
use sapmon_core::{ErrorKind, Result};
use tokio::time::{sleep, Instant};

use crate::{StorageAccountRef, StorageManagementClient, TableFilter};

/// Timings of [`EventualConsistencyPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Total time to wait for a row, measured from the first attempt.
    pub timeout: Duration,
    /// Sleep between two attempts.
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Result of [`EventualConsistencyPoller::wait_for_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether a matching row showed up before the timeout.
    pub matched: bool,
    /// Time spent since the first attempt.
    pub elapsed: Duration,
}

/// EventualConsistencyPoller waits for telemetry rows to become visible.
///
/// Rows are written asynchronously by the monitoring extension, so a table or
/// a row missing right now only means "not yet".
#[derive(Debug, Clone)]
pub struct EventualConsistencyPoller {
    client: StorageManagementClient,
    config: PollerConfig,
}

impl EventualConsistencyPoller {
    /// Create a new poller.
    pub fn new(client: StorageManagementClient, config: PollerConfig) -> Self {
        Self { client, config }
    }

    /// Poll until a row matching `filter` exists or the timeout elapses.
    ///
    /// Transport, protocol and parse errors count as "no rows yet", and so does
    /// a discovered table whose name can't be put into a request. Any other
    /// error means the request can never succeed and is returned.
    pub async fn wait_for_row(
        &self,
        account: &StorageAccountRef,
        filter: &TableFilter,
    ) -> Result<PollOutcome> {
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.poll_once(account, filter).await {
                Ok(true) => {
                    debug!(
                        "row found in {} after {attempt} attempts",
                        filter.table_name_or_prefix
                    );
                    return Ok(PollOutcome {
                        matched: true,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(false) => debug!(
                    "no row in {} yet, attempt {attempt}",
                    filter.table_name_or_prefix
                ),
                Err(err) if err.is_transient() => {
                    warn!("polling {} failed, will retry: {err}", filter.table_name_or_prefix)
                }
                Err(err) => return Err(err),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(PollOutcome {
                    matched: false,
                    elapsed: now - start,
                });
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn poll_once(&self, account: &StorageAccountRef, filter: &TableFilter) -> Result<bool> {
        let tables = self.client.list_tables(account).await?;
        let Some(table) = filter.select_table(&tables) else {
            return Ok(false);
        };

        match self
            .client
            .query_entities(account, table, &filter.odata_filter_expression, Some(1))
            .await
        {
            Ok(rows) => Ok(!rows.is_empty()),
            Err(err) if err.kind() == ErrorKind::RequestInvalid => {
                warn!("table {table} can't be queried, treated as empty: {err}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
