//! End to end verification against an in-memory storage account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH};
use http::{Method, Request, Response, StatusCode};
use pretty_assertions::assert_eq;
use sapmon_azure_storage::{
    performance_counters_filter, AccountCache, AnalyticsReconciler, ArmAccountProvider, Config,
    DiskSizer, EventualConsistencyPoller, PerformanceTier, ReconcileOutcome,
    StorageManagementClient, TableFilter, PERFORMANCE_COUNTERS_TABLE,
};
use sapmon_core::{Context, HttpSend, Result};

const ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

#[derive(Debug, Default)]
struct State {
    properties: Option<String>,
    tables: Vec<String>,
    rows: HashMap<String, usize>,
    requests: Vec<(Method, String)>,
}

/// FakeAzure answers management, blob and table requests of account `sapmon`.
///
/// Performance counter rows appear after the table has been queried twice.
#[derive(Debug, Clone, Default)]
struct FakeAzure {
    state: Arc<Mutex<State>>,
}

impl FakeAzure {
    fn requests(&self, method: Method) -> usize {
        let state = self.state.lock().unwrap();
        state.requests.iter().filter(|(m, _)| *m == method).count()
    }

    fn handle(&self, req: &Request<Bytes>) -> Response<Bytes> {
        let mut state = self.state.lock().unwrap();
        let host = req.uri().host().unwrap_or_default().to_string();
        let path = req.uri().path().to_string();
        state.requests.push((req.method().clone(), format!("{host}{path}")));

        if host == "management.azure.com" {
            return if path.ends_with("/listKeys") {
                ok(format!(
                    r#"{{"keys":[{{"keyName":"key1","value":"{ACCOUNT_KEY}","permissions":"FULL"}}]}}"#
                ))
            } else {
                ok(r#"{"name":"sapmon","sku":{"name":"Premium_LRS"},"properties":{"primaryEndpoints":{"blob":"https://sapmon.blob.core.windows.net/","table":"https://sapmon.table.core.windows.net/"}}}"#.to_string())
            };
        }

        let authorization = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !authorization.starts_with("SharedKey sapmon:") {
            return status(StatusCode::FORBIDDEN, "AuthenticationFailed");
        }

        match (host.as_str(), req.method().as_str()) {
            ("sapmon.blob.core.windows.net", "GET") if path == "/" => ok(state
                .properties
                .clone()
                .unwrap_or_else(|| "<StorageServiceProperties />".to_string())),
            ("sapmon.blob.core.windows.net", "PUT") if path == "/" => {
                state.properties = Some(String::from_utf8_lossy(req.body()).into_owned());
                // The extension starts writing once analytics are on.
                state.tables.push(PERFORMANCE_COUNTERS_TABLE.to_string());
                status(StatusCode::ACCEPTED, "")
            }
            ("sapmon.blob.core.windows.net", "HEAD") => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_LENGTH, 512u64 * 1024 * 1024 * 1024)
                .body(Bytes::new())
                .unwrap(),
            ("sapmon.table.core.windows.net", "GET") if path == "/Tables" => {
                let tables: Vec<String> = state
                    .tables
                    .iter()
                    .map(|v| format!(r#"{{"TableName":"{v}"}}"#))
                    .collect();
                ok(format!(r#"{{"value":[{}]}}"#, tables.join(",")))
            }
            ("sapmon.table.core.windows.net", "GET") => {
                let seen = state.rows.entry(path).or_default();
                *seen += 1;
                if *seen > 2 {
                    ok(r#"{"value":[{"PartitionKey":"0","RowKey":"1","CounterName":"\\Memory\\Available Bytes"}]}"#.to_string())
                } else {
                    ok(r#"{"value":[]}"#.to_string())
                }
            }
            _ => status(StatusCode::NOT_FOUND, "ResourceNotFound"),
        }
    }
}

#[async_trait]
impl HttpSend for FakeAzure {
    async fn http_send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        Ok(self.handle(&req))
    }
}

fn ok(body: String) -> Response<Bytes> {
    status(StatusCode::OK, body)
}

fn status(code: StatusCode, body: impl Into<Bytes>) -> Response<Bytes> {
    Response::builder().status(code).body(body.into()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_verify_monitoring_storage() {
    let _ = env_logger::builder().is_test(true).try_init();

    let azure = FakeAzure::default();
    let ctx = Context::new().with_http_send(azure.clone());
    let config = Config::default()
        .with_poll_timeout(Duration::from_secs(60))
        .with_poll_interval(Duration::from_secs(5));

    let cache = AccountCache::new(
        ArmAccountProvider::new("sub", "rg").with_access_token("token"),
        &config,
    );
    let account = cache.resolve(&ctx, "sapmon").await.unwrap();
    assert_eq!(account.endpoint_suffix, "windows.net");
    assert!(account.is_premium());

    let client = StorageManagementClient::new(ctx.clone(), &config);

    // Analytics get switched on once.
    let reconciler = AnalyticsReconciler::new(client.clone());
    assert_eq!(
        reconciler.ensure_enabled(&account).await.unwrap(),
        ReconcileOutcome::Updated
    );
    assert_eq!(
        reconciler.ensure_enabled(&account).await.unwrap(),
        ReconcileOutcome::AlreadyCompliant
    );
    assert_eq!(azure.requests(Method::PUT), 1);

    // Rows show up on the third query.
    let since = chrono::Utc::now();
    let poller = EventualConsistencyPoller::new(client.clone(), config.poller_config());
    let filter = TableFilter::exact(
        PERFORMANCE_COUNTERS_TABLE,
        performance_counters_filter("dep-1", "sapvm", since),
    );
    let outcome = poller.wait_for_row(&account, &filter).await.unwrap();
    assert!(outcome.matched);
    assert_eq!(outcome.elapsed, Duration::from_secs(10));

    // Disk tiers come from the declared size or a blob probe.
    let sizer = DiskSizer::new(client);
    let probed = sizer
        .tier(
            &account,
            "https://sapmon.blob.core.windows.net/vhds/sapvm-data0.vhd",
            None,
        )
        .await
        .unwrap();
    assert_eq!(probed, PerformanceTier::P20);
    assert_eq!(azure.requests(Method::HEAD), 1);

    // A second lookup of the account stays in the cache.
    let management_calls = azure.requests(Method::GET) + azure.requests(Method::POST);
    let again = cache.resolve(&ctx, "sapmon").await.unwrap();
    assert!(Arc::ptr_eq(&account, &again));
    assert_eq!(
        azure.requests(Method::GET) + azure.requests(Method::POST),
        management_calls
    );
}
