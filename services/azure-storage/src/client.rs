use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Method, Response, Uri};
use log::{debug, warn};
use percent_encoding::utf8_percent_encode;
use sapmon_core::{Context, Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::constants::*;
use crate::{AnalyticsConfig, Config, RequestSigner, StorageAccountRef, StorageService};

/// One row returned by a table query.
pub type Entity = Map<String, Value>;

/// StorageManagementClient issues signed requests against a storage account's
/// blob and table services.
///
/// Calls are sequential: every method awaits its HTTP exchange before
/// returning, and nothing is retried.
#[derive(Debug, Clone)]
pub struct StorageManagementClient {
    ctx: Context,
    signer: RequestSigner,
}

impl StorageManagementClient {
    /// Create a new client sending through `ctx`.
    pub fn new(ctx: Context, config: &Config) -> Self {
        Self {
            ctx,
            signer: RequestSigner::from_config(config),
        }
    }

    /// Replace the request signer.
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = signer;
        self
    }

    /// The context requests are sent through.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    async fn send(
        &self,
        account: &StorageAccountRef,
        method: Method,
        service: StorageService,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>> {
        let content_length = body.as_ref().map(|v| v.len() as u64);
        let req = self
            .signer
            .sign(account, method, service, path_and_query, content_length)?
            .into_request(body.unwrap_or_default())?;
        debug!("sending {} {}", req.method(), req.uri());

        let resp = self.ctx.http_send(req).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = String::from_utf8_lossy(resp.body()).into_owned();
            debug!("{} responded with {status}: {body}", account.name);
            return Err(Error::protocol(status, body).with_context(format!(
                "account: {}, resource: {path_and_query}",
                account.name
            )));
        }

        Ok(resp)
    }

    /// Read the blob service properties of `account`.
    pub async fn get_service_properties(
        &self,
        account: &StorageAccountRef,
    ) -> Result<AnalyticsConfig> {
        let resp = self
            .send(
                account,
                Method::GET,
                StorageService::Blob,
                SERVICE_PROPERTIES_PATH,
                None,
            )
            .await?;

        let body = String::from_utf8_lossy(resp.body());
        AnalyticsConfig::from_xml(body.trim_start_matches('\u{feff}'))
    }

    /// Replace the blob service properties of `account` with `xml`.
    pub async fn set_service_properties(
        &self,
        account: &StorageAccountRef,
        xml: String,
    ) -> Result<()> {
        self.send(
            account,
            Method::PUT,
            StorageService::Blob,
            SERVICE_PROPERTIES_PATH,
            Some(Bytes::from(xml)),
        )
        .await?;

        Ok(())
    }

    /// Return the size in bytes of the blob at `blob_uri`.
    ///
    /// `blob_uri` must point at this account's blob service, for example
    /// `https://acct.blob.core.windows.net/vhds/osdisk.vhd`.
    pub async fn head_blob(&self, account: &StorageAccountRef, blob_uri: &str) -> Result<u64> {
        let uri: Uri = blob_uri.parse()?;
        let host = account.host(StorageService::Blob);
        if !uri
            .host()
            .is_some_and(|v| v.eq_ignore_ascii_case(&host))
        {
            return Err(Error::request_invalid(format!(
                "blob {blob_uri} is not served by {host}"
            )));
        }
        let path_and_query = uri.path_and_query().map(|v| v.as_str()).unwrap_or("/");

        let resp = self
            .send(
                account,
                Method::HEAD,
                StorageService::Blob,
                path_and_query,
                None,
            )
            .await?;

        let length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .ok_or_else(|| Error::parse(format!("HEAD {blob_uri} returned no Content-Length")))?
            .to_str()?;
        length.parse::<u64>().map_err(|e| {
            Error::parse(format!("invalid Content-Length {length:?} for {blob_uri}")).with_source(e)
        })
    }

    /// List all table names of `account`, following continuation tokens.
    pub async fn list_tables(&self, account: &StorageAccountRef) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let path = match &next {
                None => "/Tables".to_string(),
                Some(token) => format!(
                    "/Tables?NextTableName={}",
                    utf8_percent_encode(token, &AZURE_QUERY_ENCODE_SET)
                ),
            };
            let resp = self
                .send(account, Method::GET, StorageService::Table, &path, None)
                .await?;

            let page: TablesPage = serde_json::from_slice(resp.body()).map_err(|e| {
                Error::parse("failed to parse list tables response").with_source(e)
            })?;
            tables.extend(page.value.into_iter().map(|v| v.table_name));

            let token = continuation(&resp, X_MS_CONTINUATION_NEXT_TABLE_NAME)?;
            if token.is_none() {
                break;
            }
            if token == next {
                warn!(
                    "list tables of {} returned the same continuation {token:?} twice, stopped",
                    account.name
                );
                break;
            }
            next = token;
            debug!("list tables of {} continues at {next:?}", account.name);
        }

        Ok(tables)
    }

    /// Whether `table` exists in `account`.
    pub async fn table_exists(&self, account: &StorageAccountRef, table: &str) -> Result<bool> {
        Ok(self
            .list_tables(account)
            .await?
            .iter()
            .any(|v| v == table))
    }

    /// Query `table` with an OData `filter`, returning at most `top` rows.
    ///
    /// A range scan may answer with an empty page and a continuation token
    /// while matching rows sit further on. Such pages are followed until one
    /// holds rows or the service stops handing out tokens.
    pub async fn query_entities(
        &self,
        account: &StorageAccountRef,
        table: &str,
        filter: &str,
        top: Option<u32>,
    ) -> Result<Vec<Entity>> {
        let mut base = format!(
            "/{table}()?$filter={}",
            utf8_percent_encode(filter, &AZURE_QUERY_ENCODE_SET)
        );
        if let Some(top) = top {
            base.push_str(&format!("&$top={top}"));
        }

        let mut next: Option<(String, Option<String>)> = None;
        loop {
            let mut path = base.clone();
            if let Some((partition_key, row_key)) = &next {
                path.push_str(&format!(
                    "&NextPartitionKey={}",
                    utf8_percent_encode(partition_key, &AZURE_QUERY_ENCODE_SET)
                ));
                if let Some(row_key) = row_key {
                    path.push_str(&format!(
                        "&NextRowKey={}",
                        utf8_percent_encode(row_key, &AZURE_QUERY_ENCODE_SET)
                    ));
                }
            }

            let resp = self
                .send(account, Method::GET, StorageService::Table, &path, None)
                .await?;

            let page: EntitiesPage = serde_json::from_slice(resp.body()).map_err(|e| {
                Error::parse(format!("failed to parse entities of table {table}")).with_source(e)
            })?;
            if !page.value.is_empty() {
                return Ok(page.value);
            }

            let Some(partition_key) = continuation(&resp, X_MS_CONTINUATION_NEXT_PARTITION_KEY)?
            else {
                return Ok(page.value);
            };
            let token = Some((
                partition_key,
                continuation(&resp, X_MS_CONTINUATION_NEXT_ROW_KEY)?,
            ));
            if token == next {
                warn!("query of {table} returned the same continuation {token:?} twice, stopped");
                return Ok(page.value);
            }
            next = token;
            debug!("query of {table} continues at {next:?}");
        }
    }
}

/// Read a non-empty continuation header of `resp`.
fn continuation(resp: &Response<Bytes>, name: &str) -> Result<Option<String>> {
    Ok(resp
        .headers()
        .get(name)
        .map(|v| v.to_str())
        .transpose()?
        .filter(|v| !v.is_empty())
        .map(str::to_string))
}

#[derive(Deserialize)]
struct TablesPage {
    #[serde(default)]
    value: Vec<TableEntry>,
}

#[derive(Deserialize)]
struct TableEntry {
    #[serde(rename = "TableName")]
    table_name: String,
}

#[derive(Deserialize)]
struct EntitiesPage {
    #[serde(default)]
    value: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{respond, test_account, MockHttpSend};
    use chrono::TimeZone;
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use sapmon_core::ErrorKind;

    fn client(mock: &MockHttpSend) -> StorageManagementClient {
        let signer = RequestSigner::default()
            .with_time(chrono::Utc.with_ymd_and_hms(2022, 3, 1, 8, 12, 34).unwrap());
        StorageManagementClient::new(
            Context::new().with_http_send(mock.clone()),
            &Config::default(),
        )
        .with_signer(signer)
    }

    #[tokio::test]
    async fn test_get_service_properties_strips_bom() {
        let mock = MockHttpSend::new(|_| {
            respond(
                StatusCode::OK,
                "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><StorageServiceProperties><Logging><Version>1.0</Version><Delete>true</Delete><Read>true</Read><Write>true</Write><RetentionPolicy><Enabled>false</Enabled></RetentionPolicy></Logging></StorageServiceProperties>",
            )
        });

        let config = client(&mock)
            .get_service_properties(&test_account())
            .await
            .unwrap();
        assert!(config.logging_read && config.logging_write && config.logging_delete);
        assert!(!config.minute_metrics_enabled);

        let req = mock.last().unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(
            req.uri(),
            "https://sapmonacct.blob.core.windows.net/?restype=service&comp=properties"
        );
    }

    #[tokio::test]
    async fn test_set_service_properties_sends_length() {
        let mock = MockHttpSend::new(|_| respond(StatusCode::ACCEPTED, ""));

        client(&mock)
            .set_service_properties(&test_account(), "<StorageServiceProperties/>".to_string())
            .await
            .unwrap();

        let req = mock.last().unwrap();
        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.headers()[CONTENT_LENGTH], "27");
        assert_eq!(req.body().as_ref(), b"<StorageServiceProperties/>");
    }

    #[tokio::test]
    async fn test_protocol_error_carries_body() {
        let mock = MockHttpSend::new(|_| {
            respond(StatusCode::FORBIDDEN, "<Error><Code>AuthenticationFailed</Code></Error>")
        });

        let err = client(&mock)
            .get_service_properties(&test_account())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("403"));
        assert_eq!(
            err.response_body(),
            Some("<Error><Code>AuthenticationFailed</Code></Error>")
        );
    }

    #[tokio::test]
    async fn test_head_blob() {
        let mock = MockHttpSend::new(|_| {
            http::Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_LENGTH, "137438953984")
                .body(Bytes::new())
                .unwrap()
        });

        let size = client(&mock)
            .head_blob(
                &test_account(),
                "https://sapmonacct.blob.core.windows.net/vhds/osdisk.vhd",
            )
            .await
            .unwrap();
        assert_eq!(size, 137_438_953_984);

        let req = mock.last().unwrap();
        assert_eq!(req.method(), Method::HEAD);
        assert_eq!(
            req.headers()["authorization"],
            "SharedKey sapmonacct:mEEJ6o0exkicMtkLgdR0Pt+3uEZYapHaMLSUbiHOAyA="
        );
    }

    #[tokio::test]
    async fn test_head_blob_of_other_account() {
        let mock = MockHttpSend::new(|_| respond(StatusCode::OK, ""));

        let err = client(&mock)
            .head_blob(&test_account(), "https://other.blob.core.windows.net/vhds/a.vhd")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
        assert_eq!(mock.count(), 0);
    }

    #[tokio::test]
    async fn test_list_tables_follows_continuation() {
        let mock = MockHttpSend::new(|req| {
            if req.uri().query().is_none() {
                http::Response::builder()
                    .status(StatusCode::OK)
                    .header(X_MS_CONTINUATION_NEXT_TABLE_NAME, "1!48!V0FETWV0cmljcw--")
                    .body(Bytes::from(r#"{"value":[{"TableName":"SchemasTable"}]}"#))
                    .unwrap()
            } else {
                respond(
                    StatusCode::OK,
                    r#"{"value":[{"TableName":"WADMetricsPT1MP10DV2S20220301"},{"TableName":"WADPerformanceCountersTable"}]}"#,
                )
            }
        });

        let tables = client(&mock).list_tables(&test_account()).await.unwrap();
        assert_eq!(
            tables,
            vec![
                "SchemasTable",
                "WADMetricsPT1MP10DV2S20220301",
                "WADPerformanceCountersTable"
            ]
        );
        assert_eq!(mock.count(), 2);
        assert_eq!(
            mock.last().unwrap().uri().query(),
            Some("NextTableName=1%2148%21V0FETWV0cmljcw--")
        );
    }

    #[tokio::test]
    async fn test_list_tables_stops_on_repeated_continuation() {
        let mock = MockHttpSend::new(|_| {
            http::Response::builder()
                .status(StatusCode::OK)
                .header(X_MS_CONTINUATION_NEXT_TABLE_NAME, "1!8!U2NoZW1h")
                .body(Bytes::from(r#"{"value":[]}"#))
                .unwrap()
        });

        let tables = client(&mock).list_tables(&test_account()).await.unwrap();
        assert!(tables.is_empty());
        assert_eq!(mock.count(), 2);
    }

    #[tokio::test]
    async fn test_table_exists() {
        let mock = MockHttpSend::new(|_| {
            respond(
                StatusCode::OK,
                r#"{"value":[{"TableName":"WADPerformanceCountersTable"}]}"#,
            )
        });
        let client = client(&mock);

        assert!(client
            .table_exists(&test_account(), "WADPerformanceCountersTable")
            .await
            .unwrap());
        assert!(!client
            .table_exists(&test_account(), "WADPerformanceCounters")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_query_entities_follows_empty_pages() {
        let mock = MockHttpSend::new(|req| {
            if req.uri().query().is_some_and(|v| v.contains("NextPartitionKey")) {
                respond(StatusCode::OK, r#"{"value":[{"PartitionKey":"0637817191540000001"}]}"#)
            } else {
                http::Response::builder()
                    .status(StatusCode::OK)
                    .header(X_MS_CONTINUATION_NEXT_PARTITION_KEY, "1!28!MDYzNzgx")
                    .header(X_MS_CONTINUATION_NEXT_ROW_KEY, "1!4!cjE-")
                    .body(Bytes::from(r#"{"value":[]}"#))
                    .unwrap()
            }
        });

        let rows = client(&mock)
            .query_entities(
                &test_account(),
                "WADPerformanceCountersTable",
                "PartitionKey gt '0'",
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(mock.count(), 2);
        assert_eq!(
            mock.last().unwrap().uri().query(),
            Some("$filter=PartitionKey%20gt%20%270%27&$top=1&NextPartitionKey=1%2128%21MDYzNzgx&NextRowKey=1%214%21cjE-")
        );
    }

    #[tokio::test]
    async fn test_query_entities_stops_on_repeated_continuation() {
        let mock = MockHttpSend::new(|_| {
            http::Response::builder()
                .status(StatusCode::OK)
                .header(X_MS_CONTINUATION_NEXT_PARTITION_KEY, "1!28!MDYzNzgx")
                .body(Bytes::from(r#"{"value":[]}"#))
                .unwrap()
        });

        let rows = client(&mock)
            .query_entities(&test_account(), "T", "PartitionKey gt '0'", Some(1))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(mock.count(), 2);
    }

    #[tokio::test]
    async fn test_query_entities() {
        let mock = MockHttpSend::new(|_| {
            respond(
                StatusCode::OK,
                r#"{"value":[{"PartitionKey":"p","RowKey":"r","Average":1.5}]}"#,
            )
        });

        let rows = client(&mock)
            .query_entities(
                &test_account(),
                "WADPerformanceCountersTable",
                "Role eq 'IaaS'",
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["RowKey"], "r");

        let req = mock.last().unwrap();
        assert_eq!(
            req.uri(),
            "https://sapmonacct.table.core.windows.net/WADPerformanceCountersTable()?$filter=Role%20eq%20%27IaaS%27&$top=1"
        );
        assert_eq!(req.headers()["accept"], TABLE_ACCEPT);
    }

    #[tokio::test]
    async fn test_query_entities_malformed_body() {
        let mock = MockHttpSend::new(|_| respond(StatusCode::OK, "<html/>"));

        let err = client(&mock)
            .query_entities(&test_account(), "T", "RowKey eq 'a'", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
