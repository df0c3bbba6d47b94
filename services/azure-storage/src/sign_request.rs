use std::fmt::Write;

use bytes::Bytes;
use http::header::*;
use http::{HeaderMap, HeaderValue, Method, Uri};
use log::debug;
use percent_encoding::percent_encode;
use sapmon_core::hash::{base64_decode, base64_hmac_sha256};
use sapmon_core::time::{format_http_date, now, DateTime};
use sapmon_core::{Result, SigningRequest};

use crate::constants::*;
use crate::{Config, StorageAccountRef};

/// Storage services this client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageService {
    /// Blob service, also serving the account's service properties.
    Blob,
    /// Table service, holding the telemetry rows.
    Table,
}

impl StorageService {
    /// Label used in the service host name.
    pub fn endpoint_name(&self) -> &'static str {
        match self {
            StorageService::Blob => "blob",
            StorageService::Table => "table",
        }
    }
}

/// A request carrying a Shared Key signature, ready to be sent.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request uri.
    pub uri: Uri,
    /// Headers including `x-ms-date`, `x-ms-version` and `Authorization`.
    pub headers: HeaderMap,
}

impl SignedRequest {
    /// The `Authorization` header value.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Turn into an http request carrying `body`.
    pub fn into_request(self, body: Bytes) -> Result<http::Request<Bytes>> {
        let mut req = http::Request::builder()
            .method(self.method)
            .uri(self.uri)
            .body(body)?;
        *req.headers_mut() = self.headers;
        Ok(req)
    }
}

/// RequestSigner implements Azure Storage Shared Key Authorization.
///
/// - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service_version: String,
    time: Option<DateTime>,
}

impl Default for RequestSigner {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_VERSION)
    }
}

impl RequestSigner {
    /// Create a new signer sending `service_version` as `x-ms-version`.
    pub fn new(service_version: impl Into<String>) -> Self {
        Self {
            service_version: service_version.into(),
            time: None,
        }
    }

    /// Create a signer using the configured service version.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.service_version())
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// The service version this signer sends.
    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    /// Sign a request for `path_and_query` on the account's `service` host.
    ///
    /// Query values in `path_and_query` must be percent encoded.
    pub fn sign(
        &self,
        account: &StorageAccountRef,
        method: Method,
        service: StorageService,
        path_and_query: &str,
        content_length: Option<u64>,
    ) -> Result<SignedRequest> {
        let key = base64_decode(&account.primary_key)?;

        let mut builder = http::Request::builder()
            .method(method)
            .uri(format!("https://{}{}", account.host(service), path_and_query))
            .header(X_MS_VERSION, self.service_version.as_str());
        if let Some(len) = content_length {
            builder = builder.header(CONTENT_LENGTH, len);
        }
        if service == StorageService::Table {
            builder = builder
                .header(ACCEPT, TABLE_ACCEPT)
                .header(DATA_SERVICE_VERSION, TABLE_DATA_SERVICE_VERSION)
                .header(MAX_DATA_SERVICE_VERSION, TABLE_DATA_SERVICE_VERSION);
        }
        let (mut parts, ()) = builder.body(())?.into_parts();

        let mut ctx = SigningRequest::build(&mut parts)?;
        let now_time = self.time.unwrap_or_else(now);
        ctx.headers
            .insert(X_MS_DATE, format_http_date(now_time).parse()?);

        let string_to_sign = match service {
            StorageService::Blob => string_to_sign(&ctx, &account.name, &self.service_version)?,
            StorageService::Table => table_string_to_sign(&ctx, &account.name)?,
        };
        let signature = base64_hmac_sha256(&key, string_to_sign.as_bytes());

        ctx.headers.insert(AUTHORIZATION, {
            let mut value: HeaderValue =
                format!("SharedKey {}:{signature}", account.name).parse()?;
            value.set_sensitive(true);

            value
        });

        for (_, v) in ctx.query.iter_mut() {
            *v = percent_encode(v.as_bytes(), &AZURE_QUERY_ENCODE_SET).to_string();
        }
        ctx.apply(&mut parts)?;

        Ok(SignedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
        })
    }
}

/// Construct string to sign for the blob service.
///
/// ## Format
///
/// ```text
/// VERB + "\n" +
/// Content-Encoding + "\n" +
/// Content-Language + "\n" +
/// Content-Length + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// If-Modified-Since + "\n" +
/// If-Match + "\n" +
/// If-None-Match + "\n" +
/// If-Unmodified-Since + "\n" +
/// Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource;
/// ```
///
/// ## Reference
///
/// - [Blob, Queue, and File Services (Shared Key authorization)](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
fn string_to_sign(ctx: &SigningRequest, account_name: &str, version: &str) -> Result<String> {
    let mut s = String::with_capacity(128);

    writeln!(&mut s, "{}", ctx.method.as_str())?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&CONTENT_ENCODING)?)?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&CONTENT_LANGUAGE)?)?;
    writeln!(
        &mut s,
        "{}",
        content_length_field(ctx.header_get_or_default(&CONTENT_LENGTH)?, version)
    )?;
    writeln!(
        &mut s,
        "{}",
        ctx.header_get_or_default(&HeaderName::from_static("content-md5"))?
    )?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&CONTENT_TYPE)?)?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&DATE)?)?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&IF_MODIFIED_SINCE)?)?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&IF_MATCH)?)?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&IF_NONE_MATCH)?)?;
    writeln!(
        &mut s,
        "{}",
        ctx.header_get_or_default(&IF_UNMODIFIED_SINCE)?
    )?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&RANGE)?)?;
    writeln!(&mut s, "{}", canonicalize_header(ctx)?)?;
    write!(&mut s, "{}", canonicalize_resource(ctx, account_name))?;

    debug!("string to sign: {}", &s);

    Ok(s)
}

/// Construct string to sign for the table service.
///
/// ```text
/// VERB + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// CanonicalizedResource;
/// ```
///
/// `Date` is the `x-ms-date` value, and only the `comp` query parameter is part
/// of the canonicalized resource.
///
/// ## Reference
///
/// - [Table service (Shared Key authorization)](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#table-service-shared-key-authorization)
fn table_string_to_sign(ctx: &SigningRequest, account_name: &str) -> Result<String> {
    let mut s = String::with_capacity(128);

    writeln!(&mut s, "{}", ctx.method.as_str())?;
    writeln!(
        &mut s,
        "{}",
        ctx.header_get_or_default(&HeaderName::from_static("content-md5"))?
    )?;
    writeln!(&mut s, "{}", ctx.header_get_or_default(&CONTENT_TYPE)?)?;
    writeln!(
        &mut s,
        "{}",
        ctx.header_get_or_default(&HeaderName::from_static(X_MS_DATE))?
    )?;
    write!(&mut s, "/{}{}", account_name, ctx.path)?;
    if let Some((_, comp)) = ctx.query.iter().find(|(k, _)| k.eq_ignore_ascii_case("comp")) {
        write!(&mut s, "?comp={comp}")?;
    }

    debug!("string to sign: {}", &s);

    Ok(s)
}

/// Zero lengths are only spelled out by service versions up to 2014-02-14.
fn content_length_field<'a>(value: &'a str, version: &str) -> &'a str {
    if value == "0" && version > LAST_VERSION_WITH_ZERO_CONTENT_LENGTH {
        ""
    } else {
        value
    }
}

/// ## Reference
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalize_header(ctx: &SigningRequest) -> Result<String> {
    Ok(SigningRequest::header_to_string(
        ctx.header_to_vec_with_prefix("x-ms-")?,
        ":",
        "\n",
    ))
}

/// ## Reference
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
fn canonicalize_resource(ctx: &SigningRequest, account_name: &str) -> String {
    if ctx.query.is_empty() {
        return format!("/{}{}", account_name, ctx.path);
    }

    let query = ctx
        .query
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    format!(
        "/{}{}\n{}",
        account_name,
        ctx.path,
        SigningRequest::query_to_string(query, ":", "\n")
    )
}
