//! [`HttpSend`] implementation backed by reqwest.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::redirect::Policy;
use reqwest::{Client, Request};
use sapmon_core::{Error, HttpSend, Result};

/// ReqwestHttpSend sends storage requests with a reqwest [`Client`].
///
/// The client built by [`ReqwestHttpSend::try_new`] never follows redirects
/// and never sends `Expect: 100-continue`.
#[derive(Debug)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend whose client doesn't follow redirects.
    ///
    /// Fails when the TLS backend can't be initialized.
    pub fn try_new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::unexpected("failed to build reqwest client").with_source(e))?;
        Ok(Self { client })
    }

    /// Create a new ReqwestHttpSend with a reqwest::Client.
    ///
    /// The caller is responsible for disabling redirects on a custom client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = Request::try_from(req)
            .map_err(|e| Error::request_invalid("failed to convert request").with_source(e))?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::transport("failed to send request").with_source(e))?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::transport("failed to read response body").with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }
}
