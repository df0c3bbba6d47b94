//! Test helpers shared by the unit tests.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use sapmon_core::{HttpSend, Result};

use crate::StorageAccountRef;

/// Azurite's well known development key.
pub(crate) const TEST_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

pub(crate) fn test_account() -> StorageAccountRef {
    StorageAccountRef::new("sapmonacct", TEST_ACCOUNT_KEY, "windows.net", "Standard_LRS")
}

pub(crate) fn respond(status: StatusCode, body: impl Into<Bytes>) -> http::Response<Bytes> {
    http::Response::builder()
        .status(status)
        .body(body.into())
        .unwrap()
}

type Responder = dyn Fn(&http::Request<Bytes>) -> Result<http::Response<Bytes>> + Send + Sync;

/// MockHttpSend records every request and answers with `responder`.
#[derive(Clone)]
pub(crate) struct MockHttpSend {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<http::Request<Bytes>>>>,
}

impl Debug for MockHttpSend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpSend")
            .field("requests", &self.count())
            .finish()
    }
}

impl MockHttpSend {
    pub(crate) fn new(
        responder: impl Fn(&http::Request<Bytes>) -> http::Response<Bytes> + Send + Sync + 'static,
    ) -> Self {
        Self::fallible(move |req| Ok(responder(req)))
    }

    pub(crate) fn fallible(
        responder: impl Fn(&http::Request<Bytes>) -> Result<http::Response<Bytes>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn count_where(&self, f: impl Fn(&http::Request<Bytes>) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| f(r)).count()
    }

    pub(crate) fn last(&self) -> Option<http::Request<Bytes>> {
        self.requests.lock().unwrap().last().map(|req| {
            let mut copy = http::Request::new(req.body().clone());
            *copy.method_mut() = req.method().clone();
            *copy.uri_mut() = req.uri().clone();
            *copy.headers_mut() = req.headers().clone();
            copy
        })
    }
}

#[async_trait]
impl HttpSend for MockHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let resp = (self.responder)(&req);
        self.requests.lock().unwrap().push(req);
        resp
    }
}
