//! reqwest-backed implementation of [`Fetch`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::{Fetch, FetchError, Request, Response};

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile links while still failing a dead connection.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Network fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let response = self.client.get(request.url().clone()).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url(), status = status, bytes = body.len(), "Fetched");
        Ok(Response::new(status, content_type, body))
    }
}
