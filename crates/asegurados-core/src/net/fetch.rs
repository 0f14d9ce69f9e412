use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use super::FetchError;

/// An outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(url: &str) -> Result<Self, FetchError> {
        Ok(Self::get(Url::parse(url)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Key used to store and look up this request in a cache store.
    /// The fragment never reaches the server, so it is not part of the key.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    /// Same request with query and fragment removed.
    pub fn without_query(&self) -> Self {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        Self { url }
    }

    /// True when both requests point at the same resource, ignoring query and fragment.
    pub fn same_resource(&self, other: &Request) -> bool {
        self.without_query().url == other.without_query().url
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GET {}", self.url)
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// A 200 response with the given body.
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, Some(content_type.to_string()), body.into())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Anything that can answer a request: the network itself or a layer in front of it.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;
}
