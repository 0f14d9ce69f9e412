//! Fetch boundary shared by the roster and the offline worker.
//!
//! `Fetch` is the single seam every outbound request crosses. `HttpFetcher`
//! talks to the network with reqwest; the offline worker implements the same
//! trait and wraps it, so the roster never knows whether an answer came from
//! the wire or from the cache.
//!
//! As with a browser fetch, only transport failure is an error. HTTP error
//! statuses come back as ordinary responses for the caller to inspect.

pub mod error;
pub mod fetch;
pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use error::FetchError;
pub use fetch::{Fetch, Request, Response};
pub use http::HttpFetcher;
