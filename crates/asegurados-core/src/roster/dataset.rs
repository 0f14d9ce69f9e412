//! Access to the bundled dataset (`data.json`).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;
use url::Url;

use super::RosterError;
use crate::import::{self, ImportFormat};
use crate::models::Person;
use crate::net::{Fetch, FetchError, Request};

/// Query parameter used when bootstrapping an empty store.
const BOOTSTRAP_PARAM: &str = "v";

/// Query parameter used when the user asks to restore the bundled roster.
const RESET_PARAM: &str = "reset";

/// Fetches the bundled dataset. Every request carries a distinct
/// cache-defeating query value so intermediate HTTP caches never answer it.
pub struct DatasetClient {
    fetcher: Arc<dyn Fetch>,
    url: Url,
    last_stamp: AtomicI64,
}

impl DatasetClient {
    pub fn new(fetcher: Arc<dyn Fetch>, url: Url) -> Self {
        Self {
            fetcher,
            url,
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Millisecond timestamp, bumped when two calls land in the same millisecond.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }

    fn cache_busted(&self, param: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair(param, &self.next_stamp().to_string());
        url
    }

    /// Dataset used to bootstrap an empty store.
    pub async fn fetch_bundled(&self) -> Result<Vec<Person>> {
        self.fetch_with(BOOTSTRAP_PARAM).await
    }

    /// Dataset used to reset the store. Must be a non-empty array.
    pub async fn fetch_fresh(&self) -> Result<Vec<Person>> {
        let records = self.fetch_with(RESET_PARAM).await?;
        if records.is_empty() {
            return Err(RosterError::EmptyDataset.into());
        }
        Ok(records)
    }

    async fn fetch_with(&self, param: &str) -> Result<Vec<Person>> {
        let url = self.cache_busted(param);
        debug!(url = %url, "Fetching bundled dataset");

        let response = self
            .fetcher
            .fetch(Request::get(url.clone()))
            .await
            .with_context(|| format!("Failed to fetch bundled dataset from {}", self.url))?;

        if !response.is_success() {
            return Err(FetchError::from_status(url.as_str(), response.status, &response.text()).into());
        }

        let records = import::parse(&response.text(), ImportFormat::Json)
            .context("Failed to parse bundled dataset")?;
        debug!(count = records.len(), "Bundled dataset parsed");
        Ok(records)
    }
}
