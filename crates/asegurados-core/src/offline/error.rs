use thiserror::Error;

use super::CachePhase;
use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to fetch asset {url}: {source}")]
    AssetFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Asset {url} returned status {status}")]
    AssetStatus { url: String, status: u16 },

    #[error("Invalid asset path {path}: {source}")]
    InvalidAsset {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Cannot {action} while the worker is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: CachePhase,
    },

    #[error("Offline worker has shut down")]
    WorkerGone,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
