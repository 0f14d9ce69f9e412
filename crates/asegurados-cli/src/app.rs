//! Wiring between the configuration, the offline worker and the roster.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use asegurados_core::net::{Fetch, HttpFetcher};
use asegurados_core::offline::{
    CacheSettings, CacheStorage, DiskCacheStorage, OfflineCacheManager, OfflineWorker, Registration,
};
use asegurados_core::storage::FileKeyValueStore;
use asegurados_core::{Config, DatasetClient, RecordStore};

pub struct App {
    pub config: Config,
    pub cache_storage: Arc<dyn CacheStorage>,
    pub worker: OfflineWorker,
}

impl App {
    /// Build the network stack and start the offline worker. Nothing is
    /// fetched until the worker is registered or the roster is loaded.
    pub fn new(config: Config) -> Result<Self> {
        let network: Arc<dyn Fetch> = Arc::new(HttpFetcher::new()?);
        let cache_storage: Arc<dyn CacheStorage> =
            Arc::new(DiskCacheStorage::new(config.cache_dir()?)?);

        let settings = CacheSettings::new(config.generation(), config.base_url()?);
        let manager = OfflineCacheManager::new(settings, cache_storage.clone(), network)?;
        let worker = OfflineWorker::spawn(manager);

        Ok(Self {
            config,
            cache_storage,
            worker,
        })
    }

    /// Bring the offline cache up. Failure only costs offline support, so it
    /// is logged and the app carries on against the network.
    pub async fn register(&self) {
        match self.worker.register().await {
            Ok(Registration::Installed { purged }) => {
                info!(generation = %self.worker.generation(), purged = ?purged, "Offline cache installed")
            }
            Ok(registration) => debug!(registration = ?registration, "Offline cache ready"),
            Err(e) => warn!(error = %e, "Offline cache unavailable"),
        }
    }

    /// Load the roster, bootstrapping it from the bundled dataset through the
    /// offline worker when local storage is empty.
    pub async fn load_store(&self) -> Result<RecordStore> {
        let storage = Arc::new(FileKeyValueStore::new(self.config.data_dir()?)?);
        let dataset = DatasetClient::new(Arc::new(self.worker.clone()), self.config.dataset_url()?);
        RecordStore::load(storage, dataset)
            .await
            .context("Could not load the roster")
    }

    /// Let pending cache refreshes finish before the process exits.
    pub async fn shutdown(&self) {
        self.worker.settle().await;
    }
}
