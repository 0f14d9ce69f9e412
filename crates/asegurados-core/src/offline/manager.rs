use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::{Cache, CacheStorage};
use super::CacheError;
use crate::net::{Fetch, FetchError, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Generation tag of the current offline cache.
/// Bump it whenever the precached assets change; activation drops every other generation.
pub const DEFAULT_GENERATION: &str = "asegurados-cache-v1";

/// App shell, bundled dataset and icons, relative to the app scope.
pub const PRECACHE_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./style.css",
    "./app.js",
    "./manifest.webmanifest",
    "./data.json",
    "./icons/icon-192.png",
    "./icons/icon-512.png",
];

/// The bundled dataset, relative to the app scope.
pub const DATASET_PATH: &str = "./data.json";

/// Lifecycle of one cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePhase {
    /// Created, nothing installed yet.
    Parsed,
    Installing,
    Installed,
    Activating,
    /// Intercepting fetches.
    Activated,
    /// Install failed; fetches go straight to the network.
    Redundant,
}

impl std::fmt::Display for CachePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CachePhase::Parsed => "parsed",
            CachePhase::Installing => "installing",
            CachePhase::Installed => "installed",
            CachePhase::Activating => "activating",
            CachePhase::Activated => "activated",
            CachePhase::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub generation: String,
    /// Base URL every asset path is resolved against.
    pub scope: Url,
    pub assets: Vec<String>,
    pub dataset_path: String,
}

impl CacheSettings {
    pub fn new(generation: impl Into<String>, scope: Url) -> Self {
        Self {
            generation: generation.into(),
            scope,
            assets: PRECACHE_ASSETS.iter().map(|s| s.to_string()).collect(),
            dataset_path: DATASET_PATH.to_string(),
        }
    }
}

/// How a registration reached the activated phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Assets were downloaded into a new generation; `purged` lists the dropped generations.
    Installed { purged: Vec<String> },
    /// The generation was already on disk from an earlier session.
    Resumed { purged: Vec<String> },
    AlreadyActive,
}

/// Install / activate / fetch lifecycle for one cache generation.
pub struct OfflineCacheManager {
    generation: String,
    assets: Vec<Request>,
    dataset: Request,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetch>,
    phase: watch::Sender<CachePhase>,
    refreshes: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineCacheManager {
    pub fn new(
        settings: CacheSettings,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetch>,
    ) -> Result<Self, CacheError> {
        let resolve = |path: &str| {
            settings
                .scope
                .join(path)
                .map(Request::get)
                .map_err(|source| CacheError::InvalidAsset {
                    path: path.to_string(),
                    source,
                })
        };

        let assets = settings
            .assets
            .iter()
            .map(|path| resolve(path.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let dataset = resolve(settings.dataset_path.as_str())?.without_query();
        let (phase, _) = watch::channel(CachePhase::Parsed);

        Ok(Self {
            generation: settings.generation,
            assets,
            dataset,
            storage,
            network,
            phase,
            refreshes: Mutex::new(Vec::new()),
        })
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn phase(&self) -> CachePhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CachePhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: CachePhase) {
        debug!(generation = %self.generation, phase = %phase, "Cache phase");
        self.phase.send_replace(phase);
    }

    fn current_cache(&self) -> Result<Cache, CacheError> {
        Cache::open(self.storage.clone(), &self.generation)
    }

    /// Download every precached asset into this generation's store.
    ///
    /// Any failed asset fails the whole install: the generation becomes
    /// redundant, a store created by this attempt is removed, and activation
    /// is refused.
    pub async fn install(&self) -> Result<(), CacheError> {
        let phase = self.phase();
        if !matches!(phase, CachePhase::Parsed | CachePhase::Redundant) {
            return Err(CacheError::InvalidPhase {
                action: "install",
                phase,
            });
        }
        let existed = self.storage.has(&self.generation)?;
        self.set_phase(CachePhase::Installing);

        let result = match self.current_cache() {
            Ok(cache) => cache.add_all(self.network.as_ref(), &self.assets).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(generation = %self.generation, assets = self.assets.len(), "Offline cache installed");
                self.set_phase(CachePhase::Installed);
                Ok(())
            }
            Err(e) => {
                warn!(generation = %self.generation, error = %e, "Offline cache install failed");
                if !existed {
                    if let Err(cleanup) = self.storage.delete(&self.generation) {
                        warn!(error = %cleanup, "Failed to remove incomplete cache store");
                    }
                }
                self.set_phase(CachePhase::Redundant);
                Err(e)
            }
        }
    }

    /// Delete every cache store except the current generation. Returns the deleted names.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        let phase = self.phase();
        if phase != CachePhase::Installed {
            return Err(CacheError::InvalidPhase {
                action: "activate",
                phase,
            });
        }
        self.set_phase(CachePhase::Activating);

        let purged = match self.purge_stale_generations() {
            Ok(purged) => purged,
            Err(e) => {
                // Leave the installed generation ready for another activation attempt
                self.set_phase(CachePhase::Installed);
                return Err(e);
            }
        };

        info!(generation = %self.generation, purged = purged.len(), "Offline cache activated");
        self.set_phase(CachePhase::Activated);
        Ok(purged)
    }

    fn purge_stale_generations(&self) -> Result<Vec<String>, CacheError> {
        let mut purged = Vec::new();
        for name in self.storage.names()? {
            if name != self.generation {
                self.storage.delete(&name)?;
                debug!(generation = %name, "Deleted stale cache generation");
                purged.push(name);
            }
        }
        Ok(purged)
    }

    /// Bring this generation to the activated phase.
    ///
    /// A generation holding every precached asset was installed by an earlier
    /// session and is only re-activated. A missing or partial one (an install
    /// that was interrupted) is installed first.
    pub async fn register(&self) -> Result<Registration, CacheError> {
        if self.phase() == CachePhase::Activated {
            return Ok(Registration::AlreadyActive);
        }

        if self.phase() == CachePhase::Parsed {
            if self.is_complete()? {
                self.set_phase(CachePhase::Installed);
                let purged = self.activate().await?;
                return Ok(Registration::Resumed { purged });
            }
            if self.storage.has(&self.generation)? {
                debug!(generation = %self.generation, "Cache generation incomplete, reinstalling");
            }
        }

        if self.phase() != CachePhase::Installed {
            self.install().await?;
        }
        let purged = self.activate().await?;
        Ok(Registration::Installed { purged })
    }

    /// True when this generation's store holds every precached asset.
    fn is_complete(&self) -> Result<bool, CacheError> {
        Cache::bind(self.storage.clone(), &self.generation).contains_all(&self.assets)
    }

    fn is_dataset(&self, request: &Request) -> bool {
        request.same_resource(&self.dataset)
    }

    /// Answer an intercepted request.
    ///
    /// Before activation everything goes to the network. Once activated the
    /// bundled dataset is network-first with a cached fallback, and every other
    /// resource is cache-first with a network fallthrough.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, FetchError> {
        if self.phase() != CachePhase::Activated {
            return self.network.fetch(request).await;
        }

        if self.is_dataset(&request) {
            return self.fetch_dataset(request).await;
        }

        match self.lookup(&request) {
            Some(response) => {
                debug!(url = %request.url(), "Served from cache");
                Ok(response)
            }
            None => self.network.fetch(request).await,
        }
    }

    async fn fetch_dataset(&self, request: Request) -> Result<Response, FetchError> {
        match self.network.fetch(request.clone()).await {
            Ok(response) => {
                if response.is_success() {
                    self.spawn_refresh(response.clone());
                }
                Ok(response)
            }
            Err(e) => {
                // Cache-busting query strings differ per call; the cached copy is keyed without them
                match self.lookup(&self.dataset) {
                    Some(cached) => {
                        debug!(url = %request.url(), error = %e, "Network failed, serving cached dataset");
                        Ok(cached)
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn lookup(&self, request: &Request) -> Option<Response> {
        // Never creates the store: a generation deleted meanwhile stays deleted
        let found = Cache::bind(self.storage.clone(), &self.generation).match_request(request);
        match found {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %request.url(), error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store a fresh dataset copy on a detached task. Failure is logged and
    /// never reaches the request that triggered it. A store deleted in the
    /// meantime is left deleted.
    fn spawn_refresh(&self, response: Response) {
        let storage = self.storage.clone();
        let generation = self.generation.clone();
        let dataset = self.dataset.clone();

        let handle = tokio::spawn(async move {
            match storage.has(&generation) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(generation = %generation, "Cache store gone, skipping dataset refresh");
                    return;
                }
                Err(e) => {
                    warn!(generation = %generation, error = %e, "Failed to refresh cached dataset");
                    return;
                }
            }
            let stored = Cache::bind(storage, &generation).put(&dataset, &response);
            match stored {
                Ok(()) => debug!(generation = %generation, "Refreshed cached dataset"),
                Err(e) => warn!(generation = %generation, error = %e, "Failed to refresh cached dataset"),
            }
        });

        let mut refreshes = self.refreshes.lock().unwrap_or_else(|e| e.into_inner());
        refreshes.retain(|h| !h.is_finished());
        refreshes.push(handle);
    }

    /// Wait for every detached refresh started so far.
    pub async fn settle(&self) {
        let pending = {
            let mut refreshes = self.refreshes.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *refreshes)
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dataset refresh task panicked");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::{FakeNetwork, BASE_URL};
    use crate::offline::MemoryCacheStorage;

    const DATASET_V1: &str = r#"[{"dni":"12345678","apellido":"Ruiz","nombre":"Ana","estado":"PAGO"}]"#;
    const DATASET_V2: &str = r#"[{"dni":"87654321","apellido":"Perez","nombre":"Juan","estado":"DEBE"}]"#;

    fn network_with_assets() -> Arc<FakeNetwork> {
        let network = FakeNetwork::new();
        for asset in PRECACHE_ASSETS {
            network.route(asset, Response::ok("text/plain", format!("asset {}", asset)));
        }
        network.route_json(DATASET_PATH, DATASET_V1);
        Arc::new(network)
    }

    fn manager(
        generation: &str,
        storage: &Arc<dyn CacheStorage>,
        network: &Arc<FakeNetwork>,
    ) -> OfflineCacheManager {
        let settings = CacheSettings::new(generation, Url::parse(BASE_URL).unwrap());
        OfflineCacheManager::new(settings, storage.clone(), network.clone()).unwrap()
    }

    fn request(path: &str) -> Request {
        Request::get(Url::parse(BASE_URL).unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);

        assert_eq!(manager.phase(), CachePhase::Parsed);
        manager.install().await.unwrap();
        assert_eq!(manager.phase(), CachePhase::Installed);
        assert_eq!(storage.entries("gen-1").unwrap().len(), PRECACHE_ASSETS.len());

        let purged = manager.activate().await.unwrap();
        assert!(purged.is_empty());
        assert_eq!(manager.phase(), CachePhase::Activated);
    }

    #[tokio::test]
    async fn test_failed_install_blocks_activation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        network.route("./icons/icon-512.png", Response::new(500, None, Vec::new()));
        let manager = manager("gen-1", &storage, &network);

        assert!(manager.install().await.is_err());
        assert_eq!(manager.phase(), CachePhase::Redundant);
        assert!(!storage.has("gen-1").unwrap());

        let err = manager.activate().await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidPhase { action: "activate", .. }));
    }

    #[tokio::test]
    async fn test_install_fails_when_offline() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        network.set_online(false);
        let manager = manager("gen-1", &storage, &network);

        let err = manager.install().await.unwrap_err();
        assert!(matches!(err, CacheError::AssetFetch { .. }));
        assert!(storage.names().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activation_purges_previous_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();

        let first = manager("gen-1", &storage, &network);
        first.register().await.unwrap();
        assert_eq!(storage.names().unwrap(), vec!["gen-1"]);

        network.route("./app.js", Response::ok("text/javascript", "v2"));
        let second = manager("gen-2", &storage, &network);
        let registration = second.register().await.unwrap();

        assert_eq!(
            registration,
            Registration::Installed {
                purged: vec!["gen-1".to_string()]
            }
        );
        assert_eq!(storage.names().unwrap(), vec!["gen-2"]);

        network.set_online(false);
        let js = second.handle_fetch(request("./app.js")).await.unwrap();
        assert_eq!(js.text(), "v2");
    }

    #[tokio::test]
    async fn test_register_resumes_existing_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        manager("gen-1", &storage, &network).register().await.unwrap();
        let requests_after_first = network.requests().len();

        let again = manager("gen-1", &storage, &network);
        let registration = again.register().await.unwrap();
        assert_eq!(registration, Registration::Resumed { purged: vec![] });
        assert_eq!(network.requests().len(), requests_after_first);
        assert_eq!(again.register().await.unwrap(), Registration::AlreadyActive);
    }

    #[tokio::test]
    async fn test_register_reinstalls_empty_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        // Left behind by an install that never finished
        storage.open("gen-1").unwrap();

        let manager = manager("gen-1", &storage, &network);
        let registration = manager.register().await.unwrap();
        assert_eq!(registration, Registration::Installed { purged: vec![] });
        assert_eq!(storage.entries("gen-1").unwrap().len(), PRECACHE_ASSETS.len());

        network.set_online(false);
        let page = manager.handle_fetch(request("./index.html")).await.unwrap();
        assert_eq!(page.text(), "asset ./index.html");
    }

    #[tokio::test]
    async fn test_register_reinstalls_partial_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let partial = Cache::open(storage.clone(), "gen-1").unwrap();
        partial
            .put(&request("./index.html"), &Response::ok("text/html", "stale"))
            .unwrap();

        let manager = manager("gen-1", &storage, &network);
        let registration = manager.register().await.unwrap();
        assert_eq!(registration, Registration::Installed { purged: vec![] });
        assert_eq!(storage.entries("gen-1").unwrap().len(), PRECACHE_ASSETS.len());
    }

    #[tokio::test]
    async fn test_interrupted_install_is_not_activated_offline() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        storage.open("gen-1").unwrap();
        network.set_online(false);

        let manager = manager("gen-1", &storage, &network);
        assert!(manager.register().await.is_err());
        assert_eq!(manager.phase(), CachePhase::Redundant);
    }

    #[tokio::test]
    async fn test_lookup_does_not_recreate_deleted_store() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();
        storage.delete("gen-1").unwrap();

        let css = manager.handle_fetch(request("./style.css")).await.unwrap();
        assert_eq!(css.text(), "asset ./style.css");
        assert!(!storage.has("gen-1").unwrap());
    }

    #[tokio::test]
    async fn test_refresh_skips_deleted_store() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();
        storage.delete("gen-1").unwrap();

        let live = manager.handle_fetch(request("./data.json?v=5")).await.unwrap();
        assert_eq!(live.text(), DATASET_V1);
        manager.settle().await;
        assert!(!storage.has("gen-1").unwrap());
    }

    #[tokio::test]
    async fn test_assets_are_cache_first() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();

        network.route("./style.css", Response::ok("text/css", "changed"));
        let css = manager.handle_fetch(request("./style.css")).await.unwrap();
        assert_eq!(css.text(), "asset ./style.css");
    }

    #[tokio::test]
    async fn test_uncached_asset_falls_through_without_fallback() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        network.route("./extra.txt", Response::ok("text/plain", "extra"));
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();

        let extra = manager.handle_fetch(request("./extra.txt")).await.unwrap();
        assert_eq!(extra.text(), "extra");

        network.set_online(false);
        let err = manager.handle_fetch(request("./extra.txt")).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_dataset_is_network_first_and_refreshes_cache() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();

        network.route_json(DATASET_PATH, DATASET_V2);
        let live = manager
            .handle_fetch(request("./data.json?v=1700000000000"))
            .await
            .unwrap();
        assert_eq!(live.text(), DATASET_V2);

        manager.settle().await;
        network.set_online(false);
        let fallback = manager
            .handle_fetch(request("./data.json?v=1700000000001"))
            .await
            .unwrap();
        assert_eq!(fallback.text(), DATASET_V2);
    }

    #[tokio::test]
    async fn test_dataset_error_status_is_not_cached() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();

        network.route(DATASET_PATH, Response::new(503, None, b"down".to_vec()));
        let live = manager.handle_fetch(request("./data.json?v=2")).await.unwrap();
        assert_eq!(live.status, 503);
        manager.settle().await;

        network.set_online(false);
        let fallback = manager.handle_fetch(request("./data.json?v=3")).await.unwrap();
        assert_eq!(fallback.text(), DATASET_V1);
    }

    #[tokio::test]
    async fn test_dataset_without_cache_fails_offline() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);
        manager.register().await.unwrap();
        storage.delete("gen-1").unwrap();

        network.set_online(false);
        let err = manager.handle_fetch(request("./data.json?v=9")).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_before_activation_goes_to_network() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        let network = network_with_assets();
        let manager = manager("gen-1", &storage, &network);

        let response = manager.handle_fetch(request("./index.html")).await.unwrap();
        assert_eq!(response.text(), "asset ./index.html");
        assert!(storage.names().unwrap().is_empty());
    }
}
