//! End-to-end: roster store, offline worker and on-disk storage together.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use asegurados_core::import::{ImportFormat, PersonDraft, UpsertOutcome, UpsertTarget};
use asegurados_core::net::{Fetch, FetchError, Request, Response};
use asegurados_core::offline::{
    CachePhase, CacheSettings, CacheStorage, DiskCacheStorage, OfflineCacheManager, OfflineWorker,
    Registration, PRECACHE_ASSETS,
};
use asegurados_core::roster::STORAGE_KEY;
use asegurados_core::storage::{FileKeyValueStore, KeyValueStore};
use asegurados_core::{DatasetClient, PaymentStatus, Person, RecordStore};

const SCOPE: &str = "https://asegurados.test/app/";

const BUNDLED: &str = r#"[
    {"dni":"12345678","apellido":"Ruiz","nombre":"Ana","estado":"PAGO"},
    {"dni":"23456789","apellido":"Perez","nombre":"Juan","estado":"DEBE"}
]"#;

/// A static web server that can be unplugged.
struct StaticSite {
    files: Mutex<HashMap<String, Response>>,
    online: AtomicBool,
}

impl StaticSite {
    fn new() -> Arc<Self> {
        let site = Self {
            files: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        };
        for asset in PRECACHE_ASSETS {
            site.serve(asset, Response::ok("text/plain", format!("v1 {}", asset)));
        }
        site.serve("./data.json", Response::ok("application/json", BUNDLED));
        Arc::new(site)
    }

    fn url(path: &str) -> Url {
        Url::parse(SCOPE).unwrap().join(path).unwrap()
    }

    fn serve(&self, path: &str, response: Response) {
        let key = Request::get(Self::url(path)).without_query().cache_key();
        self.files.lock().unwrap().insert(key, response);
    }

    fn unplug(&self) {
        self.online.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetch for StaticSite {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable(request.url().to_string()));
        }
        let key = request.without_query().cache_key();
        let found = self.files.lock().unwrap().get(&key).cloned();
        Ok(found.unwrap_or_else(|| Response::new(404, None, Vec::new())))
    }
}

/// One run of the app: a worker for `generation` plus the roster, all on disk under `root`.
struct Session {
    worker: OfflineWorker,
    storage: Arc<FileKeyValueStore>,
}

impl Session {
    async fn start(root: &Path, generation: &str, site: &Arc<StaticSite>) -> Self {
        let cache: Arc<dyn CacheStorage> =
            Arc::new(DiskCacheStorage::new(root.join("cache")).unwrap());
        let settings = CacheSettings::new(generation, Url::parse(SCOPE).unwrap());
        let manager = OfflineCacheManager::new(settings, cache, site.clone()).unwrap();
        let worker = OfflineWorker::spawn(manager);
        let _ = worker.register().await;

        Self {
            worker,
            storage: Arc::new(FileKeyValueStore::new(root.join("data")).unwrap()),
        }
    }

    async fn load(&self) -> anyhow::Result<RecordStore> {
        let dataset = DatasetClient::new(
            Arc::new(self.worker.clone()),
            StaticSite::url("data.json"),
        );
        RecordStore::load(self.storage.clone(), dataset).await
    }

    fn persisted(&self) -> Option<String> {
        self.storage.get(STORAGE_KEY).unwrap()
    }
}

#[tokio::test]
async fn first_run_bootstraps_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    let session = Session::start(dir.path(), "gen-1", &site).await;
    assert_eq!(session.worker.phase(), CachePhase::Activated);

    let store = session.load().await.unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.count_owing(), 1);

    let persisted: Vec<Person> = serde_json::from_str(&session.persisted().unwrap()).unwrap();
    assert_eq!(persisted, store.records());
}

#[tokio::test]
async fn offline_bootstrap_uses_cached_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();

    let first = Session::start(dir.path(), "gen-1", &site).await;
    first.worker.settle().await;
    drop(first);

    // Local data lost, network gone: the cached dataset still bootstraps the roster
    std::fs::remove_dir_all(dir.path().join("data")).unwrap();
    site.unplug();

    let second = Session::start(dir.path(), "gen-1", &site).await;
    assert_eq!(second.worker.phase(), CachePhase::Activated);
    let store = second.load().await.unwrap();
    assert_eq!(store.records()[0].id, "12345678");
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn bootstrap_without_network_or_cache_fails() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    site.unplug();

    let session = Session::start(dir.path(), "gen-1", &site).await;
    assert_eq!(session.worker.phase(), CachePhase::Redundant);
    assert!(session.load().await.is_err());
    assert_eq!(session.persisted(), None);
}

#[tokio::test]
async fn stored_roster_is_used_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();

    let first = Session::start(dir.path(), "gen-1", &site).await;
    let mut store = first.load().await.unwrap();
    store.toggle_status(0).unwrap();
    drop(store);
    drop(first);

    site.unplug();
    let second = Session::start(dir.path(), "gen-1", &site).await;
    let store = second.load().await.unwrap();
    assert_eq!(store.records()[0].status, PaymentStatus::Owing);
}

#[tokio::test]
async fn toggle_then_remove_persists_empty_roster() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    site.serve(
        "./data.json",
        Response::ok(
            "application/json",
            r#"[{"dni":"12345678","apellido":"Ruiz","nombre":"Ana","estado":"PAGO"}]"#,
        ),
    );

    let session = Session::start(dir.path(), "gen-1", &site).await;
    let mut store = session.load().await.unwrap();

    let records = store.toggle_status(0).unwrap();
    assert_eq!(records[0].status, PaymentStatus::Owing);
    let records = store.remove_at(0).unwrap();
    assert!(records.is_empty());
    assert_eq!(session.persisted().as_deref(), Some("[]"));
}

#[tokio::test]
async fn generation_upgrade_drops_old_assets() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();

    let first = Session::start(dir.path(), "gen-1", &site).await;
    drop(first);

    site.serve("./app.js", Response::ok("text/javascript", "v2 ./app.js"));
    let second = Session::start(dir.path(), "gen-2", &site).await;
    assert_eq!(second.worker.register().await.unwrap(), Registration::AlreadyActive);

    let cache = DiskCacheStorage::new(dir.path().join("cache")).unwrap();
    assert_eq!(cache.names().unwrap(), vec!["gen-2"]);

    site.unplug();
    let js = second
        .worker
        .fetch(Request::get(StaticSite::url("./app.js")))
        .await
        .unwrap();
    assert_eq!(js.text(), "v2 ./app.js");
}

#[tokio::test]
async fn csv_import_replaces_roster() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    let session = Session::start(dir.path(), "gen-1", &site).await;
    let mut store = session.load().await.unwrap();

    let csv = "dni,apellido,nombre,estado\n1-2-3-4-5-6-7-8,Perez,Juan,debe";
    let records = store.import(csv, ImportFormat::Csv).unwrap();
    assert_eq!(
        records,
        [Person::new("12345678", "Perez", "Juan", PaymentStatus::Owing)]
    );

    let persisted: Vec<Person> = serde_json::from_str(&session.persisted().unwrap()).unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn failed_import_leaves_storage_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    let session = Session::start(dir.path(), "gen-1", &site).await;
    let mut store = session.load().await.unwrap();
    let before = session.persisted();

    let missing_status = r#"[{"dni":"12345678","apellido":"Ruiz","nombre":"Ana"}]"#;
    assert!(store.import(missing_status, ImportFormat::Json).is_err());
    assert!(store.import("{\"dni\":1}", ImportFormat::Json).is_err());

    assert_eq!(session.persisted(), before);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn adding_existing_dni_asks_before_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let site = StaticSite::new();
    let session = Session::start(dir.path(), "gen-1", &site).await;
    let mut store = session.load().await.unwrap();

    let draft = PersonDraft {
        id: "12.345.678".to_string(),
        last_name: " Ruiz ".to_string(),
        first_name: "Ana Maria".to_string(),
        status: PaymentStatus::Owing,
    };

    let declined = store.upsert(&draft, UpsertTarget::New, |_| false).unwrap();
    assert_eq!(declined, UpsertOutcome::Declined);
    assert_eq!(store.records()[0].first_name, "Ana");

    let replaced = store.upsert(&draft, UpsertTarget::New, |_| true).unwrap();
    assert_eq!(replaced, UpsertOutcome::Replaced(0));
    assert_eq!(store.records()[0].first_name, "Ana Maria");
    assert_eq!(store.len(), 2);
}
