//! Offline cache for the app shell and the bundled dataset.
//!
//! The cache works in generations. A generation is a named cache store
//! holding every precached asset; exactly one generation is current.
//!
//! - `CacheStorage`: named stores of request/response entries, in memory or on disk
//! - `OfflineCacheManager`: install / activate / fetch lifecycle for one generation
//! - `OfflineWorker`: runs the manager on its own task and implements `Fetch`
//!
//! The bundled dataset is served network-first with a cached fallback; every
//! other asset is served cache-first.

pub mod error;
pub mod manager;
pub mod storage;
pub mod worker;

pub use error::CacheError;
pub use manager::{
    CachePhase, CacheSettings, OfflineCacheManager, Registration, DATASET_PATH, DEFAULT_GENERATION,
    PRECACHE_ASSETS,
};
pub use storage::{Cache, CacheStorage, CachedData, DiskCacheStorage, EntryInfo, MemoryCacheStorage};
pub use worker::OfflineWorker;
