use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::CacheError;
use crate::net::{Fetch, Request, Response};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// What a cache entry holds, without its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
}

/// Named cache stores of request/response entries.
///
/// Writing to a store that does not exist creates it.
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet.
    fn open(&self, name: &str) -> Result<()>;

    fn has(&self, name: &str) -> Result<bool>;

    fn names(&self) -> Result<Vec<String>>;

    /// Returns true when a store was removed.
    fn delete(&self, name: &str) -> Result<bool>;

    fn get(&self, name: &str, key: &str) -> Result<Option<CachedData<Response>>>;

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()>;

    fn entries(&self, name: &str) -> Result<Vec<CachedData<EntryInfo>>>;
}

/// Handle on one named store.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl Cache {
    /// Handle on the named store, creating it if needed.
    pub fn open(storage: Arc<dyn CacheStorage>, name: &str) -> Result<Self, CacheError> {
        storage.open(name)?;
        Ok(Self::bind(storage, name))
    }

    /// Handle on a store that may not exist. Reads see a missing store as
    /// empty and never create it.
    pub fn bind(storage: Arc<dyn CacheStorage>, name: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
        }
    }

    /// True when the store exists and holds an entry for every request.
    pub fn contains_all(&self, requests: &[Request]) -> Result<bool, CacheError> {
        if !self.storage.has(&self.name)? {
            return Ok(false);
        }
        let stored: HashSet<String> = self
            .storage
            .entries(&self.name)?
            .into_iter()
            .map(|entry| entry.data.url)
            .collect();
        Ok(requests
            .iter()
            .all(|request| stored.contains(&request.cache_key())))
    }

    pub fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        Ok(self
            .storage
            .get(&self.name, &request.cache_key())?
            .map(|cached| cached.data))
    }

    pub fn put(&self, request: &Request, response: &Response) -> Result<(), CacheError> {
        self.storage.put(&self.name, &request.cache_key(), response)?;
        Ok(())
    }

    /// Fetch every request and store the responses.
    ///
    /// All-or-nothing: if any fetch fails or answers with a non-success
    /// status, nothing is written.
    pub async fn add_all(&self, network: &dyn Fetch, requests: &[Request]) -> Result<(), CacheError> {
        let fetches = requests.iter().map(|request| async move {
            let response = network
                .fetch(request.clone())
                .await
                .map_err(|source| CacheError::AssetFetch {
                    url: request.url().to_string(),
                    source,
                })?;
            if !response.is_success() {
                return Err(CacheError::AssetStatus {
                    url: request.url().to_string(),
                    status: response.status,
                });
            }
            Ok::<_, CacheError>((request, response))
        });
        let fetched = try_join_all(fetches).await?;

        for (request, response) in &fetched {
            self.put(request, response)?;
        }
        debug!(cache = %self.name, count = fetched.len(), "Stored assets");
        Ok(())
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

type MemoryStore = HashMap<String, CachedData<Response>>;

#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: Mutex<BTreeMap<String, MemoryStore>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemoryStore>> {
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, name: &str) -> Result<()> {
        self.stores().entry(name.to_string()).or_default();
        Ok(())
    }

    fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores().contains_key(name))
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self.stores().keys().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.stores().remove(name).is_some())
    }

    fn get(&self, name: &str, key: &str) -> Result<Option<CachedData<Response>>> {
        Ok(self
            .stores()
            .get(name)
            .and_then(|store| store.get(key))
            .cloned())
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()> {
        self.stores()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), CachedData::new(response.clone()));
        Ok(())
    }

    fn entries(&self, name: &str) -> Result<Vec<CachedData<EntryInfo>>> {
        let stores = self.stores();
        let mut entries: Vec<CachedData<EntryInfo>> = stores
            .get(name)
            .map(|store| {
                store
                    .iter()
                    .map(|(key, cached)| CachedData {
                        data: EntryInfo {
                            url: key.clone(),
                            status: cached.data.status,
                            content_type: cached.data.content_type.clone(),
                        },
                        cached_at: cached.cached_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.data.url.cmp(&b.data.url));
        Ok(entries)
    }
}

// ============================================================================
// On-disk storage
// ============================================================================

/// One directory per store under `root`; each entry is a `<sha256>.json`
/// metadata file next to a `<sha256>.body` file holding the raw bytes.
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self { root })
    }

    fn store_dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            bail!("Invalid cache name: {:?}", name);
        }
        Ok(self.root.join(name))
    }

    fn entry_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

impl CacheStorage for DiskCacheStorage {
    fn open(&self, name: &str) -> Result<()> {
        std::fs::create_dir_all(self.store_dir(name)?)?;
        Ok(())
    }

    fn has(&self, name: &str) -> Result<bool> {
        Ok(self.store_dir(name)?.is_dir())
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.store_dir(name)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete cache store: {}", name))?;
        Ok(true)
    }

    fn get(&self, name: &str, key: &str) -> Result<Option<CachedData<Response>>> {
        let dir = self.store_dir(name)?;
        let stem = Self::entry_stem(key);
        let meta_path = dir.join(format!("{}.json", stem));
        if !meta_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read cache entry for {}", key))?;
        let meta: CachedData<EntryInfo> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry for {}", key))?;
        let body = std::fs::read(dir.join(format!("{}.body", stem)))
            .with_context(|| format!("Failed to read cached body for {}", key))?;

        Ok(Some(CachedData {
            data: Response::new(meta.data.status, meta.data.content_type, body),
            cached_at: meta.cached_at,
        }))
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()> {
        let dir = self.store_dir(name)?;
        std::fs::create_dir_all(&dir)?;
        let stem = Self::entry_stem(key);

        let meta = CachedData::new(EntryInfo {
            url: key.to_string(),
            status: response.status,
            content_type: response.content_type.clone(),
        });
        // Body first: metadata is what makes an entry visible
        std::fs::write(dir.join(format!("{}.body", stem)), &response.body)?;
        std::fs::write(
            dir.join(format!("{}.json", stem)),
            serde_json::to_string_pretty(&meta)?,
        )?;
        Ok(())
    }

    fn entries(&self, name: &str) -> Result<Vec<CachedData<EntryInfo>>> {
        let dir = self.store_dir(name)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<CachedData<EntryInfo>>(&contents) {
                Ok(meta) => entries.push(meta),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.data.url.cmp(&b.data.url));
        Ok(entries)
    }
}

// ============================================================================
// Tests
// ============================================================================
