//! In-memory network used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Fetch, FetchError, Request, Response};

pub(crate) const BASE_URL: &str = "https://asegurados.test/app/";

/// Routes requests by URL (query ignored) and records every URL it was asked for.
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    online: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Serve `response` for `path`, resolved against [`BASE_URL`].
    pub(crate) fn route(&self, path: &str, response: Response) {
        let key = Request::get(url::Url::parse(BASE_URL).unwrap().join(path).unwrap())
            .without_query()
            .cache_key();
        self.routes.lock().unwrap().insert(key, response);
    }

    pub(crate) fn route_json(&self, path: &str, json: &str) {
        self.route(path, Response::ok("application/json", json));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable(request.url().to_string()));
        }
        self.log.lock().unwrap().push(request.cache_key());
        let key = request.without_query().cache_key();
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Response::new(404, None, Vec::new())))
    }
}
