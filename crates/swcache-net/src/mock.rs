//! In-memory network for tests and offline embedding.
//!
//! Routes are matched on the full URL. Unrouted URLs answer `404 Not Found`,
//! like an origin server would.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use http::{HeaderName, HeaderValue, StatusCode};
use tracing::trace;
use url::Url;

use crate::{Fetcher, NetError, Request, Response};

/// A scripted [`Fetcher`] that records every call.
#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    requested: Mutex<Vec<Url>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockFetcher {
    /// Create an empty mock network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `url`.
    pub fn route(&self, url: &Url, body: impl Into<Bytes>) -> &Self {
        self.route_response(Response::new(url.clone(), StatusCode::OK, body))
    }

    /// Serve `body` with a given status at `url`.
    pub fn route_status(&self, url: &Url, status: StatusCode, body: impl Into<Bytes>) -> &Self {
        self.route_response(Response::new(url.clone(), status, body))
    }

    /// Serve `body` at `url` with one extra response header.
    pub fn route_with_header(
        &self,
        url: &Url,
        name: HeaderName,
        value: HeaderValue,
        body: impl Into<Bytes>,
    ) -> &Self {
        let response = Response::new(url.clone(), StatusCode::OK, body).with_header(name, value);
        self.route_response(response)
    }

    /// Serve a prepared response at its own URL.
    pub fn route_response(&self, response: Response) -> &Self {
        lock(&self.routes).insert(response.url.to_string(), response);
        self
    }

    /// Make requests for `url` fail with a network error.
    pub fn fail(&self, url: &Url) -> &Self {
        lock(&self.failing).insert(url.to_string());
        self
    }

    /// Toggle whole-network availability.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of fetches attempted for `url`.
    pub fn calls_for(&self, url: &Url) -> usize {
        lock(&self.requested).iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requested).push(request.url.clone());
        trace!(url = %request.url, "Mock fetch");

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }

        let key = request.url.to_string();
        if lock(&self.failing).contains(&key) {
            return Err(NetError::RequestFailed(format!("connection reset: {key}")));
        }

        match lock(&self.routes).get(&key) {
            Some(response) => Ok(response.clone()),
            None => Ok(Response::new(request.url.clone(), StatusCode::NOT_FOUND, "")),
        }
    }
}
