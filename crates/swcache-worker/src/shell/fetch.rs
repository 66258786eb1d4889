//! Fetch: cache first, then network, no write-back.

use async_trait::async_trait;
use swcache_net::Response;
use tracing::{debug, error, info};

use crate::handlers::{FetchEvent, FetchHandler};
use crate::scope::WorkerScope;

#[derive(Debug, Clone, Default)]
pub struct CacheFirstFetch {
    /// Restrict lookups to this bucket; `None` searches every bucket.
    cache_name: Option<String>,
}

impl CacheFirstFetch {
    /// Look up across every bucket.
    pub fn all_caches() -> Self {
        Self { cache_name: None }
    }

    /// Look up only in `cache_name`.
    pub fn in_cache(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: Some(cache_name.into()),
        }
    }
}

#[async_trait]
impl FetchHandler for CacheFirstFetch {
    async fn fetch(&self, scope: &WorkerScope, event: &FetchEvent) -> Option<Response> {
        let request = &event.request;
        info!(url = %request.url, "Fetching");

        let cached = scope
            .caches()
            .match_request(request, self.cache_name.as_deref())
            .await
            .and_then(|hit| hit.map(|entry| entry.to_response()).transpose());

        match cached {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Serving from cache");
                return Some(response);
            }
            Ok(None) => {}
            Err(e) => {
                error!(url = %request.url, category = e.category(), error = %e, "Fetch error");
                return None;
            }
        }

        debug!(url = %request.url, "Fetching from network");
        match scope.network().fetch(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(url = %request.url, error = %e, "Fetch error");
                None
            }
        }
    }
}
