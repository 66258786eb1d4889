//! Cache storage: the named buckets behind the `caches` global.

use async_trait::async_trait;
use futures::future::try_join_all;
use swcache_net::{Fetcher, Request, Response};
use tracing::debug;

use crate::cache::{CacheEntry, CacheError};

mod memory;
mod sqlite;

pub use memory::{Cache, MemoryCacheStorage};
pub use sqlite::SqliteCacheStorage;

/// A store of named cache buckets.
///
/// Every method is atomic on its own. Bucket names are reported in creation
/// order and cross-bucket lookups search in that order.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a bucket exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// Delete a bucket and all its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// All bucket names, oldest first.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Find the first entry answering `request`, either in the named bucket
    /// or across every bucket when `cache_name` is `None`.
    async fn match_request(
        &self,
        request: &Request,
        cache_name: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError>;

    /// Store entries in one step. Each entry first removes every stored
    /// entry its request matches, whatever `Vary` the old response carried.
    async fn put_all(
        &self,
        cache_name: &str,
        entries: Vec<(Request, CacheEntry)>,
    ) -> Result<(), CacheError>;

    /// Entries of a bucket, in insertion order.
    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError>;

    /// Store a single request/response pair.
    async fn put(
        &self,
        cache_name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::from_exchange(request, response)?;
        self.put_all(cache_name, vec![(request.clone(), entry)]).await
    }

    /// Fetch every request and store all responses, or nothing.
    ///
    /// Fetches run concurrently. A network failure or a non-2xx response
    /// fails the whole operation before anything is written.
    async fn add_all(
        &self,
        cache_name: &str,
        network: &dyn Fetcher,
        requests: &[Request],
    ) -> Result<(), CacheError> {
        let fetches = requests.iter().map(|request| async move {
            let response = network
                .fetch(request)
                .await
                .map_err(|source| CacheError::Network {
                    url: request.url.to_string(),
                    source,
                })?;

            if !response.ok() {
                return Err(CacheError::BadResponse {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                });
            }

            let entry = CacheEntry::from_exchange(request, &response)?;
            Ok((request.clone(), entry))
        });

        let entries = try_join_all(fetches).await?;
        debug!(cache = %cache_name, count = entries.len(), "Storing fetched entries");
        self.put_all(cache_name, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT_ENCODING, VARY};
    use http::{HeaderValue, StatusCode};
    use swcache_net::MockFetcher;
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse("https://app.test/").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_add_all_stores_every_response() {
        let net = MockFetcher::new();
        net.route(&url("/"), "<html>").route(&url("/app.js"), "js");
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();

        let requests = vec![Request::get(url("/")), Request::get(url("/app.js"))];
        storage.add_all("v1", &net, &requests).await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap().len(), 2);
        assert_eq!(net.calls(), 2);
    }

    #[tokio::test]
    async fn test_add_all_is_all_or_nothing() {
        let net = MockFetcher::new();
        net.route(&url("/"), "<html>")
            .route_status(&url("/gone.css"), StatusCode::NOT_FOUND, "");
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();

        let requests = vec![Request::get(url("/")), Request::get(url("/gone.css"))];
        let err = storage.add_all("v1", &net, &requests).await.unwrap_err();

        assert!(matches!(err, CacheError::BadResponse { status: 404, .. }));
        assert!(storage.entries("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_all_network_failure() {
        let net = MockFetcher::new();
        net.route(&url("/"), "<html>").fail(&url("/app.js"));
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();

        let requests = vec![Request::get(url("/")), Request::get(url("/app.js"))];
        let err = storage.add_all("v1", &net, &requests).await.unwrap_err();

        assert_eq!(err.category(), "network");
        assert!(storage.entries("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_single_entry() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();

        let request = Request::get(url("/data.json"));
        let response = Response::new(url("/data.json"), StatusCode::OK, "{}");
        storage.put("v1", &request, &response).await.unwrap();

        let hit = storage.match_request(&request, Some("v1")).await.unwrap();
        assert_eq!(hit.unwrap().to_response().unwrap(), response);
    }

    #[tokio::test]
    async fn test_put_drops_entry_stored_under_other_vary() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();

        let request = Request::get(url("/app.js"))
            .header(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        let old = Response::new(url("/app.js"), StatusCode::OK, "old")
            .with_header(VARY, HeaderValue::from_static("accept-encoding"));
        let new = Response::new(url("/app.js"), StatusCode::OK, "new");
        storage.put("v1", &request, &old).await.unwrap();
        storage.put("v1", &request, &new).await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap().len(), 1);
        let hit = storage.match_request(&request, None).await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
    }
}
