//! In-memory cache storage.

use async_trait::async_trait;
use swcache_net::Request;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::cache::{CacheEntry, CacheError};

/// A cache bucket.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, in insertion order.
    entries: Vec<CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.iter().find(|entry| entry.matches(request))
    }

    /// Add an entry, dropping every stored entry `request` matches.
    pub fn put(&mut self, request: &Request, entry: CacheEntry) {
        self.entries.retain(|existing| !existing.matches(request));
        self.entries.push(entry);
    }

    /// Get all entries.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage held in process memory.
///
/// Lost on restart; used as the in-process fake and for ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|cache| cache.name == name) {
            caches.push(Cache::new(name));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.iter().any(|cache| cache.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|cache| cache.name != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|cache| cache.name.clone())
            .collect())
    }

    async fn match_request(
        &self,
        request: &Request,
        cache_name: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .filter(|cache| cache_name.map_or(true, |name| cache.name == name))
            .find_map(|cache| cache.match_request(request))
            .cloned())
    }

    async fn put_all(
        &self,
        cache_name: &str,
        entries: Vec<(Request, CacheEntry)>,
    ) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .iter_mut()
            .find(|cache| cache.name == cache_name)
            .ok_or_else(|| CacheError::NotFound(cache_name.to_string()))?;

        for (request, entry) in entries {
            cache.put(&request, entry);
        }
        Ok(())
    }

    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        self.caches
            .read()
            .await
            .iter()
            .find(|cache| cache.name == cache_name)
            .map(|cache| cache.entries().to_vec())
            .ok_or_else(|| CacheError::NotFound(cache_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use swcache_net::Response;
    use url::Url;

    fn entry(url: &str, body: &str) -> (Request, CacheEntry) {
        let request = Request::parse(url).unwrap();
        let response = Response::new(Url::parse(url).unwrap(), StatusCode::OK, body.to_string());
        let entry = CacheEntry::from_exchange(&request, &response).unwrap();
        (request, entry)
    }

    fn put(cache: &mut Cache, url: &str, body: &str) {
        let (request, entry) = entry(url, body);
        cache.put(&request, entry);
    }

    #[test]
    fn test_cache_put_replaces_matching_entry() {
        let mut cache = Cache::new("v1");
        put(&mut cache, "https://app.test/a.js", "old");
        put(&mut cache, "https://app.test/b.js", "b");
        put(&mut cache, "https://app.test/a.js#v2", "new");

        assert_eq!(cache.len(), 2);
        let request = Request::parse("https://app.test/a.js").unwrap();
        assert_eq!(cache.match_request(&request).unwrap().body, b"new");
        // Replaced entries move to the end.
        assert_eq!(cache.entries()[1].url, "https://app.test/a.js");
    }

    #[tokio::test]
    async fn test_storage_open_has_delete() {
        let storage = MemoryCacheStorage::new();
        assert!(!storage.has("v1").await.unwrap());

        storage.open("v1").await.unwrap();
        storage.open("v1").await.unwrap();
        assert!(storage.has("v1").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["v1"]);

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let storage = MemoryCacheStorage::new();
        for name in ["c", "a", "b"] {
            storage.open(name).await.unwrap();
        }
        assert_eq!(storage.keys().await.unwrap(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_match_across_caches_prefers_oldest() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        storage
            .put_all("v1", vec![entry("https://app.test/", "one")])
            .await
            .unwrap();
        storage
            .put_all("v2", vec![entry("https://app.test/", "two")])
            .await
            .unwrap();

        let request = Request::parse("https://app.test/").unwrap();
        let any = storage.match_request(&request, None).await.unwrap().unwrap();
        assert_eq!(any.body, b"one");

        let scoped = storage
            .match_request(&request, Some("v2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scoped.body, b"two");

        assert!(storage
            .match_request(&request, Some("v3"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_all_into_missing_cache() {
        let storage = MemoryCacheStorage::new();
        let err = storage
            .put_all("nope", vec![entry("https://app.test/", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NotFound(name) if name == "nope"));
    }
}
