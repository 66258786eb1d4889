//! App shell configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use swcache_net::Request;
use url::Url;

use crate::WorkerError;

/// Where the fetch handler looks for cached responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupScope {
    /// Search every bucket, oldest first.
    #[default]
    AllCaches,
    /// Search only the bucket named by the current version.
    CurrentCache,
}

fn default_cache_prefix() -> String {
    "simple-pwa-cache-".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_assets() -> Vec<String> {
    [
        "/",
        "/style.css",
        "/script.js",
        "/manifest.json",
        "/icons/icon-192x192.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// App shell configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppShellConfig {
    /// Origin the asset paths are resolved against; also the worker scope.
    pub origin: Url,

    /// Bucket name prefix.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deployment version. Bumping it invalidates every older bucket.
    #[serde(default = "default_version")]
    pub version: String,

    /// App shell asset paths, pre-cached on install.
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Fetch lookup scope.
    #[serde(default)]
    pub lookup: LookupScope,
}

impl AppShellConfig {
    /// Configuration with default version and asset list for `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            assets: default_assets(),
            lookup: LookupScope::default(),
        }
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replace the asset list.
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the lookup scope.
    pub fn with_lookup(mut self, lookup: LookupScope) -> Self {
        self.lookup = lookup;
        self
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, WorkerError> {
        Ok(swcache_common::from_json_str(json)?)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkerError> {
        Ok(swcache_common::load_json(path)?)
    }

    /// Name of the current bucket.
    pub fn cache_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.version)
    }

    /// Asset paths resolved against the origin.
    pub fn asset_urls(&self) -> Result<Vec<Url>, WorkerError> {
        self.assets
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map_err(|e| WorkerError::Config(format!("asset {path:?}: {e}")))
            })
            .collect()
    }

    /// GET requests for every asset.
    pub fn asset_requests(&self) -> Result<Vec<Request>, WorkerError> {
        Ok(self.asset_urls()?.into_iter().map(Request::get).collect())
    }
}
