//! Install: pre-cache the app shell.

use async_trait::async_trait;
use tracing::info;
use url::Url;

use swcache_net::Request;

use crate::handlers::InstallHandler;
use crate::scope::WorkerScope;
use crate::WorkerError;

/// Opens the current bucket, stores every app shell asset, then skips
/// waiting. Any failed asset fails the install.
#[derive(Debug, Clone)]
pub struct PrecacheInstall {
    cache_name: String,
    assets: Vec<Url>,
}

impl PrecacheInstall {
    pub fn new(cache_name: impl Into<String>, assets: Vec<Url>) -> Self {
        Self {
            cache_name: cache_name.into(),
            assets,
        }
    }
}

#[async_trait]
impl InstallHandler for PrecacheInstall {
    async fn install(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
        info!(
            worker = %scope.worker_id(),
            scope = %scope.scope_url(),
            cache = %self.cache_name,
            "Installing"
        );

        let caches = scope.caches();
        caches.open(&self.cache_name).await?;

        info!(cache = %self.cache_name, assets = self.assets.len(), "Caching app shell");
        let requests: Vec<Request> = self.assets.iter().cloned().map(Request::get).collect();
        caches
            .add_all(&self.cache_name, scope.network(), &requests)
            .await?;

        scope.skip_waiting();
        Ok(())
    }
}
