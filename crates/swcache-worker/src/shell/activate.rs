//! Activate: drop every bucket but the current one, then claim clients.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::info;

use crate::handlers::ActivateHandler;
use crate::scope::WorkerScope;
use crate::WorkerError;

#[derive(Debug, Clone)]
pub struct PruneActivate {
    keep: Vec<String>,
}

impl PruneActivate {
    /// Keep only the buckets named in `keep`.
    pub fn new(keep: Vec<String>) -> Self {
        Self { keep }
    }
}

#[async_trait]
impl ActivateHandler for PruneActivate {
    async fn activate(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
        info!(worker = %scope.worker_id(), "Activating");

        let caches = scope.caches();
        let stale: Vec<String> = caches
            .keys()
            .await?
            .into_iter()
            .filter(|name| !self.keep.contains(name))
            .collect();

        // Every deletion settles, even after a sibling fails. Any failure
        // skips the claim.
        let deleted = join_all(stale.iter().map(|name| async move {
            info!(cache = %name, "Deleting old cache");
            caches.delete(name).await
        }))
        .await;
        deleted.into_iter().collect::<Result<Vec<_>, _>>()?;

        scope.claim_clients().await;
        Ok(())
    }
}
