//! The global scope a worker's handlers run against.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use swcache_net::Fetcher;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use url::Url;

use crate::clients::Clients;
use crate::container::ServiceWorkerEvent;
use crate::storage::CacheStorage;
use crate::worker::WorkerId;

/// Collaborators and host hooks available to one worker's handlers.
pub struct WorkerScope {
    worker_id: WorkerId,
    scope_url: Url,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    clients: Arc<RwLock<Clients>>,
    skip_waiting: AtomicBool,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl WorkerScope {
    pub(crate) fn new(
        worker_id: WorkerId,
        scope_url: Url,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
        clients: Arc<RwLock<Clients>>,
        event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
    ) -> Self {
        Self {
            worker_id,
            scope_url,
            caches,
            network,
            clients,
            skip_waiting: AtomicBool::new(false),
            event_tx,
        }
    }

    /// ID of the worker this scope belongs to.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// URL prefix this worker controls.
    pub fn scope_url(&self) -> &Url {
        &self.scope_url
    }

    /// Cache storage (`caches`).
    pub fn caches(&self) -> &dyn CacheStorage {
        self.caches.as_ref()
    }

    /// Network collaborator (`fetch`).
    pub fn network(&self) -> &dyn Fetcher {
        self.network.as_ref()
    }

    /// Ask the host to activate this worker as soon as it is installed.
    pub fn skip_waiting(&self) {
        debug!(worker = %self.worker_id, "Skip waiting requested");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Whether [`skip_waiting`](Self::skip_waiting) was called.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Take control of every client in scope. Returns how many changed.
    pub async fn claim_clients(&self) -> usize {
        let claimed = self
            .clients
            .write()
            .await
            .claim(self.worker_id, &self.scope_url);

        for client_id in &claimed {
            let _ = self.event_tx.send(ServiceWorkerEvent::ControllerChange {
                client_id: *client_id,
                worker_id: self.worker_id,
            });
        }

        debug!(worker = %self.worker_id, claimed = claimed.len(), "Clients claimed");
        claimed.len()
    }
}
