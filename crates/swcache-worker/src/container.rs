//! The host side of the worker lifecycle.
//!
//! The container owns the installing/waiting/active slots, dispatches
//! lifecycle events to registered handlers and routes fetches from
//! controlled clients. It holds no caching logic of its own.

use std::sync::Arc;

use swcache_net::{Fetcher, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clients::{ClientId, ClientType, Clients};
use crate::handlers::{EventHandlers, FetchEvent};
use crate::scope::WorkerScope;
use crate::storage::CacheStorage;
use crate::worker::{ServiceWorker, WorkerId, WorkerState};
use crate::WorkerError;

/// Service worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// A new worker started installing.
    UpdateFound { worker_id: WorkerId },
    /// State changed.
    StateChange {
        worker_id: WorkerId,
        new_state: WorkerState,
    },
    /// Controller changed.
    ControllerChange {
        client_id: ClientId,
        worker_id: WorkerId,
    },
}

struct WorkerSlot {
    worker: ServiceWorker,
    handlers: EventHandlers,
    scope: Arc<WorkerScope>,
}

#[derive(Default)]
struct Registration {
    installing: Option<WorkerSlot>,
    waiting: Option<WorkerSlot>,
    active: Option<WorkerSlot>,
}

/// Service worker container for one scope.
pub struct ServiceWorkerContainer {
    scope: Url,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    clients: Arc<RwLock<Clients>>,
    registration: RwLock<Registration>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container.
    pub fn new(
        scope: Url,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                scope,
                caches,
                network,
                clients: Arc::new(RwLock::new(Clients::new())),
                registration: RwLock::new(Registration::default()),
                event_tx,
            },
            event_rx,
        )
    }

    /// Scope URL.
    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Shared client set.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    /// Shared cache storage.
    pub fn caches(&self) -> Arc<dyn CacheStorage> {
        Arc::clone(&self.caches)
    }

    /// The active worker, if any.
    pub async fn active(&self) -> Option<ServiceWorker> {
        let registration = self.registration.read().await;
        registration.active.as_ref().map(|slot| slot.worker.clone())
    }

    /// The installed worker waiting to activate, if any.
    pub async fn waiting(&self) -> Option<ServiceWorker> {
        let registration = self.registration.read().await;
        registration.waiting.as_ref().map(|slot| slot.worker.clone())
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        let _ = self.event_tx.send(event);
    }

    fn transition(&self, worker: &mut ServiceWorker, state: WorkerState) {
        worker.set_state(state);
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id: worker.id,
            new_state: state,
        });
    }

    /// Open a client. Clients opened under an active worker are controlled
    /// by it.
    pub async fn connect_client(&self, url: Url, client_type: ClientType) -> ClientId {
        let controller = match self.active().await {
            Some(worker) if url.as_str().starts_with(self.scope.as_str()) => Some(worker.id),
            _ => None,
        };
        self.clients.write().await.add(url, client_type, controller)
    }

    /// Close a client. When the active worker loses its last client, a
    /// waiting worker takes over.
    pub async fn disconnect_client(&self, id: ClientId) -> bool {
        if self.clients.write().await.remove(id).is_none() {
            return false;
        }

        let idle_active = {
            let registration = self.registration.read().await;
            match (&registration.waiting, &registration.active) {
                (Some(_), Some(active)) => Some(active.worker.id),
                _ => None,
            }
        };

        if let Some(active) = idle_active {
            if self.clients.read().await.controlled_by(active) == 0 {
                info!(worker = %active, "Last client closed, activating waiting worker");
                if let Err(e) = self.activate_waiting().await {
                    error!(category = e.category(), error = %e, "Waiting worker activation failed");
                }
            }
        }
        true
    }

    /// Register a new worker version: install it, then activate it when it
    /// asked to skip waiting or when nothing is active yet.
    ///
    /// An install failure leaves the previous worker in charge and marks the
    /// new one redundant.
    pub async fn register(&self, handlers: EventHandlers) -> Result<WorkerId, WorkerError> {
        let mut worker = ServiceWorker::new();
        let id = worker.id;
        let scope = Arc::new(WorkerScope::new(
            id,
            self.scope.clone(),
            Arc::clone(&self.caches),
            Arc::clone(&self.network),
            Arc::clone(&self.clients),
            self.event_tx.clone(),
        ));

        info!(worker = %id, scope = %self.scope, "Installing");
        self.emit(ServiceWorkerEvent::UpdateFound { worker_id: id });
        self.transition(&mut worker, WorkerState::Installing);

        {
            let mut registration = self.registration.write().await;
            if let Some(mut replaced) = registration.installing.take() {
                self.transition(&mut replaced.worker, WorkerState::Redundant);
            }
            registration.installing = Some(WorkerSlot {
                worker,
                handlers: handlers.clone(),
                scope: Arc::clone(&scope),
            });
        }

        let installed = match handlers.install {
            Some(ref handler) => handler.install(&scope).await,
            None => Ok(()),
        };

        let mut registration = self.registration.write().await;
        let mut slot = match registration.installing.take() {
            Some(slot) if slot.worker.id == id => slot,
            other => {
                registration.installing = other;
                return Err(WorkerError::StateError(format!(
                    "{id} was replaced while installing"
                )));
            }
        };

        if let Err(e) = installed {
            error!(worker = %id, category = e.category(), error = %e, "Install failed");
            self.transition(&mut slot.worker, WorkerState::Redundant);
            return Err(WorkerError::InstallFailed {
                worker: id,
                source: Box::new(e),
            });
        }

        self.transition(&mut slot.worker, WorkerState::Installed);
        if let Some(mut replaced) = registration.waiting.replace(slot) {
            self.transition(&mut replaced.worker, WorkerState::Redundant);
        }

        let activate_now = scope.skip_waiting_requested() || registration.active.is_none();
        drop(registration);

        if activate_now {
            self.activate_waiting().await?;
        } else {
            info!(worker = %id, "Installed, waiting for clients of the active worker");
        }

        Ok(id)
    }

    /// Activate the waiting worker, replacing the active one.
    ///
    /// The worker becomes active even when its activate handler fails; the
    /// failure is returned so the host can report it.
    pub async fn activate_waiting(&self) -> Result<(), WorkerError> {
        let (id, previous, handlers, scope) = {
            let mut registration = self.registration.write().await;
            let mut slot = registration
                .waiting
                .take()
                .ok_or_else(|| WorkerError::StateError("no waiting worker".to_string()))?;

            self.transition(&mut slot.worker, WorkerState::Activating);

            let previous = registration.active.take().map(|mut old| {
                self.transition(&mut old.worker, WorkerState::Redundant);
                old.worker.id
            });

            let out = (
                slot.worker.id,
                previous,
                slot.handlers.clone(),
                Arc::clone(&slot.scope),
            );
            registration.active = Some(slot);
            out
        };

        info!(worker = %id, "Activating");

        if let Some(previous) = previous {
            let moved = self.clients.write().await.hand_over(previous, id);
            for client_id in moved {
                self.emit(ServiceWorkerEvent::ControllerChange {
                    client_id,
                    worker_id: id,
                });
            }
        }

        let activated = match handlers.activate {
            Some(ref handler) => handler.activate(&scope).await,
            None => Ok(()),
        };

        {
            let mut registration = self.registration.write().await;
            if let Some(slot) = registration.active.as_mut().filter(|s| s.worker.id == id) {
                self.transition(&mut slot.worker, WorkerState::Activated);
            }
        }

        activated.map_err(|e| {
            error!(worker = %id, category = e.category(), error = %e, "Activation failed");
            WorkerError::ActivateFailed {
                worker: id,
                source: Box::new(e),
            }
        })
    }

    /// Route a request from a view.
    ///
    /// Requests from controlled clients, and navigations in scope while a
    /// worker is active, go to the worker's fetch handler. Everything else
    /// goes straight to the network.
    pub async fn handle_fetch(&self, event: FetchEvent) -> Result<Response, WorkerError> {
        let controlled = self.controller_for(&event).await;

        let Some((handlers, scope)) = controlled else {
            debug!(url = %event.request.url, "Uncontrolled request, using network");
            return Ok(self.network.fetch(&event.request).await?);
        };

        let Some(handler) = handlers.fetch else {
            return Ok(self.network.fetch(&event.request).await?);
        };

        handler.fetch(&scope, &event).await.ok_or_else(|| {
            warn!(url = %event.request.url, "Fetch handler produced no response");
            WorkerError::NoResponse(event.request.url.to_string())
        })
    }

    async fn controller_for(
        &self,
        event: &FetchEvent,
    ) -> Option<(EventHandlers, Arc<WorkerScope>)> {
        let controlled = match event.client_id {
            Some(client_id) => {
                let clients = self.clients.read().await;
                clients
                    .get(client_id)
                    .is_some_and(|client| client.controller.is_some())
            }
            None => {
                event.is_navigation
                    && event.request.url.as_str().starts_with(self.scope.as_str())
            }
        };
        if !controlled {
            return None;
        }

        let registration = self.registration.read().await;
        registration
            .active
            .as_ref()
            .map(|slot| (slot.handlers.clone(), Arc::clone(&slot.scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ActivateHandler, FetchHandler, InstallHandler};
    use crate::storage::MemoryCacheStorage;
    use async_trait::async_trait;
    use http::StatusCode;
    use swcache_net::{MockFetcher, Request};

    struct SkipWaiting;

    #[async_trait]
    impl InstallHandler for SkipWaiting {
        async fn install(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
            scope.skip_waiting();
            Ok(())
        }
    }

    struct FailInstall;

    #[async_trait]
    impl InstallHandler for FailInstall {
        async fn install(&self, _scope: &WorkerScope) -> Result<(), WorkerError> {
            Err(WorkerError::StateError("boom".into()))
        }
    }

    struct Claim;

    #[async_trait]
    impl ActivateHandler for Claim {
        async fn activate(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
            scope.claim_clients().await;
            Ok(())
        }
    }

    struct Teapot;

    #[async_trait]
    impl FetchHandler for Teapot {
        async fn fetch(&self, _scope: &WorkerScope, event: &FetchEvent) -> Option<Response> {
            Some(Response::new(
                event.request.url.clone(),
                StatusCode::IM_A_TEAPOT,
                "",
            ))
        }
    }

    fn container() -> (
        ServiceWorkerContainer,
        mpsc::UnboundedReceiver<ServiceWorkerEvent>,
        Arc<MockFetcher>,
    ) {
        let net = Arc::new(MockFetcher::new());
        let (container, rx) = ServiceWorkerContainer::new(
            Url::parse("https://app.test/").unwrap(),
            Arc::new(MemoryCacheStorage::new()),
            net.clone(),
        );
        (container, rx, net)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServiceWorkerEvent>) -> Vec<ServiceWorkerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_first_worker_activates_immediately() {
        let (container, mut rx, _) = container();
        let id = container.register(EventHandlers::new()).await.unwrap();

        let active = container.active().await.unwrap();
        assert_eq!(active.id, id);
        assert!(active.is_active());

        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ServiceWorkerEvent::StateChange { new_state, .. } => Some(new_state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated,
            ]
        );
    }

    #[tokio::test]
    async fn test_second_worker_waits_without_skip_waiting() {
        let (container, _rx, _) = container();
        let first = container.register(EventHandlers::new()).await.unwrap();
        let second = container.register(EventHandlers::new()).await.unwrap();

        assert_eq!(container.active().await.unwrap().id, first);
        assert_eq!(container.waiting().await.unwrap().id, second);

        container.activate_waiting().await.unwrap();
        assert_eq!(container.active().await.unwrap().id, second);
        assert!(container.waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_skip_waiting_preempts_active_and_moves_clients() {
        let (container, _rx, _) = container();
        let first = container.register(EventHandlers::new()).await.unwrap();
        let client = container
            .connect_client(Url::parse("https://app.test/").unwrap(), ClientType::Window)
            .await;

        let second = container
            .register(EventHandlers::new().on_install(SkipWaiting))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(container.active().await.unwrap().id, second);
        let clients = container.clients();
        assert_eq!(clients.read().await.get(client).unwrap().controller, Some(second));
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_worker() {
        let (container, mut rx, _) = container();
        let first = container.register(EventHandlers::new()).await.unwrap();
        drain(&mut rx);

        let err = container
            .register(EventHandlers::new().on_install(FailInstall))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::InstallFailed { .. }));
        assert_eq!(container.active().await.unwrap().id, first);
        assert!(container.waiting().await.is_none());
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            ServiceWorkerEvent::StateChange {
                new_state: WorkerState::Redundant,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_claim_takes_uncontrolled_clients() {
        let (container, mut rx, _) = container();
        let client = container
            .connect_client(Url::parse("https://app.test/page").unwrap(), ClientType::Window)
            .await;

        let id = container
            .register(EventHandlers::new().on_activate(Claim))
            .await
            .unwrap();

        let clients = container.clients();
        assert_eq!(clients.read().await.get(client).unwrap().controller, Some(id));
        assert!(drain(&mut rx).contains(&ServiceWorkerEvent::ControllerChange {
            client_id: client,
            worker_id: id,
        }));
    }

    #[tokio::test]
    async fn test_uncontrolled_requests_bypass_worker() {
        let (container, _rx, net) = container();
        let url = Url::parse("https://app.test/data.json").unwrap();
        net.route(&url, "{}");

        let client = container
            .connect_client(Url::parse("https://app.test/").unwrap(), ClientType::Window)
            .await;
        container
            .register(EventHandlers::new().on_fetch(Teapot))
            .await
            .unwrap();

        // Opened before any worker and never claimed.
        let response = container
            .handle_fetch(FetchEvent::from_client(Request::get(url.clone()), client))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        // Navigations in scope go through the active worker.
        let response = container
            .handle_fetch(FetchEvent::navigation(Request::get(url)))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_waiting_worker_activates_when_last_client_closes() {
        let (container, _rx, _) = container();
        let first = container.register(EventHandlers::new()).await.unwrap();
        let a = container
            .connect_client(Url::parse("https://app.test/a").unwrap(), ClientType::Window)
            .await;
        let b = container
            .connect_client(Url::parse("https://app.test/b").unwrap(), ClientType::Window)
            .await;

        let second = container.register(EventHandlers::new()).await.unwrap();
        assert_eq!(container.waiting().await.unwrap().id, second);

        assert!(container.disconnect_client(a).await);
        assert_eq!(container.active().await.unwrap().id, first);

        assert!(container.disconnect_client(b).await);
        assert_eq!(container.active().await.unwrap().id, second);
        assert!(container.waiting().await.is_none());
        assert!(!container.disconnect_client(b).await);
    }

    #[tokio::test]
    async fn test_activate_without_waiting_worker() {
        let (container, _rx, _) = container();
        assert!(matches!(
            container.activate_waiting().await,
            Err(WorkerError::StateError(_))
        ));
    }
}
