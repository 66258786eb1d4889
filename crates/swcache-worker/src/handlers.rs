//! Lifecycle event handlers and their registration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use swcache_net::{Request, Response};

use crate::clients::ClientId;
use crate::scope::WorkerScope;
use crate::WorkerError;

/// Lifecycle events a worker can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Fetch => "fetch",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch event.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The intercepted request.
    pub request: Request,

    /// Client that issued the request, if any.
    pub client_id: Option<ClientId>,

    /// Is navigation request.
    pub is_navigation: bool,
}

impl FetchEvent {
    /// A subresource request issued by `client_id`.
    pub fn from_client(request: Request, client_id: ClientId) -> Self {
        Self {
            request,
            client_id: Some(client_id),
            is_navigation: false,
        }
    }

    /// A top-level navigation.
    pub fn navigation(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            is_navigation: true,
        }
    }
}

/// Handles the `install` event. The host waits for the returned future.
#[async_trait]
pub trait InstallHandler: Send + Sync {
    async fn install(&self, scope: &WorkerScope) -> Result<(), WorkerError>;
}

/// Handles the `activate` event. The host waits for the returned future.
#[async_trait]
pub trait ActivateHandler: Send + Sync {
    async fn activate(&self, scope: &WorkerScope) -> Result<(), WorkerError>;
}

/// Handles `fetch` events.
///
/// `None` means the handler settled without a response; the requesting view
/// sees a failed request.
#[async_trait]
pub trait FetchHandler: Send + Sync {
    async fn fetch(&self, scope: &WorkerScope, event: &FetchEvent) -> Option<Response>;
}

/// Handlers registered against named lifecycle events.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) install: Option<Arc<dyn InstallHandler>>,
    pub(crate) activate: Option<Arc<dyn ActivateHandler>>,
    pub(crate) fetch: Option<Arc<dyn FetchHandler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the `install` handler.
    pub fn on_install(mut self, handler: impl InstallHandler + 'static) -> Self {
        self.install = Some(Arc::new(handler));
        self
    }

    /// Register the `activate` handler.
    pub fn on_activate(mut self, handler: impl ActivateHandler + 'static) -> Self {
        self.activate = Some(Arc::new(handler));
        self
    }

    /// Register the `fetch` handler.
    pub fn on_fetch(mut self, handler: impl FetchHandler + 'static) -> Self {
        self.fetch = Some(Arc::new(handler));
        self
    }

    /// Events that have a handler.
    pub fn registered(&self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        if self.install.is_some() {
            events.push(LifecycleEvent::Install);
        }
        if self.activate.is_some() {
            events.push(LifecycleEvent::Activate);
        }
        if self.fetch.is_some() {
            events.push(LifecycleEvent::Fetch);
        }
        events
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("registered", &self.registered())
            .finish()
    }
}
