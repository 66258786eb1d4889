//! # swcache worker
//!
//! An offline app-shell cache worker.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate and fetch events, skip waiting,
//!   client claim
//! - **Cache storage**: named, versioned buckets with in-memory and SQLite
//!   backends
//! - **App shell**: pre-cache on install, stale bucket cleanup on activate,
//!   cache-first fetch with network fallback
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     │
//!     ├── registration
//!     │       ├── installing (ServiceWorker + EventHandlers + WorkerScope)
//!     │       ├── waiting
//!     │       └── active
//!     ├── Clients
//!     └── events ──► UnboundedReceiver<ServiceWorkerEvent>
//!
//! WorkerScope
//!     ├── CacheStorage (caches)
//!     │       └── bucket ──► CacheEntry (Request → Response)
//!     └── Fetcher (network)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swcache_net::{HttpFetcher, LoaderConfig, Request};
//! use swcache_worker::{
//!     AppShell, AppShellConfig, FetchEvent, ServiceWorkerContainer, SqliteCacheStorage,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppShellConfig::new("https://app.example/".parse()?);
//! let caches = Arc::new(SqliteCacheStorage::new("caches.db")?);
//! let network = Arc::new(HttpFetcher::new(LoaderConfig::default())?);
//!
//! let (container, _events) =
//!     ServiceWorkerContainer::new(config.origin.clone(), caches, network);
//! container.register(AppShell::new(config)?.handlers()?).await?;
//!
//! let request = Request::parse("https://app.example/style.css")?;
//! let response = container.handle_fetch(FetchEvent::navigation(request)).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clients;
pub mod container;
pub mod handlers;
pub mod scope;
pub mod shell;
pub mod storage;
pub mod worker;

pub use cache::{cache_key, CacheEntry, CacheError};
pub use clients::{Client, ClientId, ClientType, Clients};
pub use container::{ServiceWorkerContainer, ServiceWorkerEvent};
pub use handlers::{
    ActivateHandler, EventHandlers, FetchEvent, FetchHandler, InstallHandler, LifecycleEvent,
};
pub use scope::WorkerScope;
pub use shell::{
    AppShell, AppShellConfig, CacheFirstFetch, LookupScope, PrecacheInstall, PruneActivate,
};
pub use storage::{Cache, CacheStorage, MemoryCacheStorage, SqliteCacheStorage};
pub use worker::{ServiceWorker, WorkerId, WorkerState};

use swcache_common::CommonError;
use swcache_net::NetError;
use thiserror::Error;

/// Errors raised by the worker host and its handlers.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install of {worker} failed: {source}")]
    InstallFailed {
        worker: WorkerId,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Activation of {worker} failed: {source}")]
    ActivateFailed {
        worker: WorkerId,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("No response for {0}")]
    NoResponse(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl WorkerError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            WorkerError::InstallFailed { .. } => "install",
            WorkerError::ActivateFailed { .. } => "activate",
            WorkerError::Cache(_) => "cache",
            WorkerError::Network(_) => "network",
            WorkerError::NoResponse(_) => "no_response",
            WorkerError::StateError(_) => "state",
            WorkerError::Config(_) => "config",
            WorkerError::Common(e) => e.category(),
        }
    }

    /// Whether the error came from the network layer, directly or through
    /// the cache.
    pub fn is_network(&self) -> bool {
        match self {
            WorkerError::Network(_) => true,
            WorkerError::Cache(CacheError::Network { .. }) => true,
            WorkerError::InstallFailed { source, .. }
            | WorkerError::ActivateFailed { source, .. } => source.is_network(),
            _ => false,
        }
    }
}
