//! The app shell worker: versioned pre-cache, stale bucket cleanup and
//! cache-first fetch.

mod activate;
mod config;
mod fetch;
mod install;

pub use activate::PruneActivate;
pub use config::{AppShellConfig, LookupScope};
pub use fetch::CacheFirstFetch;
pub use install::PrecacheInstall;

use crate::handlers::EventHandlers;
use crate::WorkerError;

/// Composes the three app shell handlers from a configuration.
#[derive(Debug, Clone)]
pub struct AppShell {
    config: AppShellConfig,
}

impl AppShell {
    /// Validate the configuration and build the shell.
    pub fn new(config: AppShellConfig) -> Result<Self, WorkerError> {
        config.asset_urls()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppShellConfig {
        &self.config
    }

    /// Handlers for `install`, `activate` and `fetch`.
    pub fn handlers(&self) -> Result<EventHandlers, WorkerError> {
        let cache_name = self.config.cache_name();

        let fetch = match self.config.lookup {
            LookupScope::AllCaches => CacheFirstFetch::all_caches(),
            LookupScope::CurrentCache => CacheFirstFetch::in_cache(cache_name.clone()),
        };

        Ok(EventHandlers::new()
            .on_install(PrecacheInstall::new(
                cache_name.clone(),
                self.config.asset_urls()?,
            ))
            .on_activate(PruneActivate::new(vec![cache_name]))
            .on_fetch(fetch))
    }
}
