//! Configuration loading helpers.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::{CommonError, Result};

/// Application directory name under the platform data dir.
const APP_DIR: &str = "swcache";

/// Parse a configuration value from a JSON string.
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| CommonError::config_with_source("invalid JSON configuration", e))
}

/// Load a configuration value from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading configuration");

    let raw = std::fs::read_to_string(path).map_err(|source| CommonError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|e| {
        CommonError::config_with_source(format!("invalid configuration in {}", path.display()), e)
    })
}

/// Default directory for persistent cache data.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
