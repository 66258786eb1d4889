//! # swcache Common
//!
//! Shared plumbing for the swcache crates.
//!
//! ## Features
//!
//! - Error type for configuration and logging setup
//! - Logging configuration on top of `tracing-subscriber`
//! - JSON configuration loading and default data locations

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{default_data_dir, from_json_str, load_json};
pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};

/// Errors raised by the shared plumbing.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Configuration could not be read or parsed.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The global subscriber was already installed or the filter was invalid.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl CommonError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CommonError::Config { .. } => "config",
            CommonError::Io { .. } => "io",
            CommonError::Logging(_) => "logging",
        }
    }
}

/// Result type alias for the shared plumbing.
pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(CommonError::config("bad").category(), "config");
        assert_eq!(CommonError::Logging("twice".into()).category(), "logging");
    }

    #[test]
    fn test_config_error_keeps_source() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = CommonError::config_with_source("parse failed", parse);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "Config error: parse failed");
    }
}
