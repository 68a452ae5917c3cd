//! Configuration management for DocRefinery.
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use docrefinery::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DOCREFINERY__<section>__<key>`
//!
//! Examples:
//! - `DOCREFINERY__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `DOCREFINERY__RETENTION__DOCUMENT_TTL_DAYS=14`
//! - `DOCREFINERY__SERVER__API__MAX_UPLOAD_BYTES=250MB`
//!
//! Secrets (`auth.key_secret`, `auth.internal_token`) are never read from the
//! TOML file, only from `DOCREFINERY_KEY_SECRET` / `DOCREFINERY_INTERNAL_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/docrefinery.toml`.
//! This can be overridden using the `DOCREFINERY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ApiLimits, AuthConfig, Config, DoclingConfig, RetentionConfig, ScannerConfig, ServerConfig,
    TelemetryConfig, WebhookConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    ///
    /// Priority, highest to lowest:
    /// 1. Environment variables (`DOCREFINERY__*`)
    /// 2. TOML file (default: `config/docrefinery.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path. Useful for testing with
    /// custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
