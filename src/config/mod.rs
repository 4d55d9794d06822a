//! Configuration management for laozi
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use laozi::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LAOZI__<section>__<key>`
//!
//! Examples:
//! - `LAOZI__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `LAOZI__ARCHIVER__IDLE_TIMEOUT=30s`
//! - `LAOZI__PARTITION__STRATEGY=json_field`
//!
//! S3 credentials are read only from `S3_ACCESS_KEY`/`S3_SECRET_KEY`
//! (or `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/laozi.toml`.
//! This can be overridden using the `LAOZI_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

use std::sync::Arc;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    ArchiverSettings, Config, PartitionConfig, PartitionStrategy, ServerConfig, StorageConfig,
    StorageProvider,
};
pub use validation::ValidationError;

use crate::archiver::ArchiverConfig;
use crate::partition;
use crate::writer::WriterFactory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`LAOZI__*`)
    /// 2. TOML file (default: `config/laozi.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Secrets are still taken from the environment.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Archiver settings combined with the configured partition strategy
    pub fn archiver_config(&self, writer_factory: Arc<dyn WriterFactory>) -> ArchiverConfig {
        ArchiverConfig::new(writer_factory, partition::from_config(&self.partition))
            .with_idle_timeout(self.archiver.idle_timeout.as_duration())
            .with_ingestion_capacity(self.archiver.ingestion_capacity)
    }
}
