use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub archiver: ArchiverSettings,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Router and reaper settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiverSettings {
    /// Writers idle this long are closed and evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: HumanDuration,
    #[serde(default = "default_ingestion_capacity")]
    pub ingestion_capacity: usize,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            ingestion_capacity: default_ingestion_capacity(),
        }
    }
}

fn default_idle_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(60))
}

fn default_ingestion_capacity() -> usize {
    1024
}

/// How partition keys are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Every event goes to `key`
    #[default]
    Static,
    /// Value of the top-level JSON `field`
    JsonField,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionConfig {
    #[serde(default)]
    pub strategy: PartitionStrategy,
    pub key: Option<String>,
    pub field: Option<String>,
    /// Prefix keys with the UTC date as `YYYY/MM/DD/`
    #[serde(default)]
    pub date_prefix: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            strategy: PartitionStrategy::Static,
            key: Some("events".to_string()),
            field: None,
            date_prefix: false,
        }
    }
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Process memory, lost on exit; for tests and dry runs
    Memory,
    #[default]
    Local,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Prepended to each partition key to form the object key
    #[serde(default)]
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Root directory for the local provider
    #[serde(default = "default_root")]
    pub root: Option<PathBuf>,
    /// Written after every event
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: default_bucket(),
            prefix: String::new(),
            region: None,
            endpoint: None,
            root: default_root(),
            delimiter: default_delimiter(),
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_bucket() -> String {
    "laozi-archive".to_string()
}

fn default_root() -> Option<PathBuf> {
    Some(PathBuf::from("data/archive"))
}

fn default_delimiter() -> String {
    "\n".to_string()
}

/// HTTP ingestion server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(5 * 1024 * 1024) // 5 MB
}
