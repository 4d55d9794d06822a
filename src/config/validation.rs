use super::models::{Config, PartitionStrategy, StorageProvider};
use crate::archiver::MAX_IDLE_TIMEOUT;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("archiver.idle_timeout must be positive")]
    ZeroIdleTimeout,

    #[error("archiver.idle_timeout must not exceed {}", crate::humanize::HumanDuration(MAX_IDLE_TIMEOUT))]
    IdleTimeoutTooLarge,

    #[error("Partition strategy 'static' requires partition.key")]
    MissingStaticKey,

    #[error("Partition strategy 'json_field' requires partition.field")]
    MissingJsonField,

    #[error("Storage provider is S3 but bucket is empty")]
    MissingBucket,

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Storage provider is local but storage.root is not set")]
    MissingLocalRoot,

    #[error("server.max_body_bytes must be positive")]
    InvalidMaxBodyBytes,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_archiver(config)?;
    validate_partition(config)?;
    validate_storage(config)?;
    validate_server(config)?;
    Ok(())
}

fn validate_archiver(config: &Config) -> Result<(), ValidationError> {
    let idle_timeout = config.archiver.idle_timeout.as_duration();
    if idle_timeout.is_zero() {
        return Err(ValidationError::ZeroIdleTimeout);
    }
    if idle_timeout > MAX_IDLE_TIMEOUT {
        return Err(ValidationError::IdleTimeoutTooLarge);
    }
    Ok(())
}

fn validate_partition(config: &Config) -> Result<(), ValidationError> {
    let partition = &config.partition;
    match partition.strategy {
        PartitionStrategy::Static => {
            if partition.key.as_deref().is_none_or(str::is_empty) {
                return Err(ValidationError::MissingStaticKey);
            }
        }
        PartitionStrategy::JsonField => {
            if partition.field.as_deref().is_none_or(str::is_empty) {
                return Err(ValidationError::MissingJsonField);
            }
        }
    }
    Ok(())
}

/// Validate provider specific settings
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    match config.storage.provider {
        StorageProvider::Memory => {}
        StorageProvider::Local => {
            if config.storage.root.is_none() {
                return Err(ValidationError::MissingLocalRoot);
            }
        }
        StorageProvider::S3 => {
            if config.storage.bucket.is_empty() {
                return Err(ValidationError::MissingBucket);
            }
            if config.storage.access_key.is_none() || config.storage.secret_key.is_none() {
                return Err(ValidationError::MissingS3Credentials);
            }
        }
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidMaxBodyBytes);
    }
    Ok(())
}
