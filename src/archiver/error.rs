use thiserror::Error;

/// Invalid archiver configuration, reported before any task is started
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiverConfigError {
    #[error("idle_timeout must not be zero")]
    ZeroIdleTimeout,

    #[error("idle_timeout must not exceed {max:?}")]
    IdleTimeoutTooLarge { max: std::time::Duration },

    #[error("partition key function must be provided")]
    MissingPartitionKey,

    #[error("writer factory must be provided")]
    MissingWriterFactory,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("ingestion channel is full")]
    Full,

    #[error("archiver is shut down")]
    Closed,
}
