use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    /// Another caller held the key's lock for longer than the configured wait
    #[error("couldn't get a lock in {timeout:?} for the key {key} at the cache {cache}")]
    LockTimeout {
        cache: String,
        key: String,
        timeout: Duration,
    },

    #[error("interrupted while waiting for the lock on key {key} at the cache {cache}")]
    LockInterrupted { cache: String, key: String },

    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
