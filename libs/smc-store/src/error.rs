//! Storage error types

use thiserror::Error;

/// Storage layer error type. Both backends surface failures through this
/// one taxonomy; nothing backend-specific leaks past the facade.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("operation already in progress for subscribers {0:?}")]
    OperationInProgress(Vec<String>),

    #[error("optimistic write conflict; retry from a fresh read")]
    WriteConflict,

    #[error("subscriber {0} not found")]
    SubscriberNotFound(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
