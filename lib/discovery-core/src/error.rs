use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Host not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Entry {0} disappeared between scan and read")]
    Vanished(String),

    #[error("Repo entry {repo_key} points at missing host {service_key}")]
    DanglingReference {
        repo_key: String,
        service_key: String,
    },

    #[error("{source} ({matched} matched)")]
    Partial {
        matched: usize,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// The operation matched nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// Identities matched before a bulk operation failed
    pub fn matched(&self) -> usize {
        match self {
            CoreError::Partial { matched, .. } => *matched,
            _ => 0,
        }
    }
}
