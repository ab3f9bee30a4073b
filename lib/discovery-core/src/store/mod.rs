//! Backing key-value store
//!
//! The registry only relies on hash-field reads and writes, key expiry,
//! key deletion, cursor-based pattern scans and pipelined writes.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One command inside a write pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Set a hash field
    HSet {
        key: String,
        field: String,
        value: Vec<u8>,
    },
    /// Reset the expiry of a key
    Expire { key: String, ttl: Duration },
}

/// One page of a cursor scan. A `cursor` of 0 means the scan is complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanBatch {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Key-value store primitives used by the registry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Send every operation in one round trip. Not atomic.
    async fn pipeline(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Read one hash field; `None` when the key or field is absent
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key, returning how many keys were removed
    async fn del(&self, key: &str) -> Result<u64>;

    /// Continue a scan over keys matching `pattern`.
    ///
    /// The same key may be returned in more than one batch.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanBatch>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;
}
