//! Core service registry functionality
//!
//! This library provides:
//! - Key-space layout mapping host identities onto a key-value store
//! - Backing store abstraction with Redis and in-memory implementations
//! - Scan-and-apply iteration over cursor-based prefix scans
//! - Service registry keeping the service and repo indexes coherent

pub mod error;
pub mod keyspace;
pub mod registry;
pub mod scan;
pub mod store;

pub use error::{CoreError, Result};
pub use keyspace::{KeySpace, HOST_TTL};
pub use registry::{PortSelector, ServiceRegistry};
pub use store::{KeyValueStore, MemoryStore, RedisStore, ScanBatch, WriteOp};
