//! Client side of the service registry
//!
//! Keeps a service instance registered by posting its registration on a
//! fixed period until stopped.

pub mod heartbeat;

pub use heartbeat::{ClientError, HeartbeatClient, HeartbeatClientBuilder, DEFAULT_PERIOD, DEFAULT_TIMEOUT};
