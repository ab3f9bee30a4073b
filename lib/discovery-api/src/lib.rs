//! Wire types for the service discovery registry
//!
//! This library defines:
//! - Host: a registered instance of a service, as persisted and as served
//! - Request schemas for registration and load balancing weight updates
//! - Boundary validation shared by the server and its clients

pub mod host;
pub mod request;
pub mod validation;

pub use host::{Host, ServiceGetResponse, Tags};
pub use request::{ServicePostRequest, ServiceUpdateLoadBalancingRequest};
pub use validation::{ValidationError, ValidationErrors, KEY_DELIMITER};
