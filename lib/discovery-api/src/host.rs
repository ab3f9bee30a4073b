//! Registered hosts and lookup responses
use serde::{Deserialize, Serialize};

/// Routing metadata attached to a host
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tags {
    /// Availability zone
    pub az: String,
    /// Relative weight in [1, 100]; 0 means unset
    pub load_balancing_weight: u32,
}

/// A registered instance of a service.
///
/// Identity is (environment, service, ip_address, port). The environment is
/// process-wide and never stored on the host itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub service: String,
    pub ip_address: String,
    pub port: u16,
    pub service_repo_name: String,
    pub revision: String,
    /// Epoch milliseconds, set by the registry on every registration
    pub last_check_in: String,
    pub tags: Tags,
}

impl Host {
    /// `ip:port` of the endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

/// Response body for both lookup endpoints
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceGetResponse {
    pub env: String,
    pub service: String,
    pub hosts: Vec<Host>,
}

impl ServiceGetResponse {
    /// Build a response; `service` is taken from the first host, if any
    pub fn new(env: impl Into<String>, hosts: Vec<Host>) -> Self {
        let service = hosts
            .first()
            .map(|h| h.service.clone())
            .unwrap_or_default();
        Self {
            env: env.into(),
            service,
            hosts,
        }
    }
}
