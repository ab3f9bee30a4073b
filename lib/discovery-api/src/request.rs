//! Typed request bodies and their decode/validate step

use crate::host::{Host, Tags};
use crate::validation::{
    check_required_segment, check_segment, check_weight, ValidationError, ValidationErrors,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/registration/{service}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePostRequest {
    pub ip: String,
    pub service_repo_name: String,
    pub port: u16,
    pub revision: String,
    pub tags: Tags,
}

impl ServicePostRequest {
    /// Decode a JSON body and validate it
    pub fn decode(body: &[u8]) -> Result<Self, ValidationErrors> {
        let request: Self = decode_json(body)?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = check_required_segment("ip", &self.ip) {
            errors.push(e);
        }
        if let Err(e) = check_segment("service_repo_name", &self.service_repo_name) {
            errors.push(e);
        }
        if self.tags.load_balancing_weight != 0 {
            if let Err(e) = check_weight(self.tags.load_balancing_weight) {
                errors.push(e);
            }
        }
        errors.into_result()
    }

    /// Build the host for `service`, stamped with `last_check_in` (epoch millis)
    pub fn into_host(self, service: impl Into<String>, last_check_in: i64) -> Host {
        Host {
            service: service.into(),
            ip_address: self.ip,
            port: self.port,
            service_repo_name: self.service_repo_name,
            revision: self.revision,
            last_check_in: last_check_in.to_string(),
            tags: self.tags,
        }
    }
}

/// Body of `POST /v1/loadbalancing/{service}/{ip}[/{port}]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceUpdateLoadBalancingRequest {
    pub load_balancing_weight: u32,
}

impl ServiceUpdateLoadBalancingRequest {
    pub fn decode(body: &[u8]) -> Result<Self, ValidationErrors> {
        let request: Self = decode_json(body)?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        check_weight(self.load_balancing_weight).map_err(ValidationErrors::from)
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ValidationErrors> {
    serde_json::from_slice(body)
        .map_err(|e| ValidationErrors::from(ValidationError::MalformedBody(e.to_string())))
}
