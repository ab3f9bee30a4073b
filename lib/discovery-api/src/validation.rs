//! Boundary validation for identity components and request fields

use std::fmt;
use thiserror::Error;

/// Delimiter joining key-space segments in the backing store
pub const KEY_DELIMITER: char = ':';

pub const MIN_LOAD_BALANCING_WEIGHT: u32 = 1;
pub const MAX_LOAD_BALANCING_WEIGHT: u32 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} cannot contain {}", KEY_DELIMITER)]
    ContainsDelimiter { field: &'static str },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error(
        "Host weight must be an integer between {} and {}",
        MIN_LOAD_BALANCING_WEIGHT,
        MAX_LOAD_BALANCING_WEIGHT
    )]
    WeightOutOfRange(u32),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("malformed path segment: {0}")]
    MalformedPath(String),
}

/// Every validation failure found in one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Reject a key-space segment that contains the delimiter
pub fn check_segment(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains(KEY_DELIMITER) {
        return Err(ValidationError::ContainsDelimiter { field });
    }
    Ok(())
}

/// Like [`check_segment`], but an empty value is also rejected
pub fn check_required_segment(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    check_segment(field, value)
}

pub fn check_weight(weight: u32) -> Result<(), ValidationError> {
    if !(MIN_LOAD_BALANCING_WEIGHT..=MAX_LOAD_BALANCING_WEIGHT).contains(&weight) {
        return Err(ValidationError::WeightOutOfRange(weight));
    }
    Ok(())
}

/// Parse an optional port path parameter. Missing or `0` selects every port.
pub fn parse_port(raw: Option<&str>) -> Result<u16, ValidationError> {
    match raw {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<u16>()
            .map_err(|_| ValidationError::InvalidPort(s.to_string())),
    }
}
