//! Key-space layout for registry entries
//!
//! Every host is stored twice:
//!
//! ```text
//! EYV1:<env>:SERVICENAME:<service>:<ip>:<port>  -> META = serialized host
//! EYV1:<env>:REPONAME:<repo>:<ip>:<port>        -> META = service key
//! ```
//!
//! Segment values never contain the delimiter; callers validate that at the
//! boundary before reaching the registry.

use discovery_api::{Host, KEY_DELIMITER};
use std::time::Duration;

pub const KEY_PREFIX: &str = "EYV1";
pub const SERVICE_INDEX: &str = "SERVICENAME";
pub const REPO_INDEX: &str = "REPONAME";

/// Hash field holding the entry value
pub const ENTRY_FIELD: &str = "META";

/// Entries expire unless refreshed within this window
pub const HOST_TTL: Duration = Duration::from_secs(10 * 60);

/// Key builder scoped to one environment
#[derive(Clone, Debug)]
pub struct KeySpace {
    env: String,
}

impl KeySpace {
    pub fn new(env: impl Into<String>) -> Self {
        Self { env: env.into() }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn service_key(&self, service: &str, ip: &str, port: u16) -> String {
        self.join(&[SERVICE_INDEX, service, ip, &port.to_string()])
    }

    pub fn repo_key(&self, repo: &str, ip: &str, port: u16) -> String {
        self.join(&[REPO_INDEX, repo, ip, &port.to_string()])
    }

    /// Both keys of a host, derived from the same record
    pub fn host_keys(&self, host: &Host) -> (String, String) {
        (
            self.service_key(&host.service, &host.ip_address, host.port),
            self.repo_key(&host.service_repo_name, &host.ip_address, host.port),
        )
    }

    /// Scan pattern for every host of a service
    pub fn service_pattern(&self, service: &str) -> String {
        self.pattern(&[SERVICE_INDEX, service])
    }

    /// Scan pattern for every port of a service on one IP
    pub fn service_ip_pattern(&self, service: &str, ip: &str) -> String {
        self.pattern(&[SERVICE_INDEX, service, ip])
    }

    /// Scan pattern for every repo entry of a repository
    pub fn repo_pattern(&self, repo: &str) -> String {
        self.pattern(&[REPO_INDEX, repo])
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut parts = vec![KEY_PREFIX, self.env.as_str()];
        parts.extend_from_slice(segments);
        parts.join(&KEY_DELIMITER.to_string())
    }

    fn pattern(&self, segments: &[&str]) -> String {
        let mut parts = vec![KEY_PREFIX.to_string(), escape_glob(&self.env)];
        parts.extend(segments.iter().map(|s| escape_glob(s)));
        parts.push("*".to_string());
        parts.join(&KEY_DELIMITER.to_string())
    }
}

/// Escape glob metacharacters so a name only ever matches itself
pub fn escape_glob(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_and_repo_keys() {
        let keys = KeySpace::new("staging");
        assert_eq!(
            keys.service_key("billing", "10.0.0.1", 8080),
            "EYV1:staging:SERVICENAME:billing:10.0.0.1:8080"
        );
        assert_eq!(
            keys.repo_key("billing-repo", "10.0.0.1", 8080),
            "EYV1:staging:REPONAME:billing-repo:10.0.0.1:8080"
        );
    }

    #[test]
    fn test_host_keys_share_identity() {
        let keys = KeySpace::new("prod");
        let host = Host {
            service: "billing".to_string(),
            ip_address: "10.0.0.1".to_string(),
            port: 33,
            service_repo_name: "repo".to_string(),
            ..Default::default()
        };
        let (service_key, repo_key) = keys.host_keys(&host);
        assert_eq!(service_key, "EYV1:prod:SERVICENAME:billing:10.0.0.1:33");
        assert_eq!(repo_key, "EYV1:prod:REPONAME:repo:10.0.0.1:33");
    }

    #[test]
    fn test_patterns() {
        let keys = KeySpace::new("staging");
        assert_eq!(
            keys.service_pattern("billing"),
            "EYV1:staging:SERVICENAME:billing:*"
        );
        assert_eq!(
            keys.service_ip_pattern("billing", "10.0.0.1"),
            "EYV1:staging:SERVICENAME:billing:10.0.0.1:*"
        );
        assert_eq!(keys.repo_pattern("repo"), "EYV1:staging:REPONAME:repo:*");
    }

    #[test]
    fn test_patterns_escape_glob_characters() {
        let keys = KeySpace::new("staging");
        assert_eq!(
            keys.service_pattern("bill*"),
            "EYV1:staging:SERVICENAME:bill\\*:*"
        );
        assert_eq!(escape_glob("a?b[c]\\"), "a\\?b\\[c\\]\\\\");
    }
}
