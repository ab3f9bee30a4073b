//! Service registry over a shared key-value store
//!
//! Each host is written as a service entry (the serialized host) and a repo
//! entry (a pointer to the service key). Both are written in one pipeline
//! with the same TTL, and deleted together.

use crate::keyspace::{KeySpace, ENTRY_FIELD, HOST_TTL};
use crate::scan::{scan_and_apply, ScanOutcome};
use crate::store::{KeyValueStore, WriteOp};
use crate::{CoreError, Result};
use discovery_api::Host;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Port selector for delete and weight updates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortSelector {
    /// Every port registered for the IP
    Any,
    Exact(u16),
}

impl From<u16> for PortSelector {
    /// Port 0 selects every port
    fn from(port: u16) -> Self {
        match port {
            0 => PortSelector::Any,
            p => PortSelector::Exact(p),
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Any => f.write_str("*"),
            PortSelector::Exact(p) => write!(f, "{}", p),
        }
    }
}

/// ServiceRegistry registers, looks up and removes hosts for one environment
#[derive(Clone)]
pub struct ServiceRegistry {
    keys: KeySpace,
    store: Arc<dyn KeyValueStore>,
}

impl ServiceRegistry {
    pub fn new(env: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            keys: KeySpace::new(env),
            store,
        }
    }

    pub fn environment(&self) -> &str {
        self.keys.env()
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Register or refresh a host
    pub async fn register(&self, host: &Host) -> Result<()> {
        let (service_key, repo_key) = self.keys.host_keys(host);
        self.write(&service_key, &repo_key, host).await?;
        debug!("Registered {} as {}", host.address(), service_key);
        Ok(())
    }

    /// Every live host of a service
    pub async fn lookup_by_service(&self, service: &str) -> Result<Vec<Host>> {
        let pattern = self.keys.service_pattern(service);
        let outcome = scan_and_apply(self.store.as_ref(), &pattern, |service_key| async move {
            self.read_scanned(&service_key).await
        })
        .await;
        outcome.into_result()
    }

    /// Every live host built from a repository
    pub async fn lookup_by_repo(&self, repo: &str) -> Result<Vec<Host>> {
        let pattern = self.keys.repo_pattern(repo);
        let outcome = scan_and_apply(self.store.as_ref(), &pattern, |repo_key| async move {
            self.follow_repo_entry(&repo_key).await
        })
        .await;
        outcome.into_result()
    }

    /// Delete one host, or every port of an IP with [`PortSelector::Any`].
    ///
    /// Returns the number of hosts deleted.
    pub async fn delete(&self, service: &str, ip: &str, port: PortSelector) -> Result<usize> {
        match port {
            PortSelector::Exact(port) => {
                let service_key = self.keys.service_key(service, ip, port);
                self.delete_by_service_key(&service_key).await?;
                Ok(1)
            }
            PortSelector::Any => {
                let pattern = self.keys.service_ip_pattern(service, ip);
                let outcome = scan_and_apply(self.store.as_ref(), &pattern, |service_key| async move {
                    self.delete_by_service_key(&service_key).await
                })
                .await;
                bulk_result(outcome, || {
                    format!("cannot find services to delete for {}/{}", service, ip)
                })
            }
        }
    }

    /// Set the load balancing weight of one host, or every port of an IP.
    ///
    /// The weight range is checked by the caller. Returns the number of hosts
    /// updated.
    pub async fn update_weight(
        &self,
        service: &str,
        ip: &str,
        port: PortSelector,
        weight: u32,
    ) -> Result<usize> {
        match port {
            PortSelector::Exact(port) => {
                let service_key = self.keys.service_key(service, ip, port);
                self.update_weight_by_service_key(&service_key, weight).await?;
                Ok(1)
            }
            PortSelector::Any => {
                let pattern = self.keys.service_ip_pattern(service, ip);
                let outcome = scan_and_apply(self.store.as_ref(), &pattern, |service_key| async move {
                    self.update_weight_by_service_key(&service_key, weight).await
                })
                .await;
                bulk_result(outcome, || {
                    format!("cannot find services to update for {}/{}", service, ip)
                })
            }
        }
    }

    /// Check that the backing store answers
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await
    }

    async fn write(&self, service_key: &str, repo_key: &str, host: &Host) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(host)?;
        let ops = vec![
            WriteOp::HSet {
                key: service_key.to_string(),
                field: ENTRY_FIELD.to_string(),
                value: bytes,
            },
            WriteOp::Expire {
                key: service_key.to_string(),
                ttl: HOST_TTL,
            },
            WriteOp::HSet {
                key: repo_key.to_string(),
                field: ENTRY_FIELD.to_string(),
                value: service_key.as_bytes().to_vec(),
            },
            WriteOp::Expire {
                key: repo_key.to_string(),
                ttl: HOST_TTL,
            },
        ];
        self.store.pipeline(ops).await
    }

    async fn read(&self, service_key: &str) -> Result<Host> {
        let bytes = self
            .store
            .hget(service_key, ENTRY_FIELD)
            .await?
            .ok_or_else(|| CoreError::NotFound(service_key.to_string()))?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }

    /// Read a key a scan just returned; a missing entry is a store fault
    async fn read_scanned(&self, service_key: &str) -> Result<Host> {
        match self.read(service_key).await {
            Err(CoreError::NotFound(key)) => {
                warn!("Entry {} vanished during lookup", key);
                Err(CoreError::Vanished(key))
            }
            other => other,
        }
    }

    async fn follow_repo_entry(&self, repo_key: &str) -> Result<Host> {
        let pointer = self
            .store
            .hget(repo_key, ENTRY_FIELD)
            .await?
            .ok_or_else(|| CoreError::Vanished(repo_key.to_string()))?;
        let service_key = String::from_utf8(pointer)
            .map_err(|e| CoreError::Store(format!("invalid repo entry {}: {}", repo_key, e)))?;

        match self.read(&service_key).await {
            Err(CoreError::NotFound(_)) => {
                warn!("Repo entry {} points at missing host {}", repo_key, service_key);
                Err(CoreError::DanglingReference {
                    repo_key: repo_key.to_string(),
                    service_key,
                })
            }
            other => other,
        }
    }

    async fn delete_by_service_key(&self, service_key: &str) -> Result<()> {
        let host = self.read(service_key).await?;
        let removed = self.store.del(service_key).await?;
        if removed == 0 {
            return Err(CoreError::NotFound(service_key.to_string()));
        }

        let (_, repo_key) = self.keys.host_keys(&host);
        self.store.del(&repo_key).await?;
        debug!("Deleted {} and {}", service_key, repo_key);
        Ok(())
    }

    async fn update_weight_by_service_key(&self, service_key: &str, weight: u32) -> Result<()> {
        let mut host = self.read(service_key).await?;
        host.tags.load_balancing_weight = weight;
        let (_, repo_key) = self.keys.host_keys(&host);
        self.write(service_key, &repo_key, &host).await?;
        debug!("Set weight of {} to {}", service_key, weight);
        Ok(())
    }
}

/// Zero matches is `NotFound`; a failure after some matches keeps the count
fn bulk_result<F>(outcome: ScanOutcome<()>, not_found: F) -> Result<usize>
where
    F: FnOnce() -> String,
{
    match (outcome.visited, outcome.error) {
        (0, Some(e)) if !e.is_not_found() => Err(e),
        (0, _) => Err(CoreError::NotFound(not_found())),
        (matched, Some(e)) => Err(CoreError::Partial {
            matched,
            source: Box::new(e),
        }),
        (matched, None) => Ok(matched),
    }
}
