//! Redis storage implementation

use super::{KeyValueStore, ScanBatch, WriteOp};
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

/// Default bound on a single store round trip
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed store
pub struct RedisStore {
    /// Redis connection manager
    connection_manager: ::redis::aio::ConnectionManager,

    /// Bound applied to every command or pipeline
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect to `redis://host:port` and verify the connection
    pub async fn connect(host: &str, port: u16, command_timeout: Duration) -> Result<Self> {
        let url = format!("redis://{}:{}", host, port);
        let client = ::redis::Client::open(url.as_str())?;

        let connection_manager = time::timeout(
            command_timeout,
            ::redis::aio::ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CoreError::Timeout(command_timeout))??;

        let store = Self {
            connection_manager,
            command_timeout,
        };
        store.ping().await?;

        info!("Connected to Redis at {}:{}", host, port);
        Ok(store)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = ::redis::RedisResult<T>>,
    {
        match time::timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn pipeline(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut pipe = ::redis::pipe();
        for op in &ops {
            match op {
                WriteOp::HSet { key, field, value } => {
                    pipe.cmd("HSET").arg(key).arg(field).arg(value.as_slice()).ignore();
                }
                WriteOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(key).arg(ttl.as_millis() as u64).ignore();
                }
            }
        }

        let mut conn = self.connection_manager.clone();
        let _: () = self.bounded(pipe.query_async(&mut conn)).await?;
        debug!("Executed pipeline of {} commands", ops.len());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<Vec<u8>> = self
            .bounded(::redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn))
            .await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let removed: u64 = self
            .bounded(::redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(removed)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanBatch> {
        let mut conn = self.connection_manager.clone();
        let (cursor, keys): (u64, Vec<String>) = self
            .bounded(
                ::redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(ScanBatch { cursor, keys })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let reply: String = self
            .bounded(::redis::cmd("PING").query_async(&mut conn))
            .await?;
        if reply != "PONG" {
            return Err(CoreError::Store(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}
