use anyhow::{Context, Result};
use clap::Parser;
use discovery_core::{KeyValueStore, MemoryStore, RedisStore, ServiceRegistry};
use discovery_http::{MetricsCollector, ResponseEncoder, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Args, LogFormat, Settings, StoreKind};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load(Args::parse())?;
    init_tracing(settings.log_format);

    info!("Starting discovery-server for environment {}...", settings.environment);

    let store: Arc<dyn KeyValueStore> = match settings.store {
        StoreKind::Redis => Arc::new(
            RedisStore::connect(&settings.redis_host, settings.redis_port, settings.store_timeout)
                .await
                .with_context(|| {
                    format!(
                        "Failed to connect to Redis at {}:{}",
                        settings.redis_host, settings.redis_port
                    )
                })?,
        ),
        StoreKind::Memory => {
            warn!("Using in-memory store, registrations are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(ServiceRegistry::new(settings.environment.clone(), store));
    registry
        .health_check()
        .await
        .context("Backing store failed health check")?;
    info!("Service registry initialized");

    let metrics = MetricsCollector::new()?;
    let router = Arc::new(Router::new(
        registry,
        ResponseEncoder::new(settings.pretty_json),
        metrics,
    )?);
    info!("Router initialized");

    let addr: SocketAddr = ([0, 0, 0, 0], settings.port).into();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    discovery_http::serve(listener, router, shutdown_signal()).await?;
    info!("discovery-server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
