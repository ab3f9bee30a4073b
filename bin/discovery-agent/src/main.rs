use anyhow::Result;
use clap::{Parser, ValueEnum};
use discovery_api::{ServicePostRequest, Tags};
use discovery_client::HeartbeatClient;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Keeps a local service instance registered with a discovery server
#[derive(Parser, Debug, Clone)]
#[command(name = "discovery-agent")]
#[command(about = "Heartbeat sidecar for the service discovery registry")]
struct Args {
    /// Base URL of the discovery server
    #[arg(long, env = "DISCOVERY_URL", default_value = "http://localhost:8080")]
    server_url: String,

    /// Service to register under
    #[arg(long, env = "DISCOVERY_SERVICE")]
    service: String,

    /// Address of this instance
    #[arg(long, env = "DISCOVERY_IP")]
    ip: String,

    #[arg(long, env = "DISCOVERY_SERVICE_PORT")]
    port: u16,

    /// Repository the instance was built from
    #[arg(long, env = "DISCOVERY_REPO", default_value = "")]
    repo: String,

    #[arg(long, env = "DISCOVERY_REVISION", default_value = "")]
    revision: String,

    /// Availability zone
    #[arg(long, env = "DISCOVERY_AZ", default_value = "")]
    az: String,

    /// Load balancing weight, 0 leaves it unset
    #[arg(long, env = "DISCOVERY_WEIGHT", default_value_t = 0)]
    weight: u32,

    /// Seconds between registrations
    #[arg(long, env = "DISCOVERY_PERIOD_SECS", default_value_t = 20)]
    period_secs: u64,

    /// Seconds before a registration call is abandoned
    #[arg(long, env = "DISCOVERY_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, env = "DISCOVERY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn payload(&self) -> ServicePostRequest {
        ServicePostRequest {
            ip: self.ip.clone(),
            port: self.port,
            service_repo_name: self.repo.clone(),
            revision: self.revision.clone(),
            tags: Tags {
                az: self.az.clone(),
                load_balancing_weight: self.weight,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let client = HeartbeatClient::builder(&args.server_url, &args.service, args.payload())
        .period(Duration::from_secs(args.period_secs.max(1)))
        .timeout(Duration::from_secs(args.timeout_secs.max(1)))
        .build()?;

    info!(
        "Starting discovery-agent for {} at {}:{}...",
        args.service, args.ip, args.port
    );
    client.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    client.stop();
    info!("discovery-agent stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}
