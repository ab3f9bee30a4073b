//! Prometheus metrics for the registry API

use anyhow::Result;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics collector for registry requests
#[derive(Clone)]
pub struct MetricsCollector {
    /// Requests by route and response status
    pub requests_total: CounterVec,
    /// Request latency by route
    pub request_duration_seconds: HistogramVec,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = CounterVec::new(
            Opts::new("discovery_requests_total", "Total registry API requests"),
            &["route", "status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "discovery_request_duration_seconds",
                "Registry API request latency in seconds",
            ),
            &["route"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            registry,
        })
    }

    /// Record one handled request
    pub fn observe(&self, route: &str, status: u16, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[route])
            .observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
