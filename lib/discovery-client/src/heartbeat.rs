//! Periodic self-registration against a registry server

use discovery_api::validation::check_required_segment;
use discovery_api::{ServicePostRequest, ValidationErrors};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default interval between registrations
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(20);

/// Default bound on a single registration call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Registration request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid registration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Builder for [`HeartbeatClient`]
pub struct HeartbeatClientBuilder {
    base_url: String,
    service: String,
    payload: ServicePostRequest,
    period: Duration,
    timeout: Duration,
}

impl HeartbeatClientBuilder {
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HeartbeatClient, ClientError> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = check_required_segment("service", &self.service) {
            errors.push(e);
        }
        if let Err(e) = self.payload.validate() {
            errors.0.extend(e.0);
        }
        errors.into_result()?;

        let http = reqwest::Client::builder().timeout(self.timeout).build()?;
        let url = format!(
            "{}/v1/registration/{}",
            self.base_url.trim_end_matches('/'),
            self.service
        );

        Ok(HeartbeatClient {
            registration: Arc::new(Registration {
                http,
                url,
                payload: self.payload,
            }),
            period: self.period,
            running: Mutex::new(None),
        })
    }
}

struct Registration {
    http: reqwest::Client,
    url: String,
    payload: ServicePostRequest,
}

impl Registration {
    async fn send(&self) -> Result<(), ClientError> {
        let response = self.http.post(&self.url).json(&self.payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.trim_end().to_string(),
            });
        }
        Ok(())
    }

    async fn send_logged(&self) {
        match self.send().await {
            Ok(()) => debug!("Registered with {}", self.url),
            Err(e) => warn!("Heartbeat to {} failed: {}", self.url, e),
        }
    }
}

struct HeartbeatLoop {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// HeartbeatClient keeps one service instance registered by re-posting its
/// registration every period while running.
pub struct HeartbeatClient {
    registration: Arc<Registration>,
    period: Duration,
    running: Mutex<Option<HeartbeatLoop>>,
}

impl HeartbeatClient {
    pub fn builder(
        base_url: impl Into<String>,
        service: impl Into<String>,
        payload: ServicePostRequest,
    ) -> HeartbeatClientBuilder {
        HeartbeatClientBuilder {
            base_url: base_url.into(),
            service: service.into(),
            payload,
            period: DEFAULT_PERIOD,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client with the default period and timeout
    pub fn new(
        base_url: impl Into<String>,
        service: impl Into<String>,
        payload: ServicePostRequest,
    ) -> Result<Self, ClientError> {
        Self::builder(base_url, service, payload).build()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register once, outside the loop
    pub async fn register_once(&self) -> Result<(), ClientError> {
        self.registration.send().await
    }

    /// Start the heartbeat loop, replacing a running one.
    ///
    /// Must be called from within a tokio runtime. The first registration is
    /// sent immediately.
    pub fn start(&self) {
        let mut running = self.lock();
        if let Some(previous) = running.take() {
            debug!("Restarting heartbeat loop");
            let _ = previous.stop.send(());
        }

        let (stop, mut stopped) = oneshot::channel();
        let registration = self.registration.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => registration.send_logged().await,
                    _ = &mut stopped => break,
                }
            }
            debug!("Heartbeat loop for {} exited", registration.url);
        });

        info!("Heartbeat started for {} every {:?}", self.registration.url, period);
        *running = Some(HeartbeatLoop { stop, handle });
    }

    /// Signal the loop to exit; an in-flight registration completes
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            let _ = running.stop.send(());
            info!("Heartbeat stopped for {}", self.registration.url);
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |running| !running.handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<HeartbeatLoop>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for HeartbeatClient {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_api::Tags;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> ServicePostRequest {
        ServicePostRequest {
            ip: "10.0.0.7".to_string(),
            port: 8080,
            service_repo_name: "billing-repo".to_string(),
            revision: "abc123".to_string(),
            tags: Tags {
                az: "us-east-1a".to_string(),
                load_balancing_weight: 50,
            },
        }
    }

    async fn registration_count(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |requests| requests.len())
    }

    #[tokio::test]
    async fn test_register_once_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/registration/billing"))
            .and(body_json(payload()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HeartbeatClient::new(format!("{}/", server.uri()), "billing", payload()).unwrap();
        client.register_once().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("ip is required\n"))
            .mount(&server)
            .await;

        let client = HeartbeatClient::new(server.uri(), "billing", payload()).unwrap();
        match client.register_once().await {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "ip is required");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HeartbeatClient::builder(server.uri(), "billing", payload())
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        match client.register_once().await {
            Err(ClientError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_registration_rejected() {
        let mut bad = payload();
        bad.ip = String::new();
        assert!(matches!(
            HeartbeatClient::new("http://localhost:1", "billing", bad),
            Err(ClientError::Invalid(_))
        ));
        assert!(matches!(
            HeartbeatClient::new("http://localhost:1", "bill:ing", payload()),
            Err(ClientError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_start_registers_immediately_and_repeats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/registration/billing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HeartbeatClient::builder(server.uri(), "billing", payload())
            .period(Duration::from_millis(100))
            .build()
            .unwrap();
        client.start();
        assert!(client.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registration_count(&server).await, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registration_count(&server).await >= 3);

        client.stop();
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn test_stop_ends_registrations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HeartbeatClient::builder(server.uri(), "billing", payload())
            .period(Duration::from_millis(50))
            .build()
            .unwrap();
        client.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        client.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let after_stop = registration_count(&server).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registration_count(&server).await, after_stop);
    }

    #[tokio::test]
    async fn test_restart_replaces_running_loop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HeartbeatClient::builder(server.uri(), "billing", payload())
            .period(Duration::from_secs(60))
            .build()
            .unwrap();
        client.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // one immediate registration per start, no leftover loop ticking
        assert_eq!(registration_count(&server).await, 2);
        assert!(client.is_running());
        client.stop();
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HeartbeatClient::builder(server.uri(), "billing", payload())
            .period(Duration::from_millis(50))
            .build()
            .unwrap();
        client.start();
        tokio::time::sleep(Duration::from_millis(180)).await;

        assert!(registration_count(&server).await >= 2);
        assert!(client.is_running());
        client.stop();
    }
}
