//! Regex route table for the registry API
//!
//! Routes are tried in registration order and the first one whose method and
//! pattern both match wins. Named capture groups become path parameters.

use crate::context::{text_response, RequestContext, ResponseEncoder, PARAM_IP, PARAM_PORT, PARAM_REPO, PARAM_SERVICE};
use crate::handlers::{self, ApiError};
use crate::metrics::MetricsCollector;
use discovery_api::ValidationError;
use discovery_core::ServiceRegistry;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, Method, Response, StatusCode};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Handler selected by a route
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    GetServices,
    GetServicesByRepo,
    RegisterService,
    DeleteService,
    UpdateServiceWeight,
    Health,
    Metrics,
}

impl Handler {
    /// Metric label for the handler
    pub fn name(&self) -> &'static str {
        match self {
            Handler::GetServices => "get_services",
            Handler::GetServicesByRepo => "get_services_by_repo",
            Handler::RegisterService => "register_service",
            Handler::DeleteService => "delete_service",
            Handler::UpdateServiceWeight => "update_service_weight",
            Handler::Health => "health",
            Handler::Metrics => "metrics",
        }
    }
}

/// A single (pattern, method, handler) entry
pub struct Route {
    pattern: Regex,
    method: Method,
    handler: Handler,
}

impl Route {
    /// Path parameters when the route matches
    fn captures(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if self.method != *method {
            return None;
        }
        let caps = self.pattern.captures(path)?;
        let params = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(params)
    }
}

/// Router for dispatching registry API requests
pub struct Router {
    routes: Vec<Route>,
    registry: Arc<ServiceRegistry>,
    encoder: ResponseEncoder,
    metrics: MetricsCollector,
}

impl Router {
    /// Create a router with the registry API routes installed
    pub fn new(
        registry: Arc<ServiceRegistry>,
        encoder: ResponseEncoder,
        metrics: MetricsCollector,
    ) -> Result<Self, regex::Error> {
        let mut router = Self {
            routes: Vec::new(),
            registry,
            encoder,
            metrics,
        };

        let service = format!("(?P<{}>[^/]+)", PARAM_SERVICE);
        let repo = format!("(?P<{}>[^/]+)", PARAM_REPO);
        let ip = format!("(?P<{}>[^/]+)", PARAM_IP);
        let port = format!("(?P<{}>[^/]+)", PARAM_PORT);

        router.handle(&format!("^/v1/registration/{}$", service), Method::GET, Handler::GetServices)?;
        router.handle(&format!("^/v1/registration/repo/{}$", repo), Method::GET, Handler::GetServicesByRepo)?;
        router.handle(&format!("^/v1/registration/{}$", service), Method::POST, Handler::RegisterService)?;
        router.handle(&format!("^/v1/registration/{}/{}$", service, ip), Method::DELETE, Handler::DeleteService)?;
        router.handle(
            &format!("^/v1/registration/{}/{}/{}$", service, ip, port),
            Method::DELETE,
            Handler::DeleteService,
        )?;
        router.handle(
            &format!("^/v1/loadbalancing/{}/{}$", service, ip),
            Method::POST,
            Handler::UpdateServiceWeight,
        )?;
        router.handle(
            &format!("^/v1/loadbalancing/{}/{}/{}$", service, ip, port),
            Method::POST,
            Handler::UpdateServiceWeight,
        )?;
        router.handle("^/healthz$", Method::GET, Handler::Health)?;
        router.handle("^/metrics$", Method::GET, Handler::Metrics)?;

        Ok(router)
    }

    /// Append a route; earlier routes take precedence
    pub fn handle(&mut self, pattern: &str, method: Method, handler: Handler) -> Result<(), regex::Error> {
        self.routes.push(Route {
            pattern: Regex::new(pattern)?,
            method,
            handler,
        });
        Ok(())
    }

    /// Find the first matching route and its path parameters
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(Handler, HashMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|route| route.captures(method, path).map(|params| (route.handler, params)))
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Route a request and produce its response
    pub async fn dispatch(&self, method: &Method, path: &str, body: Bytes) -> Response<Full<Bytes>> {
        let started = Instant::now();

        let Some((handler, params)) = self.match_route(method, path) else {
            debug!("No route for {} {}", method, path);
            return text_response(StatusCode::NOT_FOUND, "404 page not found");
        };

        let result = match decode_params(params) {
            Ok(params) => self.call(handler, params, body).await,
            Err(e) => Err(ApiError::from(e)),
        };
        let response = result.unwrap_or_else(|e| e.into_response());

        self.metrics
            .observe(handler.name(), response.status().as_u16(), started.elapsed());
        response
    }

    async fn call(
        &self,
        handler: Handler,
        params: HashMap<String, String>,
        body: Bytes,
    ) -> Result<Response<Full<Bytes>>, ApiError> {
        let ctx = RequestContext::new(params, self.registry.clone(), self.encoder.clone());
        match handler {
            Handler::GetServices => handlers::get_services(ctx).await,
            Handler::GetServicesByRepo => handlers::get_services_by_repo(ctx).await,
            Handler::RegisterService => handlers::register_service(ctx, body).await,
            Handler::DeleteService => handlers::delete_service(ctx).await,
            Handler::UpdateServiceWeight => handlers::update_service_weight(ctx, body).await,
            Handler::Health => Ok(self.health().await),
            Handler::Metrics => Ok(self.metrics_response()),
        }
    }

    async fn health(&self) -> Response<Full<Bytes>> {
        match self.registry.health_check().await {
            Ok(()) => text_response(StatusCode::OK, "OK"),
            Err(e) => {
                warn!("Health check failed: {}", e);
                text_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
            }
        }
    }

    fn metrics_response(&self) -> Response<Full<Bytes>> {
        match self.metrics.gather() {
            Ok(text) => {
                let mut response = Response::new(Full::new(Bytes::from(text)));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics")
            }
        }
    }
}

/// Percent-decode captured path parameters
fn decode_params(params: HashMap<String, String>) -> Result<HashMap<String, String>, ValidationError> {
    params
        .into_iter()
        .map(|(name, raw)| match urlencoding::decode(&raw) {
            Ok(value) => Ok((name, value.into_owned())),
            Err(_) => Err(ValidationError::MalformedPath(raw)),
        })
        .collect()
}
