//! Registration and load balancing handlers

use crate::context::{text_response, RequestContext, PARAM_IP, PARAM_PORT, PARAM_REPO, PARAM_SERVICE};
use discovery_api::validation::{check_required_segment, parse_port};
use discovery_api::{
    ServiceGetResponse, ServicePostRequest, ServiceUpdateLoadBalancingRequest, ValidationError,
    ValidationErrors,
};
use discovery_core::{CoreError, PortSelector};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use thiserror::Error;
use tracing::{error, info};

/// Failures a handler turns into an error response
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Registry(#[from] CoreError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::Validation(error.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Registry(e) if e.is_not_found() => StatusCode::BAD_REQUEST,
            ApiError::Registry(_) | ApiError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        text_response(status, &self.to_string())
    }
}

type HandlerResult = Result<Response<Full<Bytes>>, ApiError>;

/// `GET /v1/registration/{service}`
pub async fn get_services(ctx: RequestContext) -> HandlerResult {
    let service = ctx.param(PARAM_SERVICE);
    check_required_segment("service", service)?;

    let hosts = ctx.registry.lookup_by_service(service).await?;
    info!("getServices service={} hosts={}", service, hosts.len());

    let response = ServiceGetResponse::new(ctx.registry.environment(), hosts);
    Ok(ctx.encoder.encode(&response)?)
}

/// `GET /v1/registration/repo/{repo}`
pub async fn get_services_by_repo(ctx: RequestContext) -> HandlerResult {
    let repo = ctx.param(PARAM_REPO);
    check_required_segment("service_repo_name", repo)?;

    let hosts = ctx.registry.lookup_by_repo(repo).await?;
    let response = ServiceGetResponse::new(ctx.registry.environment(), hosts);
    info!(
        "getServicesByRepo repo={} service={} hosts={}",
        repo,
        response.service,
        response.hosts.len()
    );

    Ok(ctx.encoder.encode(&response)?)
}

/// `POST /v1/registration/{service}`
pub async fn register_service(ctx: RequestContext, body: Bytes) -> HandlerResult {
    let service = ctx.param(PARAM_SERVICE);
    check_required_segment("service", service)?;
    let request = ServicePostRequest::decode(&body)?;

    let host = request.into_host(service, chrono::Utc::now().timestamp_millis());
    info!("registerService service={} host={}", service, host.address());
    ctx.registry.register(&host).await?;

    Ok(text_response(StatusCode::OK, ""))
}

/// `DELETE /v1/registration/{service}/{ip}[/{port}]`
pub async fn delete_service(ctx: RequestContext) -> HandlerResult {
    let (service, ip, port) = identity_params(&ctx)?;

    info!("deleteService service={} ip={} port={}", service, ip, port);
    let deleted = ctx.registry.delete(service, ip, port).await?;
    info!("deleteService removed {} hosts", deleted);

    Ok(text_response(StatusCode::OK, ""))
}

/// `POST /v1/loadbalancing/{service}/{ip}[/{port}]`
pub async fn update_service_weight(ctx: RequestContext, body: Bytes) -> HandlerResult {
    let request = ServiceUpdateLoadBalancingRequest::decode(&body)?;
    let (service, ip, port) = identity_params(&ctx)?;

    info!(
        "updateServiceWeight service={} ip={} port={} weight={}",
        service, ip, port, request.load_balancing_weight
    );
    let updated = ctx
        .registry
        .update_weight(service, ip, port, request.load_balancing_weight)
        .await?;
    info!("updateServiceWeight updated {} hosts", updated);

    Ok(text_response(StatusCode::OK, ""))
}

fn identity_params(ctx: &RequestContext) -> Result<(&str, &str, PortSelector), ValidationErrors> {
    let service = ctx.param(PARAM_SERVICE);
    let ip = ctx.param(PARAM_IP);

    let mut errors = ValidationErrors::new();
    if let Err(e) = check_required_segment("service", service) {
        errors.push(e);
    }
    if let Err(e) = check_required_segment("ip", ip) {
        errors.push(e);
    }
    let port = match parse_port(ctx.optional_param(PARAM_PORT)) {
        Ok(port) => PortSelector::from(port),
        Err(e) => {
            errors.push(e);
            PortSelector::Any
        }
    };
    errors.into_result()?;

    Ok((service, ip, port))
}
