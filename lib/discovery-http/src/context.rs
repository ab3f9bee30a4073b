//! Request-scoped state handed to every handler

use discovery_core::ServiceRegistry;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const PARAM_SERVICE: &str = "service";
pub const PARAM_REPO: &str = "repo";
pub const PARAM_IP: &str = "ip_address";
pub const PARAM_PORT: &str = "port";

/// JSON response encoder shared by all handlers
#[derive(Clone, Debug, Default)]
pub struct ResponseEncoder {
    pretty: bool,
}

impl ResponseEncoder {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Serialize `value` into a 200 JSON response
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Response<Full<Bytes>>, serde_json::Error> {
        let body = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "")))
    }
}

/// Everything a handler needs, passed explicitly
#[derive(Clone)]
pub struct RequestContext {
    pub params: HashMap<String, String>,
    pub registry: Arc<ServiceRegistry>,
    pub encoder: ResponseEncoder,
}

impl RequestContext {
    pub fn new(
        params: HashMap<String, String>,
        registry: Arc<ServiceRegistry>,
        encoder: ResponseEncoder,
    ) -> Self {
        Self {
            params,
            registry,
            encoder,
        }
    }

    /// Path parameter by name; empty when the route did not capture it
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn optional_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Plain-text response with a trailing newline
pub fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{}\n", message))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::MemoryStore;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_encoder_writes_json() {
        let encoder = ResponseEncoder::default();
        let response = encoder.encode(&serde_json::json!({"env": "test"})).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"env":"test"}"#);
    }

    #[test]
    fn test_params() {
        let registry = Arc::new(ServiceRegistry::new("test", Arc::new(MemoryStore::new())));
        let params = HashMap::from([(PARAM_SERVICE.to_string(), "billing".to_string())]);
        let ctx = RequestContext::new(params, registry, ResponseEncoder::default());
        assert_eq!(ctx.param(PARAM_SERVICE), "billing");
        assert_eq!(ctx.param(PARAM_IP), "");
        assert_eq!(ctx.optional_param(PARAM_PORT), None);
    }

    #[test]
    fn test_text_response() {
        let response = text_response(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
