//! HTTP/1 accept loop serving a [`Router`]

use crate::context::text_response;
use crate::router::Router;
use anyhow::Result;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Accept connections until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Arc<Router>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    info!("Registry API listening on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let router = router.clone();
                handle_request(req, router)
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Largest request body accepted; registration payloads are a few hundred bytes
pub const MAX_BODY_BYTES: usize = 64 * 1024;

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            debug!("Request body exceeds {} bytes", limit);
            Err(text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            Err(text_response(StatusCode::BAD_REQUEST, "unable to read request body"))
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    router: Arc<Router>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };

    let response = router.dispatch(&parts.method, parts.uri.path(), body).await;
    debug!("{} {} -> {}", parts.method, parts.uri.path(), response.status());
    Ok(response)
}
