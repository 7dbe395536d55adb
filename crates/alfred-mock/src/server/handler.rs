use super::AppState;
use crate::admin_api::route_admin;
use crate::request::MockRequest;
use crate::response::MockResponse;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Serve one request: administrative routes first, then mock matching
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    remote: SocketAddr,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    if state.admin_enabled {
        if let Some(response) = route_admin(&parts.method, parts.uri.path(), &body, &state).await {
            return Ok(response);
        }
    }

    let request = MockRequest::new(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query(),
        &parts.headers,
        String::from_utf8_lossy(&body),
    );
    debug!("{} {} from {}", request.method, request.url(), remote);

    let response = state.engine.handle(request).await;
    Ok(to_hyper_response(response))
}

/// Convert an engine response; invalid header names or values are dropped
pub fn to_hyper_response(response: MockResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        warn!("Status {} is not representable, sending 500", response.status);
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &response.headers {
            match (
                hyper::header::HeaderName::from_bytes(name.as_bytes()),
                hyper::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("Dropping invalid response header {}: {}", name, value),
            }
        }
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}
