use crate::admin_api::types::{json_response, parse_body};
use crate::engine::MockEngine;
use crate::response::DelayRequest;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// POST /alfred/delay - `{"minResponseTime": ms, "duration": ms}`
pub fn handle_delay(body: &Bytes, engine: &MockEngine) -> Response<Full<Bytes>> {
    let request: DelayRequest = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    engine.set_delay(request);
    json_response(StatusCode::OK, &request)
}
