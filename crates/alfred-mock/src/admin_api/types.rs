//! Payloads and response helpers for the administrative endpoints.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Body of `POST /logger`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerRequest {
    pub configured_level: String,
}

/// Body of `GET /alfred/health`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub generation: u64,
    pub mocks: usize,
}

/// One entry of `GET /alfred/mocks`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockSummary {
    pub name: String,
    pub method: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

/// Error body. `errors` carries one entry per problem when there are several.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mocks: Option<Vec<String>>,
}

/// Create a JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

/// Create an error response with a single message
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorResponse {
            message: message.to_string(),
            errors: Vec::new(),
            mocks: None,
        },
    )
}

/// Parse a JSON request body, or produce the 400 to send back
#[allow(clippy::result_large_err)]
pub fn parse_body<T: serde::de::DeserializeOwned>(
    body: &Bytes,
) -> Result<T, Response<Full<Bytes>>> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}"))
    })
}
