//! Runtime log level.

use crate::admin_api::types::{error_response, json_response, parse_body, LoggerRequest};
use crate::logging::{LogLevelHandle, LoggingError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// POST /logger - `{"configuredLevel": "debug"}`
pub fn handle_set_level(body: &Bytes, handle: &LogLevelHandle) -> Response<Full<Bytes>> {
    let request: LoggerRequest = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match handle.set_level(&request.configured_level) {
        Ok(change) => json_response(StatusCode::OK, &change),
        Err(e @ LoggingError::UnknownLevel(_)) => {
            error_response(StatusCode::FORBIDDEN, &e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin_api::handlers::test_support::body_json;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_level() {
        let handle = LogLevelHandle::detached("info");
        let body = Bytes::from_static(br#"{"configuredLevel": "ERROR"}"#);

        let resp = handle_set_level(&body, &handle);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({
                "previousLevel": "info",
                "configuredLevel": "error",
                "effectiveLevel": "error"
            })
        );
        assert_eq!(handle.level(), "error");
    }

    #[tokio::test]
    async fn test_unknown_level_is_forbidden() {
        let handle = LogLevelHandle::detached("info");
        let body = Bytes::from_static(br#"{"configuredLevel": "loud"}"#);

        let resp = handle_set_level(&body, &handle);
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(handle.level(), "info");
    }

    #[test]
    fn test_malformed_body() {
        let handle = LogLevelHandle::detached("info");
        let resp = handle_set_level(&Bytes::from_static(b"{}"), &handle);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
