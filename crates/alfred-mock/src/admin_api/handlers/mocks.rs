//! Mock listing and patching.

use crate::admin_api::types::{error_response, json_response, ErrorResponse, MockSummary};
use crate::engine::MockEngine;
use crate::mock::PatchError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::Value;
use tracing::warn;

/// GET /alfred/mocks - live mocks in declaration order
pub fn handle_list(engine: &MockEngine) -> Response<Full<Bytes>> {
    let snapshot = engine.snapshot();
    let mocks: Vec<MockSummary> = snapshot
        .mocks()
        .iter()
        .map(|mock| MockSummary {
            name: mock.name.clone(),
            method: mock.method.clone(),
            url: mock.url().to_string(),
        })
        .collect();
    json_response(StatusCode::OK, &mocks)
}

/// PATCH /alfred - deep-merge a partial definition into the mock it names
pub async fn handle_patch(body: &Bytes, engine: &MockEngine) -> Response<Full<Bytes>> {
    let patch: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}"))
        }
    };

    match engine.patch(patch).await {
        Ok(definition) => json_response(StatusCode::OK, &definition),
        Err(PatchError::UnknownMock { name, known }) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                message: format!("No mock named '{name}'"),
                errors: Vec::new(),
                mocks: Some(known),
            },
        ),
        Err(PatchError::Rejected(e)) => {
            warn!("Patch rejected: {}", e);
            json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse {
                    message: "Patched definition is invalid".to_string(),
                    errors: e.messages(),
                    mocks: None,
                },
            )
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin_api::handlers::test_support::{body_json, engine};
    use serde_json::json;

    fn mocks() -> Value {
        json!([
            { "name": "orders", "request": { "method": "post", "url": "/orders/{id}" } },
            { "request": { "urlRegex": "^/items/(\\d+)$" } }
        ])
    }

    #[tokio::test]
    async fn test_handle_list() {
        let (engine, _dir) = engine(mocks()).await;
        let resp = handle_list(&engine);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!([
                { "name": "orders", "method": "POST", "url": "/orders/{id}" },
                { "name": "GET-^/items/(\\d+)$", "method": "GET", "url": "^/items/(\\d+)$" }
            ])
        );
    }

    #[tokio::test]
    async fn test_handle_patch() {
        let (engine, _dir) = engine(mocks()).await;
        let body = Bytes::from(
            json!({ "name": "orders", "response": { "status": 201 } }).to_string(),
        );

        let resp = handle_patch(&body, &engine).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let patched = body_json(resp).await;
        assert_eq!(patched["response"]["status"], 201);
        assert_eq!(patched["request"]["url"], "/orders/{id}");
    }

    #[tokio::test]
    async fn test_handle_patch_unknown_mock() {
        let (engine, _dir) = engine(mocks()).await;
        let body = Bytes::from(json!({ "name": "nope" }).to_string());

        let resp = handle_patch(&body, &engine).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let error = body_json(resp).await;
        assert_eq!(error["mocks"], json!(["orders", "GET-^/items/(\\d+)$"]));
    }

    #[tokio::test]
    async fn test_handle_patch_invalid() {
        let (engine, _dir) = engine(mocks()).await;

        let resp = handle_patch(&Bytes::from_static(b"not json"), &engine).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = Bytes::from(json!({ "name": "orders", "request": { "url": "/a/{" } }).to_string());
        let resp = handle_patch(&body, &engine).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["errors"].as_array().unwrap().len(), 1);

        assert_eq!(engine.snapshot().generation(), 1);
    }
}
