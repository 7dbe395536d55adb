//! System handlers: health, reload, store reset.

use crate::admin_api::types::{json_response, ClearedResponse, ErrorResponse, HealthResponse};
use crate::engine::MockEngine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::warn;

/// GET /alfred/health
pub fn handle_health(engine: &MockEngine) -> Response<Full<Bytes>> {
    let snapshot = engine.snapshot();
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok".to_string(),
            generation: snapshot.generation(),
            mocks: snapshot.len(),
        },
    )
}

/// POST /alfred/reload - the previous snapshot stays live on failure
pub async fn handle_reload(engine: &MockEngine) -> Response<Full<Bytes>> {
    match engine.reload().await {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(e) => {
            warn!("Reload rejected: {}", e);
            json_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &ErrorResponse {
                    message: "Reload rejected, previous mocks are still live".to_string(),
                    errors: e.messages(),
                    mocks: None,
                },
            )
        }
    }
}

/// DELETE /alfred/db
pub fn handle_clear_store(engine: &MockEngine) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &ClearedResponse {
            cleared: engine.clear_store(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin_api::handlers::test_support::{body_json, engine};
    use serde_json::json;

    #[tokio::test]
    async fn test_handle_health() {
        let (engine, _dir) = engine(json!([{ "request": { "url": "/a" } }])).await;
        let resp = handle_health(&engine);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "status": "ok", "generation": 1, "mocks": 1 })
        );
    }

    #[tokio::test]
    async fn test_handle_reload() {
        let (engine, dir) = engine(json!([])).await;
        std::fs::write(dir.path().join("a.json"), r#"{"request": {"url": "/a"}}"#).unwrap();

        let resp = handle_reload(&engine).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "generation": 2, "mocks": 1 }));
    }

    #[tokio::test]
    async fn test_handle_reload_failure() {
        let (engine, dir) = engine(json!([{ "request": { "url": "/kept" } }])).await;
        std::fs::write(dir.path().join("a.json"), r#"{"request": {"url": "/a/{b"}}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), "{ broken").unwrap();

        let resp = handle_reload(&engine).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);

        assert_eq!(engine.snapshot().names(), vec!["GET-/kept"]);
    }

    #[tokio::test]
    async fn test_handle_clear_store() {
        let (engine, _dir) = engine(json!([])).await;
        engine.store().set("a", "1".to_string());
        engine.store().set("b", "2".to_string());

        let resp = handle_clear_store(&engine);
        assert_eq!(body_json(resp).await, json!({ "cleared": 2 }));
        assert!(engine.store().is_empty());
    }
}
