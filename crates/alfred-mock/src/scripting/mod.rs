//! JavaScript hooks.
//!
//! A mock may name a script file defining any of three functions:
//!
//! ```javascript
//! function setup() {
//!     dbLoadFile("user-files/db/customers.json");
//! }
//!
//! function updateHelpers(helpers) {
//!     helpers.push({ name: "greeting", value: "hello" });
//! }
//!
//! function alfred(mock, helpers, req, res) {
//!     const visits = Number(dbGet(req.pathVars.id) || 0) + 1;
//!     dbSet(req.pathVars.id, visits);
//!     res.headers["X-Visits"] = String(visits);
//! }
//! ```
//!
//! Scripts run on a dedicated worker pool under a time budget. Every invocation
//! gets a fresh interpreter, so the key-value store is the only state that
//! survives between calls. Store writes land only when the invocation
//! completes in time; a failed or overdue one leaves the store untouched.

mod budget;
mod js_engine;
mod script_pool;

pub use budget::ScriptBudget;
pub use js_engine::run_hook;
pub use script_pool::{ScriptPool, ScriptPoolConfig};

use crate::helpers::HelperValue;
use crate::mock::pattern::PathCaptures;
use crate::request::MockRequest;
use crate::response::MockResponse;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Source of one script file, read at load time
#[derive(Debug)]
pub struct ScriptSource {
    /// File name, used in logs
    pub name: String,
    pub path: PathBuf,
    pub code: Arc<str>,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, code: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            code: code.into(),
        }
    }
}

/// Read-only request view handed to `alfred`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub method: String,
    pub path: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub path_vars: BTreeMap<String, String>,
    pub body: String,
    /// Parsed body, `null` when it is not JSON
    pub json: Value,
}

impl ScriptRequest {
    pub fn new(request: &MockRequest, captures: &PathCaptures) -> Self {
        let mut headers = BTreeMap::new();
        for (name, value) in &request.headers {
            headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
        let mut query = BTreeMap::new();
        for (name, value) in &request.query {
            query.entry(name.clone()).or_insert_with(|| value.clone());
        }

        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            url: request.url(),
            headers,
            query,
            path_vars: captures
                .named()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: request.body.clone(),
            json: serde_json::from_str(&request.body).unwrap_or(Value::Null),
        }
    }
}

/// The hook to invoke, with its arguments
#[derive(Debug, Clone)]
pub enum Hook {
    Setup,
    UpdateHelpers(Vec<HelperValue>),
    Respond {
        mock: Arc<Value>,
        helpers: Vec<HelperValue>,
        request: ScriptRequest,
        response: MockResponse,
    },
}

impl Hook {
    pub fn function_name(&self) -> &'static str {
        match self {
            Hook::Setup => "setup",
            Hook::UpdateHelpers(_) => "updateHelpers",
            Hook::Respond { .. } => "alfred",
        }
    }
}

/// What a hook invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// The script does not define the hook
    Skipped,
    Completed,
    Helpers(Vec<HelperValue>),
    Response(MockResponse),
}

/// Recoverable script failure; the pipeline keeps its pre-script values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script {script} exceeded its {timeout_ms} ms budget")]
    Timeout { script: String, timeout_ms: u64 },

    #[error("Script pool queue is full")]
    QueueFull,

    #[error("Script pool is shut down")]
    ShutDown,

    #[error("Script execution was cancelled")]
    Cancelled,

    #[error("Script {script} failed: {message}")]
    Evaluation { script: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::pattern::UrlPattern;

    #[test]
    fn test_script_request_view() {
        let pattern = UrlPattern::parse("/users/{id}").unwrap();
        let request = MockRequest::from_parts(
            "POST",
            "/users/7?tab=a&tab=b",
            &[("X-Trace", "t1"), ("x-trace", "t2")],
            r#"{"name": "Bruce"}"#,
        );
        let captures = pattern.matches(&request.path).unwrap();
        let view = ScriptRequest::new(&request, &captures);

        assert_eq!(view.url, "/users/7?tab=a&tab=b");
        assert_eq!(view.headers["x-trace"], "t1");
        assert_eq!(view.query["tab"], "a");
        assert_eq!(view.path_vars["id"], "7");
        assert_eq!(view.json["name"], "Bruce");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["pathVars"]["id"], "7");
    }

    #[test]
    fn test_script_request_non_json_body() {
        let request = MockRequest::from_parts("POST", "/x", &[], "<xml/>");
        let view = ScriptRequest::new(&request, &PathCaptures::default());
        assert_eq!(view.json, Value::Null);
        assert_eq!(view.body, "<xml/>");
    }

    #[test]
    fn test_hook_function_names() {
        assert_eq!(Hook::Setup.function_name(), "setup");
        assert_eq!(Hook::UpdateHelpers(vec![]).function_name(), "updateHelpers");
    }
}
