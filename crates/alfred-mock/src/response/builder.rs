use super::{GlobalDelay, MockResponse};
use crate::helpers::{self, HelperValues};
use crate::matcher::MatchedMock;
use crate::request::MockRequest;
use crate::scripting::{Hook, HookOutcome, ScriptPool, ScriptRequest};
use crate::template;
use std::sync::Arc;
use tracing::{debug, warn};

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// The response plus the helper values it was rendered with; actions reuse them
#[derive(Debug, Clone)]
pub struct BuiltResponse {
    pub response: MockResponse,
    pub helpers: HelperValues,
}

/// Runs the per-request pipeline for a matched mock:
/// helpers, `updateHelpers`, templating, `alfred`, latency.
pub struct ResponseBuilder {
    pool: Arc<ScriptPool>,
    delay: Arc<GlobalDelay>,
}

impl ResponseBuilder {
    pub fn new(pool: Arc<ScriptPool>, delay: Arc<GlobalDelay>) -> Self {
        Self { pool, delay }
    }

    pub async fn build(&self, matched: &MatchedMock, request: &MockRequest) -> BuiltResponse {
        let mock = &matched.mock;

        let mut helper_values = helpers::resolve_all(&mock.helpers, request, &matched.captures);

        if let Some(script) = &mock.script {
            match self
                .pool
                .execute(Arc::clone(script), Hook::UpdateHelpers(helper_values.to_vec()))
                .await
            {
                Ok(HookOutcome::Helpers(updates)) => helper_values.merge(updates),
                Ok(_) => {}
                Err(e) => warn!("Mock {}: updateHelpers skipped: {}", mock.name, e),
            }
        }

        let mut response = self.render(matched, &helper_values);

        if let Some(script) = &mock.script {
            let hook = Hook::Respond {
                mock: Arc::clone(&mock.definition),
                helpers: helper_values.to_vec(),
                request: ScriptRequest::new(request, &matched.captures),
                response: response.clone(),
            };
            match self.pool.execute(Arc::clone(script), hook).await {
                Ok(HookOutcome::Response(scripted)) => response = scripted,
                Ok(_) => {}
                Err(e) => warn!("Mock {}: alfred() skipped: {}", mock.name, e),
            }
        }

        let wait = mock.latency.sample() + self.delay.current();
        if !wait.is_zero() {
            debug!("Mock {}: delaying response by {:?}", mock.name, wait);
            tokio::time::sleep(wait).await;
        }

        BuiltResponse {
            response,
            helpers: helper_values,
        }
    }

    /// Template rendering plus the default content type
    fn render(&self, matched: &MatchedMock, values: &HelperValues) -> MockResponse {
        let template = &matched.mock.response;

        let body = template::render(&template.body, values);
        let mut headers: Vec<(String, String)> = template
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), template::render(value, values)))
            .collect();

        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            let content_type = template
                .content_type
                .clone()
                .unwrap_or_else(|| default_content_type(&body).to_string());
            headers.push(("Content-Type".to_string(), content_type));
        }

        MockResponse {
            status: template.status,
            headers,
            body,
        }
    }
}

/// JSON for bodies that parse as an object or array, plain text otherwise
pub(crate) fn default_content_type(body: &str) -> &'static str {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.is_object() || value.is_array() => JSON_CONTENT_TYPE,
        _ => TEXT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::matcher::find_match;
    use crate::mock::{CompileContext, MockDefinition, MockRegistry};
    use crate::response::DelayRequest;
    use crate::scripting::ScriptPoolConfig;
    use crate::store::KeyValueStore;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    struct Fixture {
        registry: MockRegistry,
        builder: ResponseBuilder,
        delay: Arc<GlobalDelay>,
        store: Arc<dyn KeyValueStore>,
        _functions: tempfile::TempDir,
    }

    fn fixture(defs: serde_json::Value, scripts: &[(&str, &str)], timeout_ms: u64) -> Fixture {
        let functions = tempfile::tempdir().unwrap();
        for (name, code) in scripts {
            std::fs::write(functions.path().join(name), code).unwrap();
        }

        let registry = MockRegistry::new(CompileContext::new("", functions.path()));
        let defs: Vec<MockDefinition> = serde_json::from_value(defs).unwrap();
        registry.load(defs).unwrap();

        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let pool = ScriptPool::new(
            ScriptPoolConfig {
                workers: 2,
                queue_size: 16,
                timeout_ms,
                loop_iteration_limit: 2_000_000,
            },
            Arc::clone(&store),
        )
        .unwrap();
        let delay = Arc::new(GlobalDelay::new());

        Fixture {
            registry,
            builder: ResponseBuilder::new(Arc::new(pool), Arc::clone(&delay)),
            delay,
            store,
            _functions: functions,
        }
    }

    impl Fixture {
        async fn build(&self, request: &MockRequest) -> BuiltResponse {
            let snapshot = self.registry.current();
            let matched = find_match(&snapshot, request).expect("request should match");
            self.builder.build(&matched, request).await
        }
    }

    fn helpers_mock() -> serde_json::Value {
        json!([{
            "name": "json-xml-req-helpers",
            "request": { "method": "POST", "url": "/some/json-xml-req-helpers/{pathVar}" },
            "response": {
                "headers": { "From-Req-Header": "{{ From-Req-Header }}" },
                "body": "{\"from-req-path\": \"{{ from-req-path }}\", \"from-req-body\": {{ from-req-body }}}"
            },
            "helpers": [
                { "name": "from-req-path", "source": "path", "var": "pathVar" },
                { "name": "From-Req-Header", "source": "header", "key": "header-var" },
                { "name": "from-req-body", "source": "body", "path": "test.body-var" }
            ]
        }])
    }

    fn helpers_request() -> MockRequest {
        MockRequest::from_parts(
            "POST",
            "/some/json-xml-req-helpers/abc",
            &[("header-var", "X"), ("content-type", "application/json")],
            r#"{"test": {"body-var": 42}}"#,
        )
    }

    #[tokio::test]
    async fn test_helpers_rendered_into_body_and_headers() {
        let fixture = fixture(helpers_mock(), &[], 1000);
        let built = fixture.build(&helpers_request()).await;

        let body: serde_json::Value = serde_json::from_str(&built.response.body).unwrap();
        assert_eq!(body["from-req-path"], "abc");
        assert_eq!(body["from-req-body"], 42);
        assert_eq!(built.response.header("From-Req-Header"), Some("X"));
        assert_eq!(built.response.header("content-type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(built.helpers.get("from-req-path"), Some("abc"));
    }

    #[tokio::test]
    async fn test_default_content_types() {
        let fixture = fixture(
            json!([
                { "request": { "url": "/text" }, "response": { "body": "Congratulations, Sir !" } },
                { "request": { "url": "/typed" }, "response": { "body": "<a/>", "contentType": "application/xml" } },
                { "request": { "url": "/explicit" }, "response": {
                    "body": "{}", "contentType": "application/xml",
                    "headers": { "content-type": "application/vnd.custom" } } }
            ]),
            &[],
            1000,
        );

        let text = fixture.build(&MockRequest::from_parts("GET", "/text", &[], "")).await;
        assert_eq!(text.response.status, 200);
        assert_eq!(text.response.body, "Congratulations, Sir !");
        assert_eq!(text.response.header("Content-Type"), Some(TEXT_CONTENT_TYPE));

        let typed = fixture.build(&MockRequest::from_parts("GET", "/typed", &[], "")).await;
        assert_eq!(typed.response.header("Content-Type"), Some("application/xml"));

        let explicit = fixture.build(&MockRequest::from_parts("GET", "/explicit", &[], "")).await;
        assert_eq!(explicit.response.headers.len(), 1);
        assert_eq!(
            explicit.response.header("Content-Type"),
            Some("application/vnd.custom")
        );
    }

    #[tokio::test]
    async fn test_update_helpers_runs_before_rendering() {
        let fixture = fixture(
            json!([{
                "request": { "url": "/greet/{who}" },
                "response": { "body": "{{ greeting }}, {{ who }}" },
                "helpers": [{ "name": "who", "source": "path", "index": 0 }],
                "function": "greet.js"
            }]),
            &[(
                "greet.js",
                r#"
                function updateHelpers(helpers) {
                    helpers.push({ name: "greeting", value: "Good evening" });
                    helpers[0].value = helpers[0].value.toUpperCase();
                }
                "#,
            )],
            5000,
        );

        let built = fixture
            .build(&MockRequest::from_parts("GET", "/greet/bruce", &[], ""))
            .await;
        assert_eq!(built.response.body, "Good evening, BRUCE");
        assert_eq!(built.helpers.get("greeting"), Some("Good evening"));
    }

    #[tokio::test]
    async fn test_response_hook_sees_rendered_response() {
        let fixture = fixture(
            json!([{
                "request": { "url": "/hook" },
                "response": { "status": 200, "body": "rendered" },
                "function": "hook.js"
            }]),
            &[(
                "hook.js",
                r#"
                function alfred(mock, helpers, req, res) {
                    res.status = 202;
                    res.body = res.body + " then scripted";
                }
                "#,
            )],
            5000,
        );

        let built = fixture.build(&MockRequest::from_parts("GET", "/hook", &[], "")).await;
        assert_eq!(built.response.status, 202);
        assert_eq!(built.response.body, "rendered then scripted");
    }

    #[tokio::test]
    async fn test_script_timeout_keeps_unscripted_response() {
        let defs = json!([{
            "request": { "url": "/slow" },
            "response": { "status": 201, "body": "as declared" },
            "function": "slow.js"
        }]);
        let fixture = fixture(
            defs,
            &[(
                "slow.js",
                r#"
                function alfred(mock, helpers, req, res) {
                    dbSet("touched", "yes");
                    var i = 0;
                    while (true) { i = i + 1; }
                }
                "#,
            )],
            5,
        );

        let built = fixture.build(&MockRequest::from_parts("GET", "/slow", &[], "")).await;
        assert_eq!(built.response.status, 201);
        assert_eq!(built.response.body, "as declared");
        assert_eq!(built.response.header("Content-Type"), Some(TEXT_CONTENT_TYPE));
        assert_eq!(fixture.store.get("touched"), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_throwing_script_keeps_unscripted_response() {
        let fixture = fixture(
            json!([{
                "request": { "url": "/throws" },
                "response": { "body": "fine" },
                "function": "throws.js"
            }]),
            &[(
                "throws.js",
                r#"
                function updateHelpers(helpers) { throw new Error("nope"); }
                function alfred(mock, helpers, req, res) {
                    dbSet("touched", "yes");
                    undefinedFunction();
                }
                "#,
            )],
            5000,
        );

        let built = fixture.build(&MockRequest::from_parts("GET", "/throws", &[], "")).await;
        assert_eq!(built.response.status, 200);
        assert_eq!(built.response.body, "fine");
        assert_eq!(fixture.store.get("touched"), None);
        assert!(logs_contain("updateHelpers skipped"));
        assert!(logs_contain("alfred() skipped"));
    }

    #[tokio::test]
    async fn test_latency_and_global_delay() {
        let fixture = fixture(
            json!([{ "request": { "url": "/slow" }, "latency": { "min": 30, "max": 30 } }]),
            &[],
            1000,
        );

        let start = Instant::now();
        fixture.build(&MockRequest::from_parts("GET", "/slow", &[], "")).await;
        assert!(start.elapsed() >= Duration::from_millis(30));

        fixture.delay.set(DelayRequest {
            min_response_time: 40,
            duration: 60_000,
        });
        let start = Instant::now();
        fixture.build(&MockRequest::from_parts("GET", "/slow", &[], "")).await;
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_default_content_type() {
        assert_eq!(default_content_type(r#"{"a": 1}"#), JSON_CONTENT_TYPE);
        assert_eq!(default_content_type("[1, 2]"), JSON_CONTENT_TYPE);
        assert_eq!(default_content_type("42"), TEXT_CONTENT_TYPE);
        assert_eq!(default_content_type("hello"), TEXT_CONTENT_TYPE);
        assert_eq!(default_content_type(""), TEXT_CONTENT_TYPE);
    }
}
