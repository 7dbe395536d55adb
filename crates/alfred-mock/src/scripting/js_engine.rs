use super::{Hook, HookOutcome, ScriptBudget, ScriptError, ScriptSource};
use crate::helpers::HelperValue;
use crate::response::MockResponse;
use crate::store::{read_batch_file, KeyValueStore};
use anyhow::{anyhow, Result};
use boa_engine::{
    js_string, native_function::NativeFunction, object::builtins::JsArray, property::PropertyKey,
    Context, JsNativeError, JsObject, JsResult, JsValue, Source,
};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const SCRIPT_LOG_TARGET: &str = "alfred_mock::script";

/// Maximum JavaScript call depth
const RECURSION_LIMIT: usize = 512;

/// Create a JavaScript object with Object.prototype, so toString and friends work
fn create_js_object(context: &Context) -> JsObject {
    JsObject::with_object_proto(context.intrinsics())
}

/// What native functions can reach during one invocation.
///
/// Writes are buffered in `writes` and reach the store only when the
/// invocation completes within its budget.
struct SandboxScope {
    store: Arc<dyn KeyValueStore>,
    script: String,
    deadline: Instant,
    writes: RefCell<BTreeMap<String, Option<String>>>,
}

impl SandboxScope {
    fn read(&self, key: &str) -> Option<String> {
        match self.writes.borrow().get(key) {
            Some(buffered) => buffered.clone(),
            None => self.store.get(key),
        }
    }

    fn write(&self, key: String, value: Option<String>) {
        self.writes.borrow_mut().insert(key, value);
    }
}

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<SandboxScope>> = const { RefCell::new(None) };
}

fn set_current_scope(scope: SandboxScope) {
    CURRENT_SCOPE.with(|s| {
        *s.borrow_mut() = Some(scope);
    });
}

fn take_current_scope() -> Option<SandboxScope> {
    CURRENT_SCOPE.with(|s| s.borrow_mut().take())
}

fn with_current_scope<T>(f: impl FnOnce(&SandboxScope) -> T) -> Option<T> {
    CURRENT_SCOPE.with(|s| s.borrow().as_ref().map(f))
}

/// Invoke one hook of a script in a fresh interpreter.
///
/// Returns [`HookOutcome::Skipped`] when the script does not define the hook.
/// Store writes become visible only if the hook completes and the budget can
/// still be committed; a failed or overdue invocation leaves the store as it
/// was. Once the deadline passes, every native function throws an uncatchable
/// runtime-limit error.
///
/// Must run on a thread that is not shared with other invocations in flight,
/// which the script pool guarantees.
pub fn run_hook(
    script: &ScriptSource,
    hook: Hook,
    store: Arc<dyn KeyValueStore>,
    budget: &ScriptBudget,
) -> Result<HookOutcome, ScriptError> {
    set_current_scope(SandboxScope {
        store: Arc::clone(&store),
        script: script.name.clone(),
        deadline: budget.deadline(),
        writes: RefCell::new(BTreeMap::new()),
    });

    let result = run_hook_inner(script, hook, budget.loop_iteration_limit());

    let writes = take_current_scope()
        .map(|scope| scope.writes.into_inner())
        .unwrap_or_default();

    let timed_out = || ScriptError::Timeout {
        script: script.name.clone(),
        timeout_ms: budget.timeout_ms(),
    };

    match result {
        Ok(outcome) => {
            if !budget.try_commit() {
                return Err(timed_out());
            }
            if !writes.is_empty() {
                store.apply(writes.into_iter().collect());
            }
            Ok(outcome)
        }
        Err(_) if budget.is_exhausted() => Err(timed_out()),
        Err(e) => Err(ScriptError::Evaluation {
            script: script.name.clone(),
            message: e.to_string(),
        }),
    }
}

fn run_hook_inner(script: &ScriptSource, hook: Hook, loop_iteration_limit: u64) -> Result<HookOutcome> {
    let mut context = Context::default();
    let limits = context.runtime_limits_mut();
    limits.set_loop_iteration_limit(loop_iteration_limit);
    limits.set_recursion_limit(RECURSION_LIMIT);

    install_globals(&mut context)?;

    context
        .eval(Source::from_bytes(script.code.as_bytes()))
        .map_err(|e| anyhow!("Failed to evaluate script: {e}"))?;

    let name = hook.function_name();
    let global = context.global_object();
    let func = global
        .get(js_string!(name), &mut context)
        .map_err(|e| anyhow!("Failed to look up {name}: {e}"))?;
    let Some(callable) = func.as_callable().cloned() else {
        return Ok(HookOutcome::Skipped);
    };

    match hook {
        Hook::Setup => {
            callable
                .call(&JsValue::undefined(), &[], &mut context)
                .map_err(|e| anyhow!("setup() failed: {e}"))?;
            Ok(HookOutcome::Completed)
        }
        Hook::UpdateHelpers(helpers) => {
            let arg = helpers_to_js(&mut context, &helpers)?;
            let returned = callable
                .call(&JsValue::undefined(), &[arg.clone()], &mut context)
                .map_err(|e| anyhow!("updateHelpers() failed: {e}"))?;

            let is_array = returned
                .as_object()
                .map(|o| o.is_array())
                .unwrap_or(false);
            let source = if is_array { returned } else { arg };
            Ok(HookOutcome::Helpers(read_helpers(&mut context, &source)?))
        }
        Hook::Respond {
            mock,
            helpers,
            request,
            response,
        } => {
            let mock_arg = json_to_js(&mut context, &mock)?;
            let helpers_arg = helpers_to_js(&mut context, &helpers)?;
            let request_value =
                serde_json::to_value(&request).map_err(|e| anyhow!("Failed to convert request: {e}"))?;
            let request_arg = json_to_js(&mut context, &request_value)?;
            let response_arg = response_to_js(&mut context, &response)?;

            let returned = callable
                .call(
                    &JsValue::undefined(),
                    &[mock_arg, helpers_arg, request_arg, response_arg.clone()],
                    &mut context,
                )
                .map_err(|e| anyhow!("alfred() failed: {e}"))?;

            let source = if returned.is_object() {
                returned
            } else {
                response_arg
            };
            Ok(HookOutcome::Response(read_response(
                &mut context,
                &source,
                &response,
            )?))
        }
    }
}

// Native functions; they reach the store through the thread-local scope

fn string_arg(args: &[JsValue], index: usize, what: &str, ctx: &mut Context) -> JsResult<String> {
    match args.get(index) {
        Some(v) if !v.is_undefined() && !v.is_null() => Ok(v.to_string(ctx)?.to_std_string_escaped()),
        _ => Err(JsNativeError::typ()
            .with_message(format!("{what} is required"))
            .into()),
    }
}

/// Uncatchable once the invocation's deadline has passed
fn check_deadline() -> JsResult<()> {
    let overdue = with_current_scope(|scope| Instant::now() >= scope.deadline).unwrap_or(false);
    if overdue {
        return Err(JsNativeError::runtime_limit()
            .with_message("script exceeded its time budget")
            .into());
    }
    Ok(())
}

fn db_get(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    check_deadline()?;
    let key = string_arg(args, 0, "key", ctx)?;

    match with_current_scope(|scope| scope.read(&key)).flatten() {
        Some(value) => Ok(JsValue::from(js_string!(value))),
        None => Ok(JsValue::undefined()),
    }
}

fn db_set(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    check_deadline()?;
    let key = string_arg(args, 0, "key", ctx)?;
    let value = match args.get(1) {
        Some(v) => match v.as_string() {
            Some(s) => s.to_std_string_escaped(),
            None => value_text(&js_to_json(ctx, v)?),
        },
        None => String::new(),
    };

    check_deadline()?;
    with_current_scope(|scope| scope.write(key, Some(value)));
    Ok(JsValue::undefined())
}

fn db_delete(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    check_deadline()?;
    let key = string_arg(args, 0, "key", ctx)?;
    with_current_scope(|scope| scope.write(key, None));
    Ok(JsValue::undefined())
}

fn db_load_file(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    check_deadline()?;
    let path = string_arg(args, 0, "path", ctx)?;

    // Parsed in full before anything is buffered
    let entries = read_batch_file(Path::new(&path))
        .map_err(|e| JsNativeError::error().with_message(e.to_string()))?;
    check_deadline()?;

    let count = entries.len();
    with_current_scope(|scope| {
        for (key, value) in entries {
            scope.write(key, Some(value));
        }
        tracing::info!(
            target: SCRIPT_LOG_TARGET,
            script = %scope.script,
            "Loaded {} entries from {}",
            count,
            path
        )
    })
    .ok_or_else(|| JsNativeError::error().with_message("no store is attached"))?;

    Ok(JsValue::from(count as i64))
}

fn format_log_args(args: &[JsValue], ctx: &mut Context) -> String {
    args.iter()
        .map(|v| match v.as_string() {
            Some(s) => s.to_std_string_escaped(),
            None => js_to_json(ctx, v)
                .map(|json| json.to_string())
                .unwrap_or_else(|_| v.display().to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

macro_rules! log_function {
    ($name:ident, $level:ident) => {
        fn $name(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
            check_deadline()?;
            let message = format_log_args(args, ctx);
            let script = with_current_scope(|scope| scope.script.clone()).unwrap_or_default();
            tracing::$level!(target: SCRIPT_LOG_TARGET, script = %script, "{}", message);
            Ok(JsValue::undefined())
        }
    };
}

log_function!(log_debug, debug);
log_function!(log_info, info);
log_function!(log_warn, warn);
log_function!(log_error, error);

/// Register a native function method on a JS object.
fn register_method(
    obj: &JsObject,
    name: &str,
    func: fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>,
    context: &mut Context,
) -> Result<()> {
    obj.set(
        PropertyKey::from(js_string!(name)),
        NativeFunction::from_fn_ptr(func).to_js_function(context.realm()),
        false,
        context,
    )
    .map(|_| ())
    .map_err(|e| anyhow!("Failed to set {name} function: {e}"))
}

/// dbGet/dbSet/dbDelete/dbLoadFile, log and console
fn install_globals(context: &mut Context) -> Result<()> {
    let global = context.global_object();

    register_method(&global, "dbGet", db_get, context)?;
    register_method(&global, "dbSet", db_set, context)?;
    register_method(&global, "dbDelete", db_delete, context)?;
    register_method(&global, "dbLoadFile", db_load_file, context)?;
    register_method(&global, "log", log_info, context)?;

    let console = create_js_object(context);
    register_method(&console, "log", log_info, context)?;
    register_method(&console, "info", log_info, context)?;
    register_method(&console, "debug", log_debug, context)?;
    register_method(&console, "warn", log_warn, context)?;
    register_method(&console, "error", log_error, context)?;
    global
        .set(js_string!("console"), console, false, context)
        .map_err(|e| anyhow!("Failed to set console global: {e}"))?;

    Ok(())
}

fn helpers_to_js(context: &mut Context, helpers: &[HelperValue]) -> Result<JsValue> {
    let value =
        serde_json::to_value(helpers).map_err(|e| anyhow!("Failed to convert helpers: {e}"))?;
    json_to_js(context, &value)
}

fn response_to_js(context: &mut Context, response: &MockResponse) -> Result<JsValue> {
    let headers: serde_json::Map<String, Value> = response
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let value = serde_json::json!({
        "status": response.status,
        "headers": headers,
        "body": response.body,
    });
    json_to_js(context, &value)
}

/// Read `[{name, value}]` back; entries without a name are ignored
fn read_helpers(context: &mut Context, value: &JsValue) -> Result<Vec<HelperValue>> {
    let json = js_to_json(context, value).map_err(|e| anyhow!("Failed to read helpers: {e}"))?;

    let Value::Array(items) = json else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?;
            let value = item.get("value").map(value_text).unwrap_or_default();
            Some(HelperValue::new(name, value))
        })
        .collect())
}

/// Read `{status, headers, body}` back, keeping the previous value of any
/// field the script removed or set to something unusable
fn read_response(
    context: &mut Context,
    value: &JsValue,
    previous: &MockResponse,
) -> Result<MockResponse> {
    let json = js_to_json(context, value).map_err(|e| anyhow!("Failed to read response: {e}"))?;

    let status = json
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (100..=999).contains(s))
        .unwrap_or(previous.status);

    let headers = match json.get("headers").and_then(Value::as_object) {
        Some(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), value_text(v)))
            .collect(),
        None => previous.headers.clone(),
    };

    let body = match json.get("body") {
        Some(v) => value_text(v),
        None => previous.body.clone(),
    };

    Ok(MockResponse {
        status,
        headers,
        body,
    })
}

/// Text form of a script value: strings verbatim, null empty, everything else JSON
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Convert JSON Value to JavaScript value
fn json_to_js(context: &mut Context, value: &Value) -> Result<JsValue> {
    json_to_js_result(context, value).map_err(|e| anyhow!("Failed to convert JSON to JS: {e}"))
}

fn json_to_js_result(context: &mut Context, value: &Value) -> JsResult<JsValue> {
    match value {
        Value::Null => Ok(JsValue::null()),
        Value::Bool(b) => Ok(JsValue::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(JsValue::from(i))
            } else if let Some(f) = n.as_f64() {
                Ok(JsValue::from(f))
            } else {
                Ok(JsValue::null())
            }
        }
        Value::String(s) => Ok(JsValue::from(js_string!(s.clone()))),
        Value::Array(arr) => {
            let js_arr = JsArray::new(context);
            for (i, v) in arr.iter().enumerate() {
                let js_val = json_to_js_result(context, v)?;
                js_arr.set(i as u32, js_val, false, context)?;
            }
            Ok(js_arr.into())
        }
        Value::Object(obj) => {
            let js_obj = create_js_object(context);
            for (k, v) in obj {
                let js_val = json_to_js_result(context, v)?;
                js_obj.set(js_string!(k.clone()), js_val, false, context)?;
            }
            Ok(js_obj.into())
        }
    }
}

/// Convert JavaScript value to JSON. Integral numbers stay integers.
fn js_to_json(context: &mut Context, value: &JsValue) -> JsResult<Value> {
    if value.is_null() || value.is_undefined() {
        return Ok(Value::Null);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(Value::Bool(b));
    }

    if let Some(n) = value.as_number() {
        if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
            return Ok(Value::from(n as i64));
        }
        return Ok(serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }

    if let Some(s) = value.as_string() {
        return Ok(Value::String(s.to_std_string_escaped()));
    }

    if let Some(obj) = value.as_object() {
        if obj.is_callable() {
            return Ok(Value::Null);
        }

        if obj.is_array() {
            let len = obj
                .get(js_string!("length"), context)?
                .as_number()
                .unwrap_or(0.0) as u32;
            let mut arr = Vec::with_capacity(len as usize);
            for i in 0..len {
                let item = obj.get(i, context)?;
                arr.push(js_to_json(context, &item)?);
            }
            return Ok(Value::Array(arr));
        }

        let mut map = serde_json::Map::new();
        let keys = obj.own_property_keys(context)?;
        for key in keys {
            let key_str = match &key {
                PropertyKey::String(s) => s.to_std_string_escaped(),
                PropertyKey::Index(i) => i.get().to_string(),
                PropertyKey::Symbol(_) => continue,
            };
            let val = obj.get(key.clone(), context)?;
            if val.is_undefined() {
                continue;
            }
            map.insert(key_str, js_to_json(context, &val)?);
        }
        return Ok(Value::Object(map));
    }

    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::mock::pattern::UrlPattern;
    use crate::request::MockRequest;
    use crate::scripting::ScriptRequest;
    use std::io::Write;
    use tracing_test::traced_test;

    const LIMIT: u64 = 1_000_000;

    fn script(code: &str) -> ScriptSource {
        ScriptSource::new("test.js", "test.js", code)
    }

    fn budget() -> ScriptBudget {
        ScriptBudget::new(5000, LIMIT)
    }

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(InMemoryStore::new())
    }

    fn base_response() -> MockResponse {
        MockResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: "original".to_string(),
        }
    }

    fn respond_hook() -> Hook {
        let pattern = UrlPattern::parse("/some/json-xml-req-helpers/{pathVar}").unwrap();
        let request = MockRequest::from_parts(
            "POST",
            "/some/json-xml-req-helpers/p1?q=1",
            &[("header-var", "X")],
            r#"{"test": {"body-var": 42}}"#,
        );
        let captures = pattern.matches(&request.path).unwrap();

        Hook::Respond {
            mock: Arc::new(serde_json::json!({ "name": "m1" })),
            helpers: vec![HelperValue::new("from-req-path", "p1")],
            request: ScriptRequest::new(&request, &captures),
            response: base_response(),
        }
    }

    fn expect_response(outcome: HookOutcome) -> MockResponse {
        match outcome {
            HookOutcome::Response(r) => r,
            other => panic!("Expected a response, got {other:?}"),
        }
    }

    #[test]
    fn test_setup_set_then_delete_leaves_key_absent() {
        let store = store();
        let code = r#"
            function setup() {
                dbSet("key1", "value1");
                dbDelete("key1", "value1");
            }
            function alfred(mock, helpers, req, res) {
                res.body = String(dbGet("key1"));
            }
        "#;

        let outcome = run_hook(&script(code), Hook::Setup, Arc::clone(&store), &budget()).unwrap();
        assert_eq!(outcome, HookOutcome::Completed);
        assert_eq!(store.get("key1"), None);

        let response = expect_response(run_hook(&script(code), respond_hook(), store, &budget()).unwrap());
        assert_eq!(response.body, "undefined");
    }

    #[test]
    fn test_missing_hook_is_skipped() {
        let outcome = run_hook(&script("var x = 1;"), Hook::Setup, store(), &budget()).unwrap();
        assert_eq!(outcome, HookOutcome::Skipped);

        let outcome = run_hook(&script("var alfred = 5;"), respond_hook(), store(), &budget()).unwrap();
        assert_eq!(outcome, HookOutcome::Skipped);
    }

    #[test]
    fn test_update_helpers_in_place() {
        let code = r#"
            function updateHelpers(helpers) {
                helpers[0].value = helpers[0].value.toUpperCase();
                helpers.push({ name: "added", value: 7 });
            }
        "#;
        let outcome = run_hook(
            &script(code),
            Hook::UpdateHelpers(vec![HelperValue::new("a", "abc")]),
            store(),
            &budget(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            HookOutcome::Helpers(vec![
                HelperValue::new("a", "ABC"),
                HelperValue::new("added", "7"),
            ])
        );
    }

    #[test]
    fn test_update_helpers_returned_array_wins() {
        let code = r#"
            function updateHelpers(helpers) {
                helpers[0].value = "ignored";
                return [{ name: "a", value: "returned" }];
            }
        "#;
        let outcome = run_hook(
            &script(code),
            Hook::UpdateHelpers(vec![HelperValue::new("a", "abc")]),
            store(),
            &budget(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            HookOutcome::Helpers(vec![HelperValue::new("a", "returned")])
        );
    }

    #[test]
    fn test_alfred_sees_request_and_mutates_response() {
        let code = r#"
            function alfred(mock, helpers, req, res) {
                res.status = 201;
                res.headers["X-Mock"] = mock.name;
                res.headers["X-Header"] = req.headers["header-var"];
                res.body = {
                    path: req.pathVars.pathVar,
                    body: req.json.test["body-var"],
                    helper: helpers[0].value,
                    url: req.url,
                    method: req.method
                };
            }
        "#;
        let response = expect_response(run_hook(&script(code), respond_hook(), store(), &budget()).unwrap());

        assert_eq!(response.status, 201);
        assert!(response
            .headers
            .contains(&("X-Mock".to_string(), "m1".to_string())));
        assert!(response
            .headers
            .contains(&("X-Header".to_string(), "X".to_string())));

        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["path"], "p1");
        assert_eq!(body["body"], 42);
        assert_eq!(body["helper"], "p1");
        assert_eq!(body["url"], "/some/json-xml-req-helpers/p1?q=1");
        assert_eq!(body["method"], "POST");
    }

    #[test]
    fn test_alfred_returned_object_is_used() {
        let code = r#"
            function alfred(mock, helpers, req, res) {
                return { status: 404, body: "gone" };
            }
        "#;
        let response = expect_response(run_hook(&script(code), respond_hook(), store(), &budget()).unwrap());

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "gone");
        // Headers were not returned, so they keep their previous value
        assert_eq!(response.headers, base_response().headers);
    }

    #[test]
    fn test_alfred_invalid_status_is_ignored() {
        let code = r#"
            function alfred(mock, helpers, req, res) { res.status = 42; res.body = "x"; }
        "#;
        let response = expect_response(run_hook(&script(code), respond_hook(), store(), &budget()).unwrap());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "x");
    }

    #[test]
    fn test_store_values_are_text() {
        let store = store();
        let code = r#"
            function setup() {
                dbSet("n", 5);
                dbSet("o", { a: [1, 2] });
                dbSet("s", "plain");
            }
        "#;
        run_hook(&script(code), Hook::Setup, Arc::clone(&store), &budget()).unwrap();

        assert_eq!(store.get("n"), Some("5".to_string()));
        assert_eq!(store.get("o"), Some(r#"{"a":[1,2]}"#.to_string()));
        assert_eq!(store.get("s"), Some("plain".to_string()));
    }

    #[test]
    fn test_db_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"c1": "Bruce", "c2": "Alfred"}}"#).unwrap();
        let path = file.path().display().to_string().replace('\\', "\\\\");

        let store = store();
        let code = format!(
            r#"
            function setup() {{
                var count = dbLoadFile("{path}");
                dbSet("count", count);
                try {{
                    dbLoadFile("/definitely/missing.json");
                }} catch (e) {{
                    dbSet("error", "caught");
                }}
            }}
        "#
        );
        run_hook(&script(&code), Hook::Setup, Arc::clone(&store), &budget()).unwrap();

        assert_eq!(store.get("c1"), Some("Bruce".to_string()));
        assert_eq!(store.get("count"), Some("2".to_string()));
        assert_eq!(store.get("error"), Some("caught".to_string()));
    }

    #[test]
    #[traced_test]
    fn test_logging_functions_are_available() {
        let code = r#"
            function setup() {
                log("plain", 1);
                console.log({ a: 1 });
                console.debug("d");
                console.info("i");
                console.warn("w");
                console.error("e");
            }
        "#;
        let outcome = run_hook(&script(code), Hook::Setup, store(), &budget()).unwrap();
        assert_eq!(outcome, HookOutcome::Completed);
        assert!(logs_contain("plain 1"));
        assert!(logs_contain(r#"{"a":1}"#));
    }

    #[test]
    fn test_syntax_error() {
        let err = run_hook(&script("function setup( {"), Hook::Setup, store(), &budget()).unwrap_err();
        assert!(matches!(err, ScriptError::Evaluation { .. }));
    }

    #[test]
    fn test_thrown_error() {
        let code = r#"function setup() { throw new Error("boom"); }"#;
        let err = run_hook(&script(code), Hook::Setup, store(), &budget()).unwrap_err();
        match err {
            ScriptError::Evaluation { script, message } => {
                assert_eq!(script, "test.js");
                assert!(message.contains("boom"));
            }
            other => panic!("Expected an evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_loop_limit_stops_runaway_script() {
        let code = r#"function setup() { while (true) {} }"#;
        let err = run_hook(&script(code), Hook::Setup, store(), &ScriptBudget::new(5000, 1_000)).unwrap_err();
        assert!(matches!(err, ScriptError::Evaluation { .. }));
    }

    #[test]
    fn test_recursion_limit_stops_deep_calls() {
        let code = r#"
            function down(n) { return down(n + 1) + 1; }
            function setup() { down(0); }
        "#;
        let err = run_hook(&script(code), Hook::Setup, store(), &budget()).unwrap_err();
        assert!(matches!(err, ScriptError::Evaluation { .. }));
    }

    #[test]
    fn test_writes_are_read_back_within_invocation() {
        let store = store();
        store.set("visits", "1".to_string());
        let code = r#"
            function setup() {
                dbSet("visits", Number(dbGet("visits")) + 1);
                dbSet("seen", dbGet("visits"));
                dbDelete("visits");
                dbSet("after-delete", String(dbGet("visits")));
            }
        "#;
        run_hook(&script(code), Hook::Setup, Arc::clone(&store), &budget()).unwrap();

        assert_eq!(store.get("seen"), Some("2".to_string()));
        assert_eq!(store.get("after-delete"), Some("undefined".to_string()));
        assert_eq!(store.get("visits"), None);
    }

    #[test]
    fn test_failed_hook_leaves_store_untouched() {
        let store = store();
        store.set("visits", "1".to_string());
        let code = r#"
            function alfred(mock, helpers, req, res) {
                dbSet("visits", "2");
                dbDelete("visits");
                dbSet("partial", "yes");
                throw new Error("halfway");
            }
        "#;
        let err = run_hook(&script(code), respond_hook(), Arc::clone(&store), &budget()).unwrap_err();

        assert!(matches!(err, ScriptError::Evaluation { .. }));
        assert_eq!(store.get("visits"), Some("1".to_string()));
        assert_eq!(store.get("partial"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overdue_invocation_cannot_touch_store() {
        let store = store();
        let code = r#"
            function setup() {
                try { dbSet("caught", "1"); } catch (e) {}
                dbSet("late", "x");
            }
        "#;
        let overdue = ScriptBudget::new(0, LIMIT);
        let err = run_hook(&script(code), Hook::Setup, Arc::clone(&store), &overdue).unwrap_err();

        assert_eq!(
            err,
            ScriptError::Timeout {
                script: "test.js".to_string(),
                timeout_ms: 0
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_abandoned_invocation_is_not_committed() {
        let store = store();
        let budget = budget();
        assert!(budget.abandon());

        let err = run_hook(
            &script(r#"function setup() { dbSet("k", "v"); }"#),
            Hook::Setup,
            Arc::clone(&store),
            &budget,
        )
        .unwrap_err();

        assert!(matches!(err, ScriptError::Timeout { .. }));
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_no_state_between_invocations() {
        let code = r#"
            var counter = (typeof counter === "undefined") ? 0 : counter;
            function alfred(mock, helpers, req, res) {
                counter = counter + 1;
                res.body = String(counter);
            }
        "#;
        let store = store();
        for _ in 0..3 {
            let response = expect_response(
                run_hook(&script(code), respond_hook(), Arc::clone(&store), &budget()).unwrap(),
            );
            assert_eq!(response.body, "1");
        }
    }

    #[test]
    fn test_scope_is_cleared_after_run() {
        run_hook(&script("function setup() {}"), Hook::Setup, store(), &budget()).unwrap();
        assert!(with_current_scope(|_| ()).is_none());
    }
}
