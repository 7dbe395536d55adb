//! Compilation of raw definitions into request-time structures.
//!
//! Everything that can be rejected is rejected here, so the request path never
//! touches untyped JSON: URL patterns, constraint regexes, helper declarations,
//! response status, body files, script files and async actions.

use super::pattern::UrlPattern;
use super::types::{MockDefinition, MockError};
use crate::actions::CompiledAction;
use crate::helpers::{inline, Helper};
use crate::matcher::{BodyMatcher, ValueMatcher};
use crate::response::LatencyRange;
use crate::scripting::ScriptSource;
use crate::template;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directories that file references in a definition are resolved against
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    pub bodies_dir: PathBuf,
    pub functions_dir: PathBuf,
}

impl CompileContext {
    pub fn new(bodies_dir: impl Into<PathBuf>, functions_dir: impl Into<PathBuf>) -> Self {
        Self {
            bodies_dir: bodies_dir.into(),
            functions_dir: functions_dir.into(),
        }
    }
}

/// Script files read during one load, shared by every mock that names them
pub type ScriptCache = HashMap<PathBuf, Arc<ScriptSource>>;

/// Response fields before helper substitution
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub content_type: Option<String>,
}

/// A validated mock, immutable once published
#[derive(Debug, Clone)]
pub struct CompiledMock {
    pub name: String,
    pub method: String,
    pub pattern: UrlPattern,
    pub headers: Vec<(String, ValueMatcher)>,
    pub query: Vec<(String, ValueMatcher)>,
    pub body: Vec<BodyMatcher>,
    pub response: ResponseTemplate,
    /// Explicit helpers first, then inline `alfred.*` helpers
    pub helpers: Vec<Helper>,
    pub latency: LatencyRange,
    pub actions: Vec<CompiledAction>,
    pub script: Option<Arc<ScriptSource>>,
    /// Canonical definition, handed to scripts and used as the base for patches
    pub definition: Arc<serde_json::Value>,
}

impl CompiledMock {
    pub fn url(&self) -> &str {
        self.pattern.as_str()
    }
}

pub fn compile(
    mut definition: MockDefinition,
    ctx: &CompileContext,
    scripts: &mut ScriptCache,
) -> Result<CompiledMock, MockError> {
    let name = definition.effective_name();
    definition.name = Some(name.clone());

    let method = definition.request.method_or_default();
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(MockError::InvalidMatcher {
            mock: name,
            reason: format!("invalid method '{method}'"),
        });
    }

    let pattern = compile_pattern(&definition, &name)?;

    let invalid_matcher = |reason: String| MockError::InvalidMatcher {
        mock: name.clone(),
        reason,
    };
    let headers = definition
        .request
        .headers
        .iter()
        .map(|(k, c)| {
            ValueMatcher::compile(c)
                .map(|m| (k.to_ascii_lowercase(), m))
                .map_err(|e| invalid_matcher(format!("header '{k}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let query = definition
        .request
        .query
        .iter()
        .map(|(k, c)| {
            ValueMatcher::compile(c)
                .map(|m| (k.clone(), m))
                .map_err(|e| invalid_matcher(format!("query '{k}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let body = definition
        .request
        .body
        .iter()
        .map(|c| BodyMatcher::compile(c).map_err(|e| invalid_matcher(format!("body: {e}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let response = compile_response(&definition, &name, ctx)?;

    let actions = definition
        .async_actions
        .iter()
        .map(|spec| {
            CompiledAction::compile(spec).map_err(|reason| MockError::InvalidAction {
                mock: name.clone(),
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let helpers = compile_helpers(&definition, &name, &pattern, &response, &actions)?;

    let latency = match definition.latency {
        Some(latency) => LatencyRange::new(latency.min, latency.max),
        None => LatencyRange::new(
            definition.response.min_response_time.unwrap_or(0),
            definition.response.max_response_time.unwrap_or(0),
        ),
    };

    let script = match &definition.function {
        Some(file) => Some(load_script(file, &name, ctx, scripts)?),
        None => None,
    };

    let canonical =
        serde_json::to_value(&definition).map_err(|e| MockError::InvalidDefinition {
            mock: name.clone(),
            reason: e.to_string(),
        })?;

    Ok(CompiledMock {
        name,
        method,
        pattern,
        headers,
        query,
        body,
        response,
        helpers,
        latency,
        actions,
        script,
        definition: Arc::new(canonical),
    })
}

fn compile_pattern(definition: &MockDefinition, name: &str) -> Result<UrlPattern, MockError> {
    let (raw, result) = match (&definition.request.url, &definition.request.url_regex) {
        (Some(url), None) => (url.clone(), UrlPattern::parse(url)),
        (None, Some(re)) => (re.clone(), UrlPattern::parse_regex(re)),
        (Some(_), Some(_)) => (
            String::new(),
            Err("set either 'url' or 'urlRegex', not both".to_string()),
        ),
        (None, None) => (String::new(), Err("'url' or 'urlRegex' is required".to_string())),
    };

    result.map_err(|reason| MockError::InvalidPattern {
        mock: name.to_string(),
        pattern: raw,
        reason,
    })
}

fn compile_response(
    definition: &MockDefinition,
    name: &str,
    ctx: &CompileContext,
) -> Result<ResponseTemplate, MockError> {
    let spec = &definition.response;
    let invalid = |reason: String| MockError::InvalidResponse {
        mock: name.to_string(),
        reason,
    };

    let status = spec.status.unwrap_or(200);
    if !(100..=999).contains(&status) {
        return Err(invalid(format!("status {status} is out of range")));
    }

    let body = match (&spec.body, &spec.body_file) {
        (Some(_), Some(_)) => {
            return Err(invalid("set either 'body' or 'bodyFile', not both".to_string()))
        }
        (Some(serde_json::Value::String(text)), None) => text.clone(),
        (Some(value), None) => value.to_string(),
        (None, Some(file)) => {
            let path = ctx.bodies_dir.join(file);
            std::fs::read_to_string(&path).map_err(|source| MockError::MissingFile {
                mock: name.to_string(),
                path,
                source,
            })?
        }
        (None, None) => String::new(),
    };

    Ok(ResponseTemplate {
        status,
        headers: spec
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        body,
        content_type: spec.content_type.clone(),
    })
}

fn compile_helpers(
    definition: &MockDefinition,
    name: &str,
    pattern: &UrlPattern,
    response: &ResponseTemplate,
    actions: &[CompiledAction],
) -> Result<Vec<Helper>, MockError> {
    let invalid = |helper: &str, reason: String| MockError::InvalidHelper {
        mock: name.to_string(),
        helper: helper.to_string(),
        reason,
    };

    let mut helpers: Vec<Helper> = Vec::with_capacity(definition.helpers.len());
    for decl in &definition.helpers {
        if helpers.iter().any(|h| h.name == decl.name) {
            return Err(invalid(&decl.name, "duplicate helper name".to_string()));
        }
        helpers.push(Helper::compile(decl, pattern).map_err(|e| invalid(&decl.name, e))?);
    }

    let mut templated: Vec<&str> = vec![response.body.as_str()];
    templated.extend(response.headers.iter().map(|(_, v)| v.as_str()));
    for action in actions {
        templated.extend(action.templates());
    }

    for text in templated {
        for placeholder in template::placeholder_names(text) {
            if !inline::is_inline(&placeholder) || helpers.iter().any(|h| h.name == placeholder) {
                continue;
            }
            let helper = Helper::inline(&placeholder).map_err(|e| invalid(&placeholder, e))?;
            match helpers.iter().find(|h| h.name == helper.name) {
                // Same `@name` on several placeholders of the same expression
                Some(existing) if existing.source == helper.source => {}
                Some(_) => {
                    return Err(invalid(&placeholder, "duplicate helper name".to_string()));
                }
                None => helpers.push(helper),
            }
        }
    }

    Ok(helpers)
}

fn load_script(
    file: &str,
    name: &str,
    ctx: &CompileContext,
    scripts: &mut ScriptCache,
) -> Result<Arc<ScriptSource>, MockError> {
    let path = ctx.functions_dir.join(file);
    if let Some(cached) = scripts.get(&path) {
        return Ok(Arc::clone(cached));
    }

    let code = std::fs::read_to_string(&path).map_err(|source| MockError::MissingFile {
        mock: name.to_string(),
        path: path.clone(),
        source,
    })?;
    let script = Arc::new(ScriptSource::new(display_name(file, &path), path.clone(), code));
    scripts.insert(path, Arc::clone(&script));
    Ok(script)
}

fn display_name(file: &str, path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file)
        .to_string()
}
