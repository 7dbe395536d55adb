//! Request helpers.
//!
//! A helper is a named value extracted from the inbound request (path variable,
//! query parameter, header, body field) or generated (random token, date). All
//! helpers of a mock are resolved in declaration order, in a single pass, before
//! any templating or scripting happens.

pub mod date;
pub mod extraction;
pub mod inline;
pub mod random;

use crate::mock::pattern::{PathCaptures, UrlPattern};
use crate::mock::{BodyFormat, HelperDeclaration, HelperSourceSpec};
use crate::request::MockRequest;
use crate::template::Bindings;
use date::DateSpec;
use extraction::TextPattern;
use random::RandomShape;
use serde::{Deserialize, Serialize};

/// Where a compiled helper takes its value from
#[derive(Debug, Clone, PartialEq)]
pub enum HelperSource {
    /// Positional path variable, resolved at load
    PathVar(usize),
    Query(String),
    Header(String),
    Body { path: String, format: BodyFormat },
    /// `alfred.req.<target>`: query, then path variable, then header, then body.
    /// With a pattern, `text/*` bodies are read through its first capture group.
    Request {
        target: String,
        pattern: Option<TextPattern>,
    },
    Random(RandomShape),
    Date(DateSpec),
}

/// A helper declaration validated against its mock's URL pattern
#[derive(Debug, Clone, PartialEq)]
pub struct Helper {
    pub name: String,
    pub default: Option<String>,
    pub source: HelperSource,
}

impl Helper {
    pub fn compile(decl: &HelperDeclaration, pattern: &UrlPattern) -> Result<Self, String> {
        if decl.name.trim().is_empty() {
            return Err("helper name must not be empty".to_string());
        }

        let source = match &decl.source {
            HelperSourceSpec::Path { index, var } => match (index, var) {
                (_, Some(var)) => {
                    let position = pattern
                        .var_position(var)
                        .ok_or_else(|| format!("URL pattern has no variable named '{var}'"))?;
                    HelperSource::PathVar(position)
                }
                (Some(index), None) => HelperSource::PathVar(*index),
                (None, None) => return Err("path helper needs 'index' or 'var'".to_string()),
            },
            HelperSourceSpec::Query { key } => HelperSource::Query(key.clone()),
            HelperSourceSpec::Header { key } => HelperSource::Header(key.to_ascii_lowercase()),
            HelperSourceSpec::Body { path, format } => {
                if path.trim().is_empty() {
                    return Err("body helper needs a non-empty path".to_string());
                }
                HelperSource::Body {
                    path: path.clone(),
                    format: *format,
                }
            }
            HelperSourceSpec::Random {
                kind,
                length,
                min,
                max,
            } => HelperSource::Random(RandomShape::compile(*kind, *length, *min, *max)?),
            HelperSourceSpec::Date {
                format,
                offset,
                utc,
            } => HelperSource::Date(DateSpec::compile(
                format.as_deref(),
                offset.as_deref(),
                *utc,
            )?),
        };

        Ok(Self {
            name: decl.name.clone(),
            default: decl.default.clone(),
            source,
        })
    }

    /// An implicit helper for an `alfred.*` placeholder, named by its
    /// `@name` param or else by the placeholder text
    pub fn inline(expression: &str) -> Result<Self, String> {
        let parsed = inline::parse(expression)?;
        Ok(Self {
            name: parsed.name.unwrap_or_else(|| expression.to_string()),
            default: None,
            source: parsed.source,
        })
    }

    /// Produce this helper's value. Never fails: a missing source yields the default.
    pub fn resolve(&self, request: &MockRequest, captures: &PathCaptures) -> HelperValue {
        let extracted = match &self.source {
            HelperSource::PathVar(index) => captures.get(*index).map(str::to_string),
            HelperSource::Query(key) => request.query_param(key).map(str::to_string),
            HelperSource::Header(key) => request.header(key).map(str::to_string),
            HelperSource::Body { path, format } => extraction::extract_body_field(
                &request.body,
                request.content_type(),
                path,
                *format,
            ),
            HelperSource::Request { target, pattern } => request
                .query_param(target)
                .or_else(|| captures.by_name(target))
                .or_else(|| request.header(target))
                .map(str::to_string)
                .or_else(|| match pattern {
                    Some(pattern) if extraction::is_text_content_type(request.content_type()) => {
                        pattern.capture(&request.body)
                    }
                    _ => extraction::extract_body_field(
                        &request.body,
                        request.content_type(),
                        target,
                        BodyFormat::Auto,
                    ),
                }),
            HelperSource::Random(shape) => Some(shape.generate()),
            HelperSource::Date(spec) => Some(spec.render()),
        };

        HelperValue {
            name: self.name.clone(),
            value: extracted
                .or_else(|| self.default.clone())
                .unwrap_or_default(),
        }
    }
}

/// A resolved helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperValue {
    pub name: String,
    pub value: String,
}

impl HelperValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Resolved helpers of one request, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperValues(Vec<HelperValue>);

impl HelperValues {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Update by name, appending unknown names
    pub fn set(&mut self, name: &str, value: String) {
        match self.0.iter_mut().find(|h| h.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(HelperValue::new(name, value)),
        }
    }

    pub fn merge(&mut self, updates: Vec<HelperValue>) {
        for update in updates {
            self.set(&update.name, update.value);
        }
    }

    pub fn as_slice(&self) -> &[HelperValue] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<HelperValue> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<HelperValue>> for HelperValues {
    fn from(values: Vec<HelperValue>) -> Self {
        Self(values)
    }
}

impl Bindings for HelperValues {
    /// Placeholders carrying `@name` render the helper registered under that name
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            inline::declared_name(name).and_then(|declared| self.get(&declared))
        })
    }
}

/// Resolve every helper of a mock against one request
pub fn resolve_all(helpers: &[Helper], request: &MockRequest, captures: &PathCaptures) -> HelperValues {
    HelperValues(
        helpers
            .iter()
            .map(|helper| helper.resolve(request, captures))
            .collect(),
    )
}
