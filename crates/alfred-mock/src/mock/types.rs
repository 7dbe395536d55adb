//! Raw mock definitions as they appear in mock files, plus the errors raised
//! while turning them into compiled mocks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Mock Definition
// ============================================================================

/// One mock as written by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub request: RequestSpec,
    #[serde(default)]
    pub response: ResponseSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helpers: Vec<HelperDeclaration>,
    /// Script file name, relative to the functions directory
    #[serde(
        default,
        alias = "function-file",
        skip_serializing_if = "Option::is_none"
    )]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySpec>,
    #[serde(default, alias = "actions", skip_serializing_if = "Vec::is_empty")]
    pub async_actions: Vec<ActionSpec>,
}

impl MockDefinition {
    /// The explicit name, or `METHOD-url` when none was given
    pub fn effective_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let target = self
            .request
            .url
            .as_deref()
            .or(self.request.url_regex.as_deref())
            .unwrap_or_default();
        format!("{}-{}", self.request.method_or_default(), target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, ValueConstraint>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, ValueConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<BodyConstraint>,
}

impl RequestSpec {
    pub fn method_or_default(&self) -> String {
        self.method
            .as_deref()
            .unwrap_or("GET")
            .trim()
            .to_ascii_uppercase()
    }
}

/// A bare string means equality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueConstraint {
    Exact(String),
    Rule(MatchRule),
}

/// Exactly one of the three operators must be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyConstraint {
    /// JSON dot path into the body; the raw text is tested without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub rule: MatchRule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, alias = "body-file", skip_serializing_if = "Option::is_none")]
    pub body_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_response_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<u64>,
}

/// Delay range in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySpec {
    #[serde(default)]
    pub min: u64,
    #[serde(default)]
    pub max: u64,
}

// ============================================================================
// Helper Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(flatten)]
    pub source: HelperSourceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum HelperSourceSpec {
    Path {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        var: Option<String>,
    },
    Query {
        key: String,
    },
    Header {
        key: String,
    },
    Body {
        path: String,
        #[serde(default)]
        format: BodyFormat,
    },
    Random {
        kind: RandomKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<String>,
        #[serde(default = "default_utc")]
        utc: bool,
    },
}

fn default_utc() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    #[default]
    Auto,
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RandomKind {
    Alphanumeric,
    Uuid,
    Int,
    Boolean,
    FirstName,
    LastName,
    FullName,
    Email,
    City,
    Country,
    Phone,
    Word,
}

// ============================================================================
// Async Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    #[serde(rename = "type", default = "default_action_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default)]
    pub min_scheduled_time: u64,
    #[serde(default)]
    pub max_scheduled_time: u64,
}

pub const SEND_REQUEST: &str = "send-request";

fn default_action_type() -> String {
    SEND_REQUEST.to_string()
}

// ============================================================================
// Errors
// ============================================================================

/// A single rejected definition
#[derive(Error, Debug)]
pub enum MockError {
    #[error("Failed to parse {file}: {reason}")]
    Parse { file: PathBuf, reason: String },

    #[error("Mock '{mock}': invalid request matcher: {reason}")]
    InvalidMatcher { mock: String, reason: String },

    #[error("Mock '{mock}': invalid URL pattern '{pattern}': {reason}")]
    InvalidPattern {
        mock: String,
        pattern: String,
        reason: String,
    },

    #[error("Mock '{mock}': invalid helper '{helper}': {reason}")]
    InvalidHelper {
        mock: String,
        helper: String,
        reason: String,
    },

    #[error("Mock '{mock}': cannot be stored as JSON: {reason}")]
    InvalidDefinition { mock: String, reason: String },

    #[error("Mock '{mock}': invalid response: {reason}")]
    InvalidResponse { mock: String, reason: String },

    #[error("Mock '{mock}': invalid async action: {reason}")]
    InvalidAction { mock: String, reason: String },

    #[error("Mock '{mock}': cannot read {path}: {source}")]
    MissingFile {
        mock: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate mock name '{0}'")]
    DuplicateName(String),
}

/// Every failure from one load; a load with any failure publishes nothing
#[derive(Error, Debug)]
#[error("{} mock definition error(s): {}", .errors.len(), render_errors(.errors))]
pub struct LoadError {
    pub errors: Vec<MockError>,
}

impl LoadError {
    pub fn single(error: MockError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Messages for the reload endpoint
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

fn render_errors(errors: &[MockError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Patch must be a JSON object")]
    NotAnObject,

    #[error("Patch must name the mock to change")]
    MissingName,

    #[error("No mock named '{name}'")]
    UnknownMock { name: String, known: Vec<String> },

    #[error("Patched definition is invalid: {0}")]
    Invalid(String),

    #[error(transparent)]
    Rejected(#[from] LoadError),
}
