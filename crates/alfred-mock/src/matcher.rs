//! Request matching.
//!
//! A request is tested against the snapshot's mocks in declaration order and
//! the first mock whose method, URL pattern, header, query and body
//! constraints all hold wins.

use crate::helpers::extraction::{json_value_text, select_json};
use crate::mock::pattern::PathCaptures;
use crate::mock::{BodyConstraint, CompiledMock, MatchRule, MockSnapshot, ValueConstraint};
use crate::request::MockRequest;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ValueMatcher {
    Equals(String),
    Contains(String),
    Matches(Regex),
}

impl ValueMatcher {
    pub fn compile(constraint: &ValueConstraint) -> Result<Self, String> {
        match constraint {
            ValueConstraint::Exact(value) => Ok(ValueMatcher::Equals(value.clone())),
            ValueConstraint::Rule(rule) => Self::from_rule(rule),
        }
    }

    pub fn from_rule(rule: &MatchRule) -> Result<Self, String> {
        match (&rule.equals, &rule.contains, &rule.matches) {
            (Some(v), None, None) => Ok(ValueMatcher::Equals(v.clone())),
            (None, Some(v), None) => Ok(ValueMatcher::Contains(v.clone())),
            (None, None, Some(p)) => Regex::new(p)
                .map(ValueMatcher::Matches)
                .map_err(|e| format!("invalid regex '{p}': {e}")),
            _ => Err("exactly one of 'equals', 'contains' or 'matches' is required".to_string()),
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            ValueMatcher::Equals(expected) => value == expected,
            ValueMatcher::Contains(needle) => value.contains(needle.as_str()),
            ValueMatcher::Matches(regex) => regex.is_match(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BodyMatcher {
    pub path: Option<String>,
    pub matcher: ValueMatcher,
}

impl BodyMatcher {
    pub fn compile(constraint: &BodyConstraint) -> Result<Self, String> {
        Ok(Self {
            path: constraint.path.clone(),
            matcher: ValueMatcher::from_rule(&constraint.rule)?,
        })
    }
}

/// A mock selected for a request, with the path variables it captured
#[derive(Debug, Clone)]
pub struct MatchedMock {
    pub mock: Arc<CompiledMock>,
    pub captures: PathCaptures,
}

/// Test one mock against a request
pub fn matches(mock: &CompiledMock, request: &MockRequest) -> Option<PathCaptures> {
    if mock.method != request.method {
        return None;
    }

    let captures = mock.pattern.matches(&request.path)?;

    let headers_ok = mock.headers.iter().all(|(name, matcher)| {
        request
            .header(name)
            .map(|v| matcher.is_match(v))
            .unwrap_or(false)
    });
    if !headers_ok {
        return None;
    }

    let query_ok = mock.query.iter().all(|(name, matcher)| {
        request
            .query_param(name)
            .map(|v| matcher.is_match(v))
            .unwrap_or(false)
    });
    if !query_ok {
        return None;
    }

    // Parsed at most once per mock, and only when a path constraint needs it
    let parsed_body: OnceCell<Option<serde_json::Value>> = OnceCell::new();
    let body_ok = mock.body.iter().all(|constraint| match &constraint.path {
        None => constraint.matcher.is_match(&request.body),
        Some(path) => parsed_body
            .get_or_init(|| serde_json::from_str(&request.body).ok())
            .as_ref()
            .and_then(|json| select_json(json, path))
            .and_then(json_value_text)
            .map(|v| constraint.matcher.is_match(&v))
            .unwrap_or(false),
    });
    if !body_ok {
        return None;
    }

    Some(captures)
}

/// First mock in declaration order whose matcher accepts the request; `None` is a miss
pub fn find_match(snapshot: &MockSnapshot, request: &MockRequest) -> Option<MatchedMock> {
    snapshot.mocks().iter().find_map(|mock| {
        matches(mock, request).map(|captures| MatchedMock {
            mock: Arc::clone(mock),
            captures,
        })
    })
}
