//! Inbound request view.
//!
//! The listener collects the body and hands the engine a [`MockRequest`]. The
//! matcher, the helper extractor and the script sandbox all read from it. Header
//! names are lowercased and every header keeps its arrival order, so "first
//! value" lookups are well defined.

use hyper::HeaderMap;

/// Request data captured from the wire
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    /// HTTP method, uppercased
    pub method: String,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string, if any
    pub query_string: Option<String>,
    /// Decoded query parameters in arrival order
    pub query: Vec<(String, String)>,
    /// Headers in arrival order (names lowercased)
    pub headers: Vec<(String, String)>,
    /// Request body as text
    pub body: String,
}

impl MockRequest {
    /// Create a request view from hyper request parts
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: &HeaderMap,
        body: impl Into<String>,
    ) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_lowercase(), val.to_string()))
            })
            .collect();

        Self {
            method: method.to_uppercase(),
            path: normalize_path(path),
            query_string: query_string.filter(|q| !q.is_empty()).map(str::to_string),
            query: parse_query_string(query_string),
            headers,
            body: body.into(),
        }
    }

    /// Build a request from a `path?query` target and literal header pairs.
    pub fn from_parts(method: &str, target: &str, headers: &[(&str, &str)], body: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (target, None),
        };

        Self {
            method: method.to_uppercase(),
            path: normalize_path(path),
            query_string: query.filter(|q| !q.is_empty()).map(str::to_string),
            query: parse_query_string(query),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            body: body.to_string(),
        }
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Path plus query string, as the client sent it
    pub fn url(&self) -> String {
        match &self.query_string {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Parse a query string into decoded key/value pairs, keeping duplicates.
pub fn parse_query_string(query: Option<&str>) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.push((decode_component(key), decode_component(value)));
            } else if !pair.is_empty() {
                params.push((decode_component(pair), String::new()));
            }
        }
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
