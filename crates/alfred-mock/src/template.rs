//! Response templating.
//!
//! Placeholders are written `{{ name }}` (inner whitespace optional) and are bound
//! to resolved helper values by name.
//!
//! # Example
//!
//! ```json
//! "response": {
//!     "headers": { "From-Req-Header": "{{ From-Req-Header }}" },
//!     "body": "{\"from-req-path\": \"{{ from-req-path }}\"}"
//! }
//! ```
//!
//! Rendering is a single pass: substituted text is never scanned again, and a
//! placeholder without a binding renders as the empty string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Regex for matching placeholders: {{ name }}, {{name}}, {{ alfred.req.id }}
static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex is valid"));

/// Name to value lookup used while rendering
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Bindings for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Bindings for [(String, String)] {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Render a template, substituting every placeholder with its bound value
pub fn render<B: Bindings + ?Sized>(template: &str, bindings: &B) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            bindings.lookup(caps[1].trim()).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// Names of all placeholders in a string, in order of appearance
pub fn placeholder_names(template: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Check if a string contains placeholders
pub fn has_placeholders(s: &str) -> bool {
    PLACEHOLDER_REGEX.is_match(s)
}
