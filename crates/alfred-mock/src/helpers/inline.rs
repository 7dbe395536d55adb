//! Inline helper expressions written straight into templates:
//!
//! ```text
//! {{ alfred.req.userId }}
//! {{ alfred.time.now.utc.add('-1h').format('%Y-%m-%d') }}
//! {{ alfred.random.RandomIntBetween(1,6) }}
//! ```
//!
//! Trailing `@param:'value'` pairs tune the helper:
//!
//! ```text
//! {{ alfred.req.city @name:'my-city' }}
//! {{ alfred.req.city @regex:'city=(\w+)' }}
//! ```
//!
//! `@name` is the name scripts see the helper under; the placeholder keeps
//! rendering its value. `@regex` reads `alfred.req` targets out of `text/*`
//! bodies through the pattern's first capture group.

use super::date::DateSpec;
use super::extraction::TextPattern;
use super::random::RandomShape;
use super::HelperSource;
use once_cell::sync::Lazy;
use regex::Regex;

pub const INLINE_PREFIX: &str = "alfred.";

static ADD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.add\('([^']*)'\)").expect("add regex is valid"));
static FORMAT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.format\('([^']*)'\)").expect("format regex is valid"));
static PARAM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*@(\w*):'([^']*)'").expect("param regex is valid"));

const PARAM_NAME: &str = "name";
const PARAM_REGEX_PATTERN: &str = "regex";

/// A parsed inline expression
#[derive(Debug, Clone, PartialEq)]
pub struct InlineHelper {
    /// Set by `@name`
    pub name: Option<String>,
    pub source: HelperSource,
}

pub fn is_inline(name: &str) -> bool {
    name.starts_with(INLINE_PREFIX)
}

/// Compile an inline expression into a helper source
pub fn parse(expression: &str) -> Result<InlineHelper, String> {
    let (expression, params) = split_params(expression)?;
    let body = expression
        .strip_prefix(INLINE_PREFIX)
        .ok_or_else(|| format!("'{expression}' is not an inline helper"))?;

    let mut name = None;
    let mut pattern = None;
    for (key, value) in params {
        match key.as_str() {
            PARAM_NAME if value.trim().is_empty() => {
                return Err("@name must not be empty".to_string());
            }
            PARAM_NAME => name = Some(value),
            PARAM_REGEX_PATTERN => pattern = Some(TextPattern::compile(&value)?),
            other => return Err(format!("unknown helper parameter '@{other}'")),
        }
    }

    let (kind, rest) = body.split_once('.').unwrap_or((body, ""));
    let source = match kind {
        "req" => {
            if rest.is_empty() {
                return Err("alfred.req needs a target name".to_string());
            }
            HelperSource::Request {
                target: rest.to_string(),
                pattern,
            }
        }
        _ if pattern.is_some() => {
            return Err("@regex only applies to alfred.req helpers".to_string());
        }
        "time" => HelperSource::Date(parse_time(rest)?),
        "random" => HelperSource::Random(RandomShape::from_inline(rest)?),
        other => return Err(format!("unknown inline helper type '{other}'")),
    };

    Ok(InlineHelper { name, source })
}

/// The `@name` an inline placeholder declares, if any
pub fn declared_name(placeholder: &str) -> Option<String> {
    if !is_inline(placeholder) {
        return None;
    }
    PARAM_REGEX
        .captures_iter(placeholder)
        .find(|caps| &caps[1] == PARAM_NAME)
        .map(|caps| caps[2].to_string())
}

/// Split `alfred.req.city @name:'c'` into the expression and its params.
/// Params must trail the expression.
fn split_params(expression: &str) -> Result<(&str, Vec<(String, String)>), String> {
    let Some(first) = PARAM_REGEX.find(expression) else {
        return Ok((expression.trim(), Vec::new()));
    };

    let (head, tail) = expression.split_at(first.start());
    let leftover = PARAM_REGEX.replace_all(tail, "");
    if !leftover.trim().is_empty() {
        return Err(format!("unexpected text '{}' after helper parameters", leftover.trim()));
    }

    let params = PARAM_REGEX
        .captures_iter(tail)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect();
    Ok((head.trim(), params))
}

fn parse_time(expression: &str) -> Result<DateSpec, String> {
    let Some(modifiers) = expression.strip_prefix("now") else {
        return Err(format!("time helper must start with 'now', got '{expression}'"));
    };

    let offset = ADD_REGEX.captures(modifiers).map(|c| c[1].to_string());
    let format = FORMAT_REGEX.captures(modifiers).map(|c| c[1].to_string());

    // Anything left after removing the known modifiers is a typo
    let without_add = ADD_REGEX.replace_all(modifiers, "");
    let leftover = FORMAT_REGEX
        .replace_all(&without_add, "")
        .replace(".utc", "");
    if !leftover.is_empty() {
        return Err(format!("unknown time modifier '{leftover}'"));
    }

    DateSpec::compile(
        format.as_deref(),
        offset.as_deref(),
        modifiers.contains(".utc"),
    )
}
