//! Body field extraction: JSON dot paths, XML element paths and regex
//! captures over plain text bodies.

use crate::mock::BodyFormat;
use regex::Regex;
use serde_json::Value;

/// Render a JSON value as helper text. Scalars are plain text, containers compact JSON.
pub fn json_value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        _ => Some(value.to_string()),
    }
}

/// Walk a parsed JSON document along a dot path (`test.items[0].id`)
pub fn select_json<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim_start_matches('$').trim_start_matches('.');

    let mut current = json;
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }

        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                current = current.get(field)?;
            }

            // Supports chained indexes: matrix[1][0]
            for index in part[bracket_pos..].split('[').skip(1) {
                let index: usize = index.strip_suffix(']')?.parse().ok()?;
                current = current.get(index)?;
            }
        } else {
            current = current.get(part)?;
        }
    }

    Some(current)
}

/// Extract a field from a JSON body
pub fn extract_jsonpath(json_str: &str, path: &str) -> Option<String> {
    let json: Value = serde_json::from_str(json_str).ok()?;
    select_json(&json, path).and_then(json_value_text)
}

/// Extract the string value of the first node an XPath selects
pub fn extract_xpath(xml_str: &str, path: &str) -> Option<String> {
    use sxd_document::parser;
    use sxd_xpath::{evaluate_xpath, Value};

    let package = parser::parse(xml_str).ok()?;
    let document = package.as_document();

    match evaluate_xpath(&document, path) {
        Ok(Value::String(s)) => Some(s),
        Ok(Value::Number(n)) => Some(n.to_string()),
        Ok(Value::Boolean(b)) => Some(b.to_string()),
        Ok(Value::Nodeset(nodes)) => nodes.iter().next().map(|n| n.string_value()),
        Err(_) => None,
    }
}

/// `order.item.id` becomes `/order/item/id`; a leading `/` means the path is already XPath
pub fn element_path_to_xpath(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.replace('.', "/"))
    }
}

/// Regex whose first capture group is the value read from a text body
#[derive(Debug, Clone)]
pub struct TextPattern(Regex);

impl TextPattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        let regex = Regex::new(pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
        if regex.captures_len() < 2 {
            return Err(format!("regex '{pattern}' has no capture group"));
        }
        Ok(Self(regex))
    }

    /// Group 1 of the first match
    pub fn capture(&self, text: &str) -> Option<String> {
        self.0
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

pub fn is_text_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/"))
        .unwrap_or(false)
}

/// Decide how to read a body when the declaration says `auto`
pub fn detect_format(content_type: Option<&str>, body: &str) -> BodyFormat {
    let is_xml = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("xml"))
        .unwrap_or(false)
        || body.trim_start().starts_with('<');
    if is_xml {
        BodyFormat::Xml
    } else {
        BodyFormat::Json
    }
}

/// Extract a field from a request body in the given format
pub fn extract_body_field(
    body: &str,
    content_type: Option<&str>,
    path: &str,
    format: BodyFormat,
) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    let format = match format {
        BodyFormat::Auto => detect_format(content_type, body),
        explicit => explicit,
    };

    match format {
        BodyFormat::Xml => extract_xpath(body, &element_path_to_xpath(path)),
        _ => extract_jsonpath(body, path),
    }
}
