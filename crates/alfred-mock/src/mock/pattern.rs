//! URL patterns with variable segments.
//!
//! Two forms are accepted:
//! - segment patterns such as `/users/{id}/orders/:order`, where every variable
//!   segment matches exactly one non-empty path segment;
//! - regex patterns (`urlRegex`), where capture groups are the variables.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Var(String),
}

/// A compiled URL pattern
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Segments {
        raw: String,
        segments: Vec<Segment>,
    },
    Regex {
        raw: String,
        regex: Regex,
    },
}

/// Values captured by a successful match, in positional order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCaptures {
    values: Vec<String>,
    names: Vec<Option<String>>,
}

impl PathCaptures {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .and_then(|i| self.get(i))
    }

    /// Named captures only
    pub fn named(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .zip(&self.values)
            .filter_map(|(n, v)| n.as_deref().map(|n| (n, v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn parse_segment(segment: &str) -> Result<Segment, String> {
    if let Some(inner) = segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
    {
        if inner.is_empty() || inner.contains(['{', '}']) {
            return Err(format!("malformed variable segment '{segment}'"));
        }
        return Ok(Segment::Var(inner.to_string()));
    }

    if segment.contains(['{', '}']) {
        return Err(format!("malformed variable segment '{segment}'"));
    }

    match segment.strip_prefix(':') {
        Some("") => Err("empty variable name after ':'".to_string()),
        Some(name) => Ok(Segment::Var(name.to_string())),
        None => Ok(Segment::Literal(segment.to_string())),
    }
}

impl UrlPattern {
    /// Parse a segment pattern. A missing leading `/` is added.
    pub fn parse(url: &str) -> Result<Self, String> {
        let url = url.trim();
        let raw = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{url}")
        };

        if raw.contains('?') {
            return Err("query strings belong in the 'query' matcher".to_string());
        }

        let mut segments = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for part in split_path(&raw) {
            let segment = parse_segment(part)?;
            if let Segment::Var(name) = &segment {
                if seen.contains(name) {
                    return Err(format!("duplicate variable '{name}'"));
                }
                seen.push(name.clone());
            }
            segments.push(segment);
        }

        Ok(UrlPattern::Segments { raw, segments })
    }

    pub fn parse_regex(pattern: &str) -> Result<Self, String> {
        let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
        Ok(UrlPattern::Regex {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            UrlPattern::Segments { raw, .. } | UrlPattern::Regex { raw, .. } => raw,
        }
    }

    /// Number of positional variables
    pub fn var_count(&self) -> usize {
        match self {
            UrlPattern::Segments { segments, .. } => segments
                .iter()
                .filter(|s| matches!(s, Segment::Var(_)))
                .count(),
            UrlPattern::Regex { regex, .. } => regex.captures_len() - 1,
        }
    }

    /// Position of a named variable
    pub fn var_position(&self, name: &str) -> Option<usize> {
        match self {
            UrlPattern::Segments { segments, .. } => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Var(v) => Some(v.as_str()),
                    Segment::Literal(_) => None,
                })
                .position(|v| v == name),
            UrlPattern::Regex { regex, .. } => regex
                .capture_names()
                .skip(1)
                .position(|n| n == Some(name)),
        }
    }

    /// Match a request path, returning the captured variables
    pub fn matches(&self, path: &str) -> Option<PathCaptures> {
        match self {
            UrlPattern::Segments { segments, .. } => {
                let parts = split_path(path);
                if parts.len() != segments.len() {
                    return None;
                }

                let mut captures = PathCaptures::default();
                for (segment, part) in segments.iter().zip(parts) {
                    match segment {
                        Segment::Literal(lit) => {
                            if lit != part {
                                return None;
                            }
                        }
                        Segment::Var(name) => {
                            if part.is_empty() {
                                return None;
                            }
                            let value = urlencoding::decode(part)
                                .map(|v| v.into_owned())
                                .unwrap_or_else(|_| part.to_string());
                            captures.values.push(value);
                            captures.names.push(Some(name.clone()));
                        }
                    }
                }
                Some(captures)
            }
            UrlPattern::Regex { regex, .. } => {
                let caps = regex.captures(path)?;
                let mut captures = PathCaptures::default();
                for (i, name) in regex.capture_names().enumerate().skip(1) {
                    captures
                        .values
                        .push(caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default());
                    captures.names.push(name.map(str::to_string));
                }
                Some(captures)
            }
        }
    }
}
