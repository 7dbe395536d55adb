//! Date helpers and the duration/offset grammar shared with async actions.
//!
//! An offset is an optional sign followed by one or more `<integer><unit>` pairs,
//! units being `ms`, `s`, `m`, `h` and `d`: `90s`, `-1h30m`, `+2d`.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeDelta, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormat {
    Rfc3339,
    Unix,
    UnixMilli,
    Pattern(String),
}

impl DateFormat {
    pub fn parse(format: Option<&str>) -> Result<Self, String> {
        match format.map(str::trim) {
            None | Some("") | Some("rfc3339") => Ok(DateFormat::Rfc3339),
            Some("unix") => Ok(DateFormat::Unix),
            Some("unixMilli") => Ok(DateFormat::UnixMilli),
            Some(pattern) => {
                if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(format!("invalid date format '{pattern}'"));
                }
                Ok(DateFormat::Pattern(pattern.to_string()))
            }
        }
    }
}

/// A compiled date helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSpec {
    pub format: DateFormat,
    pub offset: TimeDelta,
    pub utc: bool,
}

impl DateSpec {
    pub fn compile(format: Option<&str>, offset: Option<&str>, utc: bool) -> Result<Self, String> {
        Ok(Self {
            format: DateFormat::parse(format)?,
            offset: match offset {
                Some(text) => parse_offset(text)?,
                None => TimeDelta::zero(),
            },
            utc,
        })
    }

    pub fn render(&self) -> String {
        self.render_at(Utc::now())
    }

    pub fn render_at(&self, now: DateTime<Utc>) -> String {
        let at = now + self.offset;
        if self.utc {
            format_instant(&at, &self.format)
        } else {
            format_instant(&at.with_timezone(&Local), &self.format)
        }
    }
}

fn format_instant<Tz>(at: &DateTime<Tz>, format: &DateFormat) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match format {
        DateFormat::Rfc3339 => at.to_rfc3339(),
        DateFormat::Unix => at.timestamp().to_string(),
        DateFormat::UnixMilli => at.timestamp_millis().to_string(),
        DateFormat::Pattern(pattern) => at.format(pattern).to_string(),
    }
}

/// Parse a signed offset such as `-1h30m`
pub fn parse_offset(text: &str) -> Result<TimeDelta, String> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let millis = parse_unsigned_millis(body)?;
    let millis = i64::try_from(millis).map_err(|_| format!("offset '{text}' is too large"))?;
    Ok(TimeDelta::milliseconds(if negative { -millis } else { millis }))
}

/// Parse an unsigned duration such as `2s` or `1m30s`
pub fn parse_duration(text: &str) -> Result<std::time::Duration, String> {
    parse_unsigned_millis(text.trim()).map(std::time::Duration::from_millis)
}

fn parse_unsigned_millis(text: &str) -> Result<u64, String> {
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return Err(format!("expected a number in '{text}'"));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("number out of range in '{text}'"))?;
        rest = &rest[digits..];

        let unit_len = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
        let factor = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "" => return Err(format!("missing unit in '{text}'")),
            other => return Err(format!("unknown unit '{other}' in '{text}'")),
        };
        rest = &rest[unit_len..];

        total = amount
            .checked_mul(factor)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration '{text}' is too large"))?;
    }

    Ok(total)
}
