//! Value cleaning
//!
//! Raw tables store everything as text. Cleaning turns one raw value into a
//! typed [`CleanValue`] according to the target field's [`FieldKind`]. Nulls
//! stay typed so they bind with the column's type.

use serde::{Serialize, Serializer};

use super::registry::FieldKind;

/// Tokens treated as null for every field kind (trimmed, case-insensitive)
pub const NULL_TOKENS: &[&str] = &["", "nan", "null", "none", "n/a"];

/// Tokens that read as `true` for boolean fields
pub const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1", "on", "connected"];

/// Placeholders rejected by integer fields
pub const INTEGER_PLACEHOLDERS: &[&str] = &["unknown", "tbd", "n/a", "na"];

/// Text values are cut to this many characters
pub const MAX_TEXT_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum CleanValue {
    Text(Option<String>),
    Float(Option<f64>),
    Integer(Option<i64>),
    Boolean(Option<bool>),
}

impl CleanValue {
    /// Typed null for a field kind
    pub fn null(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => CleanValue::Text(None),
            FieldKind::Numeric | FieldKind::Latitude | FieldKind::Longitude => CleanValue::Float(None),
            FieldKind::Integer => CleanValue::Integer(None),
            FieldKind::Boolean => CleanValue::Boolean(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            CleanValue::Text(v) => v.is_none(),
            CleanValue::Float(v) => v.is_none(),
            CleanValue::Integer(v) => v.is_none(),
            CleanValue::Boolean(v) => v.is_none(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CleanValue::Text(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for CleanValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CleanValue::Text(v) => v.serialize(serializer),
            CleanValue::Float(v) => v.serialize(serializer),
            CleanValue::Integer(v) => v.serialize(serializer),
            CleanValue::Boolean(v) => v.serialize(serializer),
        }
    }
}

pub fn is_null_token(raw: &str) -> bool {
    let token = raw.trim().to_lowercase();
    NULL_TOKENS.contains(&token.as_str())
}

/// Clean one raw value for a field kind
pub fn clean_value(raw: Option<&str>, kind: FieldKind) -> CleanValue {
    let raw = match raw {
        Some(raw) if !is_null_token(raw) => raw,
        _ => return CleanValue::null(kind),
    };

    match kind {
        FieldKind::Text => CleanValue::Text(clean_text(raw)),
        FieldKind::Numeric => CleanValue::Float(clean_numeric(raw)),
        FieldKind::Latitude => CleanValue::Float(clean_numeric(raw).filter(|v| (-90.0..=90.0).contains(v))),
        FieldKind::Longitude => {
            CleanValue::Float(clean_numeric(raw).filter(|v| (-180.0..=180.0).contains(v)))
        },
        FieldKind::Integer => CleanValue::Integer(clean_integer(raw)),
        FieldKind::Boolean => CleanValue::Boolean(Some(clean_boolean(raw))),
    }
}

/// Strip everything except digits, `.` and `-`, then parse
pub fn clean_numeric(raw: &str) -> Option<f64> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if matches!(stripped.as_str(), "" | "." | "-" | "-.") {
        return None;
    }
    stripped.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn clean_integer(raw: &str) -> Option<i64> {
    let token = raw.trim().to_lowercase();
    if INTEGER_PLACEHOLDERS.contains(&token.as_str()) {
        return None;
    }
    clean_numeric(raw).map(|v| v.trunc() as i64)
}

/// Raw values are always text, so only the truth tokens count
pub fn clean_boolean(raw: &str) -> bool {
    TRUE_TOKENS.contains(&raw.trim().to_lowercase().as_str())
}

pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TEXT_CHARS).collect())
}
