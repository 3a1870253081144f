//! Numbers that arrive either bare or wrapped in an object.
//!
//! The 2025 season API started nesting ratings (`{"value": 42.5}`) and scores
//! (`{"total": 55}` / `{"amount": 55}`) where older seasons sent plain numbers.

use serde_json::{Map, Value as JsonValue};

/// Decoded shape of a loosely-typed numeric field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNumeric<'a> {
    Number(f64),
    Text(&'a str),
    Nested(&'a Map<String, JsonValue>),
    Missing,
}

impl<'a> From<Option<&'a JsonValue>> for RawNumeric<'a> {
    fn from(value: Option<&'a JsonValue>) -> Self {
        match value {
            Some(JsonValue::Number(n)) => n.as_f64().map_or(RawNumeric::Missing, RawNumeric::Number),
            Some(JsonValue::String(s)) => RawNumeric::Text(s),
            Some(JsonValue::Object(map)) => RawNumeric::Nested(map),
            _ => RawNumeric::Missing,
        }
    }
}

impl RawNumeric<'_> {
    /// Nested objects resolve through the first of `fields` they contain.
    pub fn resolve(&self, fields: &[&str]) -> f64 {
        let value = match self {
            RawNumeric::Number(n) => *n,
            RawNumeric::Text(s) => s.trim().parse().unwrap_or(0.0),
            RawNumeric::Nested(map) => fields
                .iter()
                .find_map(|field| map.get(*field))
                .map(|inner| RawNumeric::from(Some(inner)).resolve(fields))
                .unwrap_or(0.0),
            RawNumeric::Missing => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

/// Coerce a bare-or-nested numeric field to `f64`; anything unusable is `0.0`.
pub fn coerce_numeric(value: Option<&JsonValue>, fields: &[&str]) -> f64 {
    RawNumeric::from(value).resolve(fields)
}

pub const RATING_FIELDS: &[&str] = &["value"];
pub const SCORE_FIELDS: &[&str] = &["total", "amount"];
