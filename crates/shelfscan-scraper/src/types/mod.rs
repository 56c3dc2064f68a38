//! Serde trees for the raw back-end responses.
//!
//! Every field is optional and scalar fields accept either strings or
//! numbers; back-ends are inconsistent about both. Item lists use
//! [`Lenient`] so one malformed element is skipped rather than failing the
//! whole page.

pub mod graphql;
pub mod rest;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A list element that either parsed as `T` or was skipped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    Parsed(T),
    Unparseable(serde::de::IgnoredAny),
}

impl<T> Lenient<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Lenient::Parsed(value) => Some(value),
            Lenient::Unparseable(_) => None,
        }
    }
}

/// An identifier that may arrive as a string or a number.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Code(#[serde(deserialize_with = "opt_string")] pub Option<String>);

/// String-or-number into `Option<String>`; empty strings become `None`.
pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}

/// Number-or-numeric-string into `Option<f64>`.
pub(crate) fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

/// Non-negative integer, accepted as a number or a numeric string.
pub(crate) fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    }
}
