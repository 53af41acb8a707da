//! Typed validation of raw JSON payloads.
//!
//! Wire schemas are plain `#[derive(Deserialize)]` structs. [`validate`] runs
//! them through `serde_path_to_error`, so the first mismatch comes back as a
//! [`ValidationError`] naming the exact field along with the expected and
//! actual shape. Nothing is returned unless the whole payload checks out.
//!
//! The `deserialize_with` helpers below carry the normalizations applied while
//! validating.

use chrono::{DateTime, NaiveDateTime};
use serde::{
    Deserialize, Deserializer,
    de::{DeserializeOwned, Error as _, Unexpected},
};
use serde_json::Value;
use serde_path_to_error::{Path, Segment};
use std::fmt::Write as _;

use crate::error::ValidationError;

/// Outcome of validating one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(ValidationError),
}

impl<T> Validated<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        match self {
            Validated::Valid(value) => Validated::Valid(f(value)),
            Validated::Invalid(err) => Validated::Invalid(err),
        }
    }

    pub fn into_result(self) -> Result<T, ValidationError> {
        match self {
            Validated::Valid(value) => Ok(value),
            Validated::Invalid(err) => Err(err),
        }
    }
}

/// Deserialize `raw` as `T`, reporting the first offending field.
pub fn validate<T: DeserializeOwned>(raw: &Value) -> Validated<T> {
    match serde_path_to_error::deserialize::<_, T>(raw) {
        Ok(value) => Validated::Valid(value),
        Err(err) => Validated::Invalid(describe(render(err.path()), &err.inner().to_string())),
    }
}

/// `$.objects.periods[2]` style rendering.
fn render(path: &Path) -> String {
    let mut out = String::from("$");
    for segment in path.iter() {
        let _ = match segment {
            Segment::Seq { index } => write!(out, "[{index}]"),
            Segment::Map { key } => write!(out, ".{key}"),
            Segment::Enum { variant } => write!(out, ".{variant}"),
            _ => write!(out, ".?"),
        };
    }
    out
}

/// Split a serde message into expected and actual shape.
fn describe(path: String, message: &str) -> ValidationError {
    if let Some(field) = message.strip_prefix("missing field `").and_then(|m| m.strip_suffix('`')) {
        return ValidationError {
            path: format!("{path}.{field}"),
            expected: format!("field `{field}`"),
            actual: "missing".to_string(),
        };
    }

    for (prefix, label) in [("invalid type: ", ""), ("invalid value: ", ""), ("unknown variant ", "variant ")] {
        if let Some((actual, expected)) = message.strip_prefix(prefix).and_then(|m| m.rsplit_once(", expected ")) {
            return ValidationError {
                path,
                expected: expected.to_string(),
                actual: format!("{label}{actual}"),
            };
        }
    }

    ValidationError { path, expected: "a valid value".to_string(), actual: message.to_string() }
}

fn normalize_timestamp(s: &str) -> Option<String> {
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return Some(s.to_string());
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.format("%Y-%m-%dT%H:%M:%S+00:00").to_string())
}

/// Timestamp normalized to carry an explicit offset.
///
/// Zone-less values (`2024-01-05 10:00:00` or `2024-01-05T10:00:00`) are
/// UTC and get rewritten to `2024-01-05T10:00:00+00:00`. Values that
/// already carry an offset are kept unchanged.
pub fn utc_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let s = String::deserialize(d)?;
    normalize_timestamp(&s)
        .ok_or_else(|| D::Error::invalid_value(Unexpected::Str(&s), &"a timestamp (YYYY-MM-DD HH:MM:SS)"))
}

pub fn optional_utc_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) => normalize_timestamp(&s).map(Some).ok_or_else(|| {
            D::Error::invalid_value(Unexpected::Str(&s), &"a timestamp (YYYY-MM-DD HH:MM:SS)")
        }),
    }
}

/// Boolean coercion with JavaScript truthiness: `null`, `false`, `0` and
/// `""` are false, everything else (arrays and objects included) is true.
pub fn truthy<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// `null` reads as the default value.
pub fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}
