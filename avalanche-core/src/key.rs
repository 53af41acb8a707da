use chrono::NaiveDate;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use tracing::trace;

/// A single typed parameter value inside a [`CacheKey`]. Dates render as
/// `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
    Date(NaiveDate),
    List(Vec<KeyPart>),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl From<NaiveDate> for KeyPart {
    fn from(value: NaiveDate) -> Self {
        KeyPart::Date(value)
    }
}

impl<T: Into<KeyPart>> From<Vec<T>> for KeyPart {
    fn from(values: Vec<T>) -> Self {
        KeyPart::List(values.into_iter().map(Into::into).collect())
    }
}

fn write_json<T: Serialize + ?Sized>(f: &mut fmt::Formatter<'_>, value: &T) -> fmt::Result {
    let text = serde_json::to_string(value).map_err(|_| fmt::Error)?;
    f.write_str(&text)
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(f, self)
    }
}

/// Structural cache key: a namespace plus named parameters.
///
/// Parameters are kept sorted by name, so two keys built from the same values
/// compare equal no matter the order in which the parameters were added.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    namespace: String,
    params: BTreeMap<String, KeyPart>,
}

impl CacheKey {
    pub fn builder(namespace: impl Into<String>) -> KeyBuilder {
        KeyBuilder {
            key: CacheKey {
                namespace: namespace.into(),
                params: BTreeMap::new(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn param(&self, name: &str) -> Option<&KeyPart> {
        self.params.get(name)
    }
}

/// Renders as the JSON array `["namespace",{"name":value,...}]`.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(f, &(&self.namespace, &self.params))
    }
}

#[derive(Debug)]
pub struct KeyBuilder {
    key: CacheKey,
}

impl KeyBuilder {
    /// Add (or replace) a named parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<KeyPart>) -> Self {
        self.key.params.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> CacheKey {
        trace!(key = %self.key, "built cache key");
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_order_does_not_matter() {
        let a = CacheKey::builder("nwac-weather")
            .param("host", "https://nwac.us")
            .param("zone_id", 5)
            .build();
        let b = CacheKey::builder("nwac-weather")
            .param("zone_id", 5)
            .param("host", "https://nwac.us")
            .build();

        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn namespace_and_values_distinguish_keys() {
        let base = CacheKey::builder("weather-forecast").param("forecast", 1).build();
        let other_ns = CacheKey::builder("nwac-weather").param("forecast", 1).build();
        let other_value = CacheKey::builder("weather-forecast").param("forecast", 2).build();
        let other_type = CacheKey::builder("weather-forecast").param("forecast", "1").build();

        assert_ne!(base, other_ns);
        assert_ne!(base, other_value);
        assert_ne!(base, other_type);
    }

    #[test]
    fn renders_deterministically() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let key = CacheKey::builder("nwac-weather")
            .param("zone_id", 5)
            .param("requested_time", date)
            .param("host", "https://nwac.us")
            .param("stations", vec![1, 2])
            .build();

        assert_eq!(
            key.to_string(),
            r#"["nwac-weather",{"host":"https://nwac.us","requested_time":"2024-01-05","stations":[1,2],"zone_id":5}]"#
        );
    }

    #[test]
    fn later_param_replaces_earlier() {
        let key = CacheKey::builder("observations")
            .param("center", "NWAC")
            .param("center", "SNFAC")
            .build();

        assert_eq!(key.param("center"), Some(&KeyPart::Str("SNFAC".into())));
        assert_eq!(key.namespace(), "observations");
    }

    #[test]
    fn rendering_escapes_strings() {
        let key = CacheKey::builder("stations")
            .param("source", "nw\"ac")
            .param("active", true)
            .build();

        assert_eq!(key.to_string(), r#"["stations",{"active":true,"source":"nw\"ac"}]"#);
        assert_eq!(KeyPart::from(vec!["a", "b"]).to_string(), r#"["a","b"]"#);
        assert_eq!(KeyPart::from(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()).to_string(), r#""2024-02-29""#);
    }
}
