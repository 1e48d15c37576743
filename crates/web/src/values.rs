//! Multi-valued request variables with lenient typed accessors.
//!
//! Accessors never fail: a missing or unparsable value reads as `None`, and list
//! accessors skip entries that do not parse.

use crate::request::PathParams;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    inner: HashMap<String, Vec<String>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string, an invalid input gives no values.
    pub fn parse_query(query: &str) -> Self {
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_else(|e| {
            trace!(cause = %e, "ignore malformed query string");
            Vec::new()
        });

        let mut values = Self::new();
        for (name, value) in pairs {
            values.insert(name, value);
        }
        values
    }

    /// Appends a value under `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(name.into()).or_default().push(value.into());
    }

    /// Replaces every value of each name present in `other`.
    pub fn merge(&mut self, other: Values) {
        self.inner.extend(other.inner);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.parse().ok())
    }

    pub fn parse_all<T: FromStr>(&self, name: &str) -> Vec<T> {
        self.get_all(name).iter().filter_map(|value| value.parse().ok()).collect()
    }

    pub fn as_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(parse_bool)
    }

    pub fn as_bools(&self, name: &str) -> Vec<bool> {
        self.get_all(name).iter().filter_map(|value| parse_bool(value)).collect()
    }

    pub fn as_int(&self, name: &str) -> Option<i64> {
        self.parse(name)
    }

    pub fn as_uint(&self, name: &str) -> Option<u64> {
        self.parse(name)
    }

    pub fn as_float(&self, name: &str) -> Option<f64> {
        self.parse(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Encodes every value as a query string, names sorted for a stable output.
    pub fn to_query_string(&self) -> Result<String, serde_urlencoded::ser::Error> {
        let mut pairs = self
            .inner
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        serde_urlencoded::to_string(pairs)
    }

    /// Encodes the first value of every name, the shape struct decoders expect.
    pub(crate) fn to_single_query_string(&self) -> Result<String, serde_urlencoded::ser::Error> {
        let mut pairs = self
            .inner
            .iter()
            .filter_map(|(name, values)| values.first().map(|value| (name.as_str(), value.as_str())))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        serde_urlencoded::to_string(pairs)
    }
}

impl From<&PathParams> for Values {
    fn from(params: &PathParams) -> Self {
        let mut values = Self::new();
        for (name, value) in params.iter() {
            values.insert(name, value);
        }
        values
    }
}

// the literal set accepted for booleans in query strings and path segments
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
