//! # Query Values
//!
//! The closed set of literals that can appear on the right-hand side of a
//! condition or inside a row sent for insert/update.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A literal usable in a condition or a stored row.
///
/// Serialization is structural: each variant writes its underlying JSON
/// literal, arrays element-wise. Dates are written as RFC 3339 UTC strings
/// with millisecond precision; non-finite floats become `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Array(Vec<QueryValue>),
    Float(f64),
    Int(i64),
    String(String),
    /// Free text. Same wire form as `String`, kept apart so callers can tell
    /// long-form fields from short identifiers.
    Text(String),
    Boolean(bool),
    Date(DateTime<Utc>),
    Null,
}

fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for QueryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_unit(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::String(s) | Self::Text(s) => serializer.serialize_str(s),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Date(d) => serializer.serialize_str(&format_date(d)),
            Self::Null => serializer.serialize_unit(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for QueryValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for QueryValue {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<f64> for QueryValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
