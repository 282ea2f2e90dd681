use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scalar field value, as seen by queries and storage bindings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering between two values of compatible types.
    /// Integers and reals compare numerically; mismatched kinds are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// ASCII case-insensitive substring match on text values; always false
    /// otherwise.
    pub fn contains(&self, needle: &Self) -> bool {
        match (self, needle) {
            (Self::Text(hay), Self::Text(n)) => hay
                .to_ascii_lowercase()
                .contains(&n.to_ascii_lowercase()),
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_kinds_compare_across_int_and_real() {
        assert_eq!(FieldValue::Int(2).compare(&FieldValue::Real(2.5)), Some(Ordering::Less));
        assert_eq!(FieldValue::Real(3.0).compare(&FieldValue::Int(3)), Some(Ordering::Equal));
    }

    #[test]
    fn mismatched_kinds_are_unordered() {
        assert_eq!(FieldValue::Text("1".into()).compare(&FieldValue::Int(1)), None);
        assert_eq!(FieldValue::Null.compare(&FieldValue::Int(0)), None);
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert!(FieldValue::from(none).is_null());
        assert_eq!(FieldValue::from(Some("x")), FieldValue::Text("x".into()));
    }

    #[test]
    fn contains_only_matches_text() {
        let hay = FieldValue::from("Dune Messiah");
        assert!(hay.contains(&"Mess".into()));
        assert!(hay.contains(&"dune".into()));
        assert!(!FieldValue::Int(12).contains(&FieldValue::Int(1)));
    }
}
