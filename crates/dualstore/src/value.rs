//! Typed scalar values shared by both backends.
//!
//! Values arrive already normalized from the field layer; this module only
//! compares, renders, and moves them. The comparison rules here are the single
//! source of truth for the in-memory interpreter and must agree with the
//! defensive SQL the renderer emits on lax-coercion platforms.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A typed scalar as stored in rows and bound as a query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Numeric view of the value, present only when it *looks numeric*:
    /// an Int, a Float, or a string that parses fully as a number.
    ///
    /// Both comparison paths (interpreter and the renderer's CASE fallback)
    /// key off this exact predicate.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() { None } else { t.parse::<f64>().ok() }
            }
            _ => None,
        }
    }

    /// True if [`Value::as_f64`] would succeed.
    pub fn looks_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    fn family_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Date(_) => 3,
            Value::DateTime(_) => 4,
            Value::Str(_) => 5,
            Value::Bytes(_) => 6,
        }
    }

    /// Total ordering used by relational operators and the stable sort.
    ///
    /// NULL sorts first. Two numeric-looking values compare numerically,
    /// otherwise same-type values compare natively and mixed types fall back
    /// to a fixed family rank so the sort stays deterministic.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => {
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                }
                match (self, other) {
                    (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
                    (Value::Date(a), Value::Date(b)) => a.cmp(b),
                    (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
                    (Value::Date(a), Value::DateTime(b)) => {
                        a.and_hms_opt(0, 0, 0).map(|dt| dt.cmp(b)).unwrap_or(Ordering::Equal)
                    }
                    (Value::DateTime(a), Value::Date(b)) => {
                        b.and_hms_opt(0, 0, 0).map(|dt| a.cmp(&dt)).unwrap_or(Ordering::Equal)
                    }
                    _ => self
                        .family_rank()
                        .cmp(&other.family_rank())
                        .then_with(|| self.to_string().cmp(&other.to_string())),
                }
            }
        }
    }

    /// Equality under the same coercion rules as [`Value::compare`].
    ///
    /// NULL never equals anything, NULL included; comparisons against NULL
    /// answer false just as SQL's three-valued logic collapses to.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_compare_numerically() {
        let a = Value::Str("10".into());
        let b = Value::Int(9);
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert!(Value::Str("3.5".into()).loosely_equals(&Value::Float(3.5)));
    }

    #[test]
    fn non_numeric_strings_compare_lexically() {
        let a = Value::Str("apple".into());
        let b = Value::Str("banana".into());
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn null_sorts_first_and_equals_nothing() {
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert!(!Value::Null.loosely_equals(&Value::Null));
        assert!(!Value::Null.loosely_equals(&Value::Int(0)));
    }

    #[test]
    fn whitespace_only_string_is_not_numeric() {
        assert!(!Value::Str("  ".into()).looks_numeric());
        assert!(Value::Str(" 42 ".into()).looks_numeric());
        assert!(!Value::Str("42abc".into()).looks_numeric());
    }

    #[test]
    fn date_compares_with_datetime() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let dt = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        assert_eq!(d.compare(&dt), Ordering::Less);
    }
}
