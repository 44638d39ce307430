use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::firestore::model::Timestamp;
use crate::firestore::value::{ArrayValue, MapValue};

/// A single field value stored in a document.
#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Array(ArrayValue),
    Map(MapValue),
}

impl FirestoreValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Array(ArrayValue::new(values)),
        }
    }

    pub fn from_map(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Map(MapValue::new(map)),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match &self.kind {
            ValueKind::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            ValueKind::Map(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    /// Orders values of comparable kinds; mixed kinds (other than integer/double) do not compare.
    pub fn compare(&self, other: &FirestoreValue) -> Option<Ordering> {
        match (&self.kind, &other.kind) {
            (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
            (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
            (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
            (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
            (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
            (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<Timestamp> for FirestoreValue {
    fn from(value: Timestamp) -> Self {
        Self::from_timestamp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_basic_values() {
        let v = FirestoreValue::from_string("hello");
        match v.kind() {
            ValueKind::String(value) => assert_eq!(value, "hello"),
            _ => panic!("unexpected kind"),
        }
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_timestamp(), None);
    }

    #[test]
    fn compares_strings_lexicographically() {
        let a = FirestoreValue::from("acct1");
        let b = FirestoreValue::from("acct2");
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(a.compare(&FirestoreValue::from_integer(1)), None);
        assert_eq!(
            FirestoreValue::from_integer(2).compare(&FirestoreValue::from_double(1.5)),
            Some(Ordering::Greater)
        );
    }
}
