//! Wire value model.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Opaque;

/// A value as the RPC protocol carries it.
///
/// `I8` (64-bit integer) is an extension type: the coercion engine only
/// emits it when extensions are enabled. `Extension` is never serializable;
/// it exists so opaque host values can reach a transport that knows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// Absent value.
    Nil,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer (extension).
    I8(i64),
    /// Double-precision float.
    Double(f64),
    /// String.
    Str(String),
    /// Byte sequence. Base64 text encoding is the transport's job.
    Base64(Bytes),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// String-keyed mapping. Key order carries no meaning.
    Struct(BTreeMap<String, WireValue>),
    /// Ordered sequence.
    Array(Vec<WireValue>),
    /// Opaque passthrough.
    #[serde(skip)]
    Extension(Opaque),
}

impl WireValue {
    /// Protocol name of this value's type, as used in method signatures.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Nil => "nil",
            WireValue::Bool(_) => "boolean",
            WireValue::Int(_) => "int",
            WireValue::I8(_) => "i8",
            WireValue::Double(_) => "double",
            WireValue::Str(_) => "string",
            WireValue::Base64(_) => "base64",
            WireValue::DateTime(_) => "dateTime.iso8601",
            WireValue::Struct(_) => "struct",
            WireValue::Array(_) => "array",
            WireValue::Extension(_) => "extension",
        }
    }

    /// Build a struct from `(key, value)` pairs.
    pub fn structure<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, WireValue)>,
    {
        WireValue::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Borrow the fields if this is a struct.
    pub fn as_struct(&self) -> Option<&BTreeMap<String, WireValue>> {
        match self {
            WireValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Borrow the items if this is an array.
    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the text if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of `Int` or `I8`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Int(n) => Some(i64::from(*n)),
            WireValue::I8(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

impl From<i32> for WireValue {
    fn from(n: i32) -> Self {
        WireValue::Int(n)
    }
}

impl From<f64> for WireValue {
    fn from(f: f64) -> Self {
        WireValue::Double(f)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::Str(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::Str(s)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(items: Vec<WireValue>) -> Self {
        WireValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(WireValue::Int(1).type_name(), "int");
        assert_eq!(WireValue::I8(1).type_name(), "i8");
        assert_eq!(WireValue::Base64(Bytes::new()).type_name(), "base64");
        assert_eq!(WireValue::Array(vec![]).type_name(), "array");
    }

    #[test]
    fn test_structure_builder() {
        let value = WireValue::structure([
            ("methodName", WireValue::from("echo")),
            ("params", WireValue::Array(vec![])),
        ]);
        let fields = value.as_struct().unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["methodName"].as_str(), Some("echo"));
        assert!(fields["params"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_as_i64_covers_both_widths() {
        assert_eq!(WireValue::Int(-5).as_i64(), Some(-5));
        assert_eq!(WireValue::I8(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(WireValue::Str("5".into()).as_i64(), None);
    }
}
