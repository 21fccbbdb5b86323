//! Host value model.
//!
//! [`HostValue`] is the dynamic value model handlers receive and callers
//! pass. Conversions from ordinary Rust types are provided through `From`,
//! and back through `TryFrom`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};

use super::{Opaque, WireValue};
use crate::error::{Result, RpcError};

/// Symbolic identifier with an optional namespace.
///
/// Rendered on the wire as `"ns/name"` (or just `"name"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword {
    namespace: Option<String>,
    name: String,
}

impl Keyword {
    /// Keyword without a namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Keyword inside a namespace.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Parse `"ns/name"` or `"name"`.
    ///
    /// Splits at the first `/` when both sides are non-empty; anything else
    /// (including `"/"` itself) becomes a plain name.
    pub fn parse(s: &str) -> Self {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Self::namespaced(ns, name),
            _ => Self::new(s),
        }
    }

    /// Namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name part.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Map key in the host model.
///
/// Wire struct keys are always strings, so every key is stringified on the
/// way out and comes back as a [`Keyword`]. `Seq` keys stringify as
/// `"[a b]"` and do not round-trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostKey {
    Keyword(Keyword),
    Str(String),
    Int(i64),
    Bool(bool),
    Seq(Vec<HostKey>),
}

impl HostKey {
    /// Keyword key parsed from `"ns/name"` or `"name"`.
    pub fn keyword(s: &str) -> Self {
        HostKey::Keyword(Keyword::parse(s))
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Keyword(k) => fmt::Display::fmt(k, f),
            HostKey::Str(s) => f.write_str(s),
            HostKey::Int(n) => write!(f, "{}", n),
            HostKey::Bool(b) => write!(f, "{}", b),
            HostKey::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    fmt::Display::fmt(item, f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for HostKey {
    fn from(s: &str) -> Self {
        HostKey::Str(s.to_string())
    }
}

impl From<String> for HostKey {
    fn from(s: String) -> Self {
        HostKey::Str(s)
    }
}

impl From<Keyword> for HostKey {
    fn from(k: Keyword) -> Self {
        HostKey::Keyword(k)
    }
}

impl From<i64> for HostKey {
    fn from(n: i64) -> Self {
        HostKey::Int(n)
    }
}

impl From<i32> for HostKey {
    fn from(n: i32) -> Self {
        HostKey::Int(i64::from(n))
    }
}

impl From<bool> for HostKey {
    fn from(b: bool) -> Self {
        HostKey::Bool(b)
    }
}

/// Fixed-point decimal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: u32,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    /// Nearest `f64`. Lossy for values needing more than 53 bits of mantissa.
    pub fn to_f64(self) -> f64 {
        self.unscaled as f64 / 10f64.powi(i32::try_from(self.scale).unwrap_or(i32::MAX))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let sign = if self.unscaled < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

/// A value in the host model.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Absent value.
    Nil,
    Bool(bool),
    /// Integer, widened to 64 bits.
    Int(i64),
    /// Integer that does not fit 64 bits. Only representable on the wire
    /// when it is actually within the `i64` range.
    BigInt(i128),
    Float(f64),
    /// Arbitrary-precision decimal; becomes a (lossy) double on the wire.
    Decimal(Decimal),
    /// Rational `numerator / denominator`; becomes a (lossy) double on the wire.
    Ratio(i64, i64),
    Str(String),
    Keyword(Keyword),
    Bytes(Bytes),
    /// Timestamp, always held in UTC.
    Timestamp(DateTime<Utc>),
    Map(BTreeMap<HostKey, HostValue>),
    Seq(Vec<HostValue>),
    /// Uncoerced wire value carried through host code unchanged.
    Raw(WireValue),
    /// Opaque passthrough.
    Extension(Opaque),
}

impl HostValue {
    /// Build a map from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<HostKey>,
        V: Into<HostValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        HostValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap an opaque value.
    pub fn extension<T: std::any::Any + Send + Sync>(value: T) -> Self {
        HostValue::Extension(Opaque::new(value))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, including `BigInt`s that fit 64 bits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(n) => Some(*n),
            HostValue::BigInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Numeric value as a double; integers convert, decimals and ratios lose precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(n) => Some(*n as f64),
            HostValue::BigInt(n) => Some(*n as f64),
            HostValue::Decimal(d) => Some(d.to_f64()),
            HostValue::Ratio(n, d) if *d != 0 => Some(*n as f64 / *d as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<HostKey, HostValue>> {
        match self {
            HostValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by keyword or string key.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        let entries = self.as_map()?;
        entries
            .get(&HostKey::keyword(key))
            .or_else(|| entries.get(&HostKey::Str(key.to_string())))
    }

    fn kind(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::BigInt(_) => "bigint",
            HostValue::Float(_) => "float",
            HostValue::Decimal(_) => "decimal",
            HostValue::Ratio(..) => "ratio",
            HostValue::Str(_) => "string",
            HostValue::Keyword(_) => "keyword",
            HostValue::Bytes(_) => "bytes",
            HostValue::Timestamp(_) => "timestamp",
            HostValue::Map(_) => "map",
            HostValue::Seq(_) => "seq",
            HostValue::Raw(_) => "raw wire value",
            HostValue::Extension(_) => "extension",
        }
    }

    fn mismatch(&self, expected: &str) -> RpcError {
        RpcError::Coercion(format!("expected {}, got {}", expected, self.kind()))
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

macro_rules! from_small_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for HostValue {
                fn from(n: $t) -> Self {
                    HostValue::Int(i64::from(n))
                }
            }
        )*
    };
}

from_small_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! from_wide_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for HostValue {
                fn from(n: $t) -> Self {
                    match i64::try_from(n) {
                        Ok(n) => HostValue::Int(n),
                        Err(_) => HostValue::BigInt(n as i128),
                    }
                }
            }
        )*
    };
}

from_wide_int!(u64, usize, i128);

impl From<f32> for HostValue {
    fn from(f: f32) -> Self {
        HostValue::Float(f64::from(f))
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<Decimal> for HostValue {
    fn from(d: Decimal) -> Self {
        HostValue::Decimal(d)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<Keyword> for HostValue {
    fn from(k: Keyword) -> Self {
        HostValue::Keyword(k)
    }
}

impl From<Bytes> for HostValue {
    fn from(b: Bytes) -> Self {
        HostValue::Bytes(b)
    }
}

impl From<&[u8]> for HostValue {
    fn from(b: &[u8]) -> Self {
        HostValue::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<DateTime<Utc>> for HostValue {
    fn from(t: DateTime<Utc>) -> Self {
        HostValue::Timestamp(t)
    }
}

impl From<DateTime<FixedOffset>> for HostValue {
    fn from(t: DateTime<FixedOffset>) -> Self {
        HostValue::Timestamp(t.with_timezone(&Utc))
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Nil, Into::into)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

/// Iteration order of a `HashSet` is unspecified, so is the resulting order.
impl<T: Into<HostValue>> From<HashSet<T>> for HostValue {
    fn from(items: HashSet<T>) -> Self {
        HostValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<BTreeSet<T>> for HostValue {
    fn from(items: BTreeSet<T>) -> Self {
        HostValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<K, V> From<HashMap<K, V>> for HostValue
where
    K: Into<HostKey> + Eq + Hash,
    V: Into<HostValue>,
{
    fn from(entries: HashMap<K, V>) -> Self {
        HostValue::map(entries)
    }
}

impl<K, V> From<BTreeMap<K, V>> for HostValue
where
    K: Into<HostKey>,
    V: Into<HostValue>,
{
    fn from(entries: BTreeMap<K, V>) -> Self {
        HostValue::map(entries)
    }
}

impl TryFrom<HostValue> for i64 {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        value.as_i64().ok_or_else(|| value.mismatch("64-bit integer"))
    }
}

impl TryFrom<HostValue> for i32 {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| value.mismatch("32-bit integer"))
    }
}

impl TryFrom<HostValue> for f64 {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        value.as_f64().ok_or_else(|| value.mismatch("number"))
    }
}

impl TryFrom<HostValue> for bool {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        value.as_bool().ok_or_else(|| value.mismatch("bool"))
    }
}

impl TryFrom<HostValue> for String {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        match value {
            HostValue::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }
}

impl TryFrom<HostValue> for Bytes {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        match value {
            HostValue::Bytes(b) => Ok(b),
            other => Err(other.mismatch("bytes")),
        }
    }
}

impl TryFrom<HostValue> for Vec<HostValue> {
    type Error = RpcError;

    fn try_from(value: HostValue) -> Result<Self> {
        match value {
            HostValue::Seq(items) => Ok(items),
            other => Err(other.mismatch("sequence")),
        }
    }
}

/// Build a `Vec<HostValue>` of call parameters.
///
/// ```
/// use wirecall::{params, HostValue};
///
/// let args = params![1, "two", 3.0];
/// assert_eq!(args[1], HostValue::Str("two".to_string()));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::HostValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::HostValue::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_parse() {
        let k = Keyword::parse("user/id");
        assert_eq!(k.namespace(), Some("user"));
        assert_eq!(k.name(), "id");
        assert_eq!(k.to_string(), "user/id");

        let plain = Keyword::parse("id");
        assert_eq!(plain.namespace(), None);
        assert_eq!(plain.to_string(), "id");

        // Degenerate slashes stay plain names
        assert_eq!(Keyword::parse("/"), Keyword::new("/"));
        assert_eq!(Keyword::parse("a/"), Keyword::new("a/"));
    }

    #[test]
    fn test_composite_key_display() {
        let key = HostKey::Seq(vec![HostKey::Int(1), HostKey::keyword("a/b"), HostKey::Bool(true)]);
        assert_eq!(key.to_string(), "[1 a/b true]");
    }

    #[test]
    fn test_decimal_display_and_float() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");
        assert!((Decimal::new(12345, 2).to_f64() - 123.45).abs() < 1e-9);
        // Scales past i32 saturate instead of wrapping to a negative exponent
        assert_eq!(Decimal::new(1, u32::MAX).to_f64(), 0.0);
    }

    #[test]
    fn test_wide_integers_widen_or_overflow() {
        assert_eq!(HostValue::from(5u64), HostValue::Int(5));
        assert_eq!(HostValue::from(u64::MAX), HostValue::BigInt(u64::MAX as i128));
    }

    #[test]
    fn test_option_and_vec_conversions() {
        assert_eq!(HostValue::from(None::<i32>), HostValue::Nil);
        assert_eq!(HostValue::from(Some("x")), HostValue::Str("x".to_string()));
        assert_eq!(
            HostValue::from(vec![1, 2]),
            HostValue::Seq(vec![HostValue::Int(1), HostValue::Int(2)])
        );
    }

    #[test]
    fn test_fixed_offset_converts_to_utc() {
        let local = DateTime::parse_from_rfc3339("2024-03-01T12:00:00+02:00").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(HostValue::from(local), HostValue::Timestamp(expected));
    }

    #[test]
    fn test_get_accepts_keyword_or_string_keys() {
        let with_keyword = HostValue::map([(HostKey::keyword("a"), 1)]);
        let with_string = HostValue::map([("a", 1)]);

        assert_eq!(with_keyword.get("a"), Some(&HostValue::Int(1)));
        assert_eq!(with_string.get("a"), Some(&HostValue::Int(1)));
        assert_eq!(with_string.get("b"), None);
    }

    #[test]
    fn test_try_from_mismatch_is_coercion_error() {
        let err = i64::try_from(HostValue::Str("1".into())).unwrap_err();
        assert!(matches!(err, RpcError::Coercion(_)));

        assert_eq!(i32::try_from(HostValue::Int(7)).unwrap(), 7);
        assert!(i32::try_from(HostValue::Int(1 << 40)).is_err());
    }

    #[test]
    fn test_params_macro() {
        let args = params![1, "two", true];
        assert_eq!(
            args,
            vec![
                HostValue::Int(1),
                HostValue::Str("two".to_string()),
                HostValue::Bool(true)
            ]
        );
        assert!(params![].is_empty());
    }
}
