//! Host ↔ wire coercion.
//!
//! # Integer widths
//!
//! Host integers are 64 bits wide. On the way out they are narrowed to the
//! wire `Int` when they fit `[-2^31, 2^31 - 1]` and otherwise need the `I8`
//! extension type, which is only emitted when extensions are enabled. On the
//! way back both widths become `HostValue::Int`.
//!
//! # Lossy conversions
//!
//! `Decimal` and `Ratio` become `Double`. They come back as `Float`.
//!
//! # Map keys
//!
//! Wire struct keys are strings. Host keys are stringified on the way out and
//! parsed back as keywords, so `{"a": 1}` returns as `{:a 1}`. If two host
//! keys stringify to the same text, the one that sorts last wins.

use crate::error::{Result, RpcError};

use super::{HostKey, HostValue, Keyword, WireValue};

/// Coercion mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoercionOptions {
    /// Allow extension wire types (`I8`).
    pub extensions: bool,
    /// Reject opaque values instead of passing them through.
    pub strict: bool,
}

impl CoercionOptions {
    /// Default mode: no extensions, opaque passthrough allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable extension wire types.
    pub fn with_extensions(mut self, extensions: bool) -> Self {
        self.extensions = extensions;
        self
    }

    /// Enable or disable strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Convert a host value to its wire form.
///
/// # Errors
///
/// Returns [`RpcError::Coercion`] for integers that need `I8` while
/// extensions are off, integers beyond 64 bits, ratios with a zero
/// denominator, and opaque values in strict mode.
pub fn to_wire(value: &HostValue, opts: &CoercionOptions) -> Result<WireValue> {
    let wire = match value {
        HostValue::Nil => WireValue::Nil,
        HostValue::Bool(b) => WireValue::Bool(*b),
        HostValue::Int(n) => int_to_wire(*n, opts)?,
        HostValue::BigInt(n) => {
            let n = i64::try_from(*n).map_err(|_| {
                RpcError::Coercion(format!("integer {} does not fit in 64 bits", n))
            })?;
            int_to_wire(n, opts)?
        }
        HostValue::Float(f) => WireValue::Double(*f),
        HostValue::Decimal(d) => WireValue::Double(d.to_f64()),
        HostValue::Ratio(numerator, denominator) => {
            if *denominator == 0 {
                return Err(RpcError::Coercion(format!(
                    "ratio {}/0 has no numeric value",
                    numerator
                )));
            }
            WireValue::Double(*numerator as f64 / *denominator as f64)
        }
        HostValue::Str(s) => WireValue::Str(s.clone()),
        HostValue::Keyword(k) => WireValue::Str(k.to_string()),
        HostValue::Bytes(b) => WireValue::Base64(b.clone()),
        HostValue::Timestamp(t) => WireValue::DateTime(*t),
        HostValue::Map(entries) => WireValue::Struct(
            entries
                .iter()
                .map(|(k, v)| Ok((k.to_string(), to_wire(v, opts)?)))
                .collect::<Result<_>>()?,
        ),
        HostValue::Seq(items) => WireValue::Array(to_wire_all(items, opts)?),
        HostValue::Raw(wire) => wire.clone(),
        HostValue::Extension(opaque) => {
            if opts.strict {
                return Err(RpcError::Coercion(
                    "no wire mapping for opaque value in strict mode".to_string(),
                ));
            }
            WireValue::Extension(opaque.clone())
        }
    };
    Ok(wire)
}

/// Convert a slice of host values, e.g. call arguments.
pub fn to_wire_all(values: &[HostValue], opts: &CoercionOptions) -> Result<Vec<WireValue>> {
    values.iter().map(|v| to_wire(v, opts)).collect()
}

/// Convert a wire value to its host form.
///
/// # Errors
///
/// Returns [`RpcError::Coercion`] for opaque values in strict mode.
pub fn to_host(value: WireValue, opts: &CoercionOptions) -> Result<HostValue> {
    let host = match value {
        WireValue::Nil => HostValue::Nil,
        WireValue::Bool(b) => HostValue::Bool(b),
        WireValue::Int(n) => HostValue::Int(i64::from(n)),
        WireValue::I8(n) => HostValue::Int(n),
        WireValue::Double(f) => HostValue::Float(f),
        WireValue::Str(s) => HostValue::Str(s),
        WireValue::Base64(b) => HostValue::Bytes(b),
        WireValue::DateTime(t) => HostValue::Timestamp(t),
        WireValue::Struct(fields) => HostValue::Map(
            fields
                .into_iter()
                .map(|(k, v)| Ok((HostKey::Keyword(Keyword::parse(&k)), to_host(v, opts)?)))
                .collect::<Result<_>>()?,
        ),
        WireValue::Array(items) => HostValue::Seq(to_host_all(items, opts)?),
        WireValue::Extension(opaque) => {
            if opts.strict {
                return Err(RpcError::Coercion(
                    "opaque wire value rejected in strict mode".to_string(),
                ));
            }
            HostValue::Extension(opaque)
        }
    };
    Ok(host)
}

/// Convert a list of wire values, e.g. handler arguments.
pub fn to_host_all(values: Vec<WireValue>, opts: &CoercionOptions) -> Result<Vec<HostValue>> {
    values.into_iter().map(|v| to_host(v, opts)).collect()
}

fn int_to_wire(n: i64, opts: &CoercionOptions) -> Result<WireValue> {
    if let Ok(small) = i32::try_from(n) {
        return Ok(WireValue::Int(small));
    }
    if opts.extensions {
        Ok(WireValue::I8(n))
    } else {
        Err(RpcError::Coercion(format!(
            "integer {} is outside the int32 range and extensions are disabled",
            n
        )))
    }
}
