//! Error types for wirecall.
//!
//! [`RpcError`] covers every failure the crate surfaces. Remote failures are
//! carried as a structured [`Fault`]; connectivity problems as an opaque
//! [`TransportError`] handed through from the transport unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::WireValue;

/// Fault code for handler failures that are not already structured faults.
pub const GENERIC_FAULT_CODE: i32 = 0;

/// Fault code reported on the wire for methods that are not registered.
pub const METHOD_NOT_FOUND_CODE: i32 = -32601;

/// Fault code for malformed parameters to the built-in `system.*` methods.
pub const INVALID_PARAMS_CODE: i32 = -32602;

/// Structured remote failure.
///
/// On the server a fault is built from a code and message only. The client
/// tags it with the method and wire arguments of the failed call, and with
/// the batch index when it came out of a multicall.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    /// Integer fault code.
    pub code: i32,
    /// Human-readable fault description.
    pub message: String,
    /// Method that produced the fault (client side only).
    pub method: Option<String>,
    /// Wire arguments of the faulted call (client side only).
    pub args: Vec<WireValue>,
    /// Position inside a multicall batch.
    pub index: Option<usize>,
}

impl Fault {
    /// Create a fault with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            method: None,
            args: Vec::new(),
            index: None,
        }
    }

    /// Attach the method name and wire arguments of the call that failed.
    pub fn with_call(mut self, method: &str, args: Vec<WireValue>) -> Self {
        self.method = Some(method.to_string());
        self.args = args;
        self
    }

    /// Tag the fault with its position in a multicall batch.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Render as the wire fault struct `{faultCode, faultString}`.
    pub fn to_wire(&self) -> WireValue {
        let mut fields = BTreeMap::new();
        fields.insert("faultCode".to_string(), WireValue::Int(self.code));
        fields.insert(
            "faultString".to_string(),
            WireValue::Str(self.message.clone()),
        );
        WireValue::Struct(fields)
    }

    /// Recognise a wire fault struct.
    ///
    /// Returns `None` unless the value is a struct carrying an integer
    /// `faultCode` and a string `faultString`.
    pub fn from_wire(value: &WireValue) -> Option<Self> {
        let fields = value.as_struct()?;
        let code = match fields.get("faultCode")? {
            WireValue::Int(code) => *code,
            WireValue::I8(code) => i32::try_from(*code).ok()?,
            _ => return None,
        };
        let message = fields.get("faultString")?.as_str()?;
        Some(Self::new(code, message))
    }
}

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The endpoint could not be reached.
    Connect,
    /// Connect or reply timeout expired.
    Timeout,
    /// The connection or completion channel closed before a reply arrived.
    Closed,
    /// Any other failure reported by the transport.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Closed => "closed",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(name)
    }
}

/// Connectivity, timeout or framing failure, passed through opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Transport-provided detail.
    pub message: String,
}

impl TransportError {
    /// Create a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Endpoint unreachable.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Timeout expired.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Channel closed before a reply.
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

/// Main error type for all wirecall operations.
///
/// `Clone` so that an async call outcome can be observed by several
/// independent waiters; codec errors are shared behind an `Arc` for that.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// No valid host/wire mapping under the current coercion mode.
    #[error("coercion error: {0}")]
    Coercion(String),

    /// Invalid construction parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// Dispatch or introspection referenced a method that is not registered.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Structured remote failure.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Connectivity or timeout failure from the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reply did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON error (settings files).
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(Arc<rmp_serde::encode::Error>),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(Arc<rmp_serde::decode::Error>),
}

impl RpcError {
    /// Convert into the fault reported back to a remote caller.
    ///
    /// Structured faults are kept as they are, unknown methods map to
    /// [`METHOD_NOT_FOUND_CODE`], everything else becomes a
    /// [`GENERIC_FAULT_CODE`] fault carrying the error message.
    pub fn into_fault(self) -> Fault {
        match self {
            RpcError::Fault(fault) => fault,
            RpcError::UnknownMethod(method) => Fault::new(
                METHOD_NOT_FOUND_CODE,
                format!("unknown method: {}", method),
            ),
            other => Fault::new(GENERIC_FAULT_CODE, other.to_string()),
        }
    }

    /// Returns the fault if this error is a remote fault.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            RpcError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Json(Arc::new(e))
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RpcError::MsgPackEncode(Arc::new(e))
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RpcError::MsgPackDecode(Arc::new(e))
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_wire_shape() {
        let wire = Fault::new(4, "too many params").to_wire();
        let fields = wire.as_struct().unwrap();

        assert_eq!(fields.get("faultCode"), Some(&WireValue::Int(4)));
        assert_eq!(
            fields.get("faultString"),
            Some(&WireValue::Str("too many params".to_string()))
        );
        assert_eq!(Fault::from_wire(&wire), Some(Fault::new(4, "too many params")));
    }

    #[test]
    fn test_from_wire_rejects_other_structs() {
        let mut fields = BTreeMap::new();
        fields.insert("faultCode".to_string(), WireValue::Str("4".to_string()));
        fields.insert("faultString".to_string(), WireValue::Str("x".to_string()));

        assert!(Fault::from_wire(&WireValue::Struct(fields)).is_none());
        assert!(Fault::from_wire(&WireValue::Int(1)).is_none());
    }

    #[test]
    fn test_into_fault_codes() {
        let unknown = RpcError::UnknownMethod("nope".to_string()).into_fault();
        assert_eq!(unknown.code, METHOD_NOT_FOUND_CODE);

        let generic = RpcError::Coercion("bad".to_string()).into_fault();
        assert_eq!(generic.code, GENERIC_FAULT_CODE);
        assert_eq!(generic.message, "coercion error: bad");

        let kept = RpcError::Fault(Fault::new(7, "custom")).into_fault();
        assert_eq!(kept.code, 7);
    }

    #[test]
    fn test_fault_tagging() {
        let fault = Fault::new(1, "boom")
            .with_call("math.div", vec![WireValue::Int(1), WireValue::Int(0)])
            .at_index(2);

        assert_eq!(fault.method.as_deref(), Some("math.div"));
        assert_eq!(fault.args.len(), 2);
        assert_eq!(fault.index, Some(2));
    }

    #[test]
    fn test_transport_error_display() {
        let err: RpcError = TransportError::timeout("no reply within 5s").into();
        assert_eq!(err.to_string(), "timeout error: no reply within 5s");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = RpcError::Protocol("reply is not an array".to_string());
        assert_eq!(err.to_string(), "protocol error: reply is not an array");
    }
}
