//! MsgPack codec using `rmp-serde`.
//!
//! Always `to_vec_named`, never `to_vec`: structs go out as maps keyed by
//! field name, so a frame stays decodable when fields are added or
//! reordered.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Frame {
//!     method: String,
//!     id: u32,
//! }
//!
//! let frame = Frame { method: "math.add".to_string(), id: 42 };
//! let encoded = MsgPackCodec::encode(&frame).unwrap();
//! let decoded: Frame = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, frame);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
///
/// Uses `rmp_serde::to_vec_named` so structs are serialized as maps (with
/// field names) rather than arrays (positional).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::MsgPackEncode`](crate::RpcError::MsgPackEncode)
    /// if the value cannot be serialized; opaque
    /// [`WireValue::Extension`](crate::WireValue::Extension) values never can.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::RpcError;
    use crate::value::{HostValue, WireValue};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Frame {
        method: String,
        params: Vec<WireValue>,
    }

    #[test]
    fn test_frame_encodes_as_map() {
        let frame = Frame {
            method: "x".to_string(),
            params: vec![],
        };

        let encoded = MsgPackCodec::encode(&frame).unwrap();

        // fixmap with 2 entries, not fixarray
        assert_eq!(encoded[0], 0x82, "Expected fixmap, got {:02X}", encoded[0]);
        let decoded: Frame = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_every_wire_type_survives() {
        let value = WireValue::structure([
            ("nil", WireValue::Nil),
            ("flag", WireValue::Bool(true)),
            ("small", WireValue::Int(-7)),
            ("large", WireValue::I8(1 << 40)),
            ("ratio", WireValue::Double(0.25)),
            ("text", WireValue::from("héllo")),
            ("blob", WireValue::Base64(Bytes::from_static(&[0, 159, 255]))),
            (
                "when",
                WireValue::DateTime(Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap()),
            ),
            (
                "items",
                WireValue::Array(vec![WireValue::Int(1), WireValue::Array(vec![])]),
            ),
        ]);

        let encoded = MsgPackCodec::encode(&value).unwrap();
        let decoded: WireValue = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn test_extension_cannot_be_encoded() {
        let value = WireValue::Array(vec![WireValue::Extension(crate::value::Opaque::new(5u8))]);

        let err = MsgPackCodec::encode(&value).unwrap_err();
        assert!(matches!(err, RpcError::MsgPackEncode(_)));
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let invalid = b"not valid msgpack";
        let result: Result<Frame> = MsgPackCodec::decode(invalid);
        assert!(matches!(result, Err(RpcError::MsgPackDecode(_))));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = Frame {
            method: "math.add".to_string(),
            params: vec![WireValue::Int(1), WireValue::Int(2)],
        };
        let encoded = MsgPackCodec::encode(&frame).unwrap();

        let result: Result<Frame> = MsgPackCodec::decode(&encoded[..encoded.len() - 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_coerced_value_frames() {
        let coerced =
            crate::value::to_wire(&HostValue::from("k"), &Default::default()).unwrap();
        let encoded = MsgPackCodec::encode(&coerced).unwrap();
        let decoded: WireValue = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, WireValue::from("k"));
    }
}
