//! Codec module - serialization for frames crossing the in-process transport.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is picked at compile time.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::MsgPackCodec;
//! use wirecall::WireValue;
//!
//! let value = WireValue::Array(vec![WireValue::Int(1), WireValue::from("two")]);
//! let encoded = MsgPackCodec::encode(&value).unwrap();
//! let decoded: WireValue = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, value);
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
