//! # ResDB Codec
//!
//! Canonical CBOR encoding/decoding for serialized resource graphs.
//!
//! The resource database writes each serialized node as a map of
//! field names to values. This crate provides the dynamic [`Value`] model for
//! those maps and a deterministic binary form:
//!
//! - Maps are sorted by key (length-first, then bytewise on the encoded key)
//! - Integers use the shortest encoding
//! - Floats are always written as 64-bit doubles
//! - NaN is rejected so identical graphs produce identical bytes
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use resdb_codec::{from_cbor, to_cbor, Value};
//!
//! let node = Value::map(vec![
//!     (Value::from("_type"), Value::from("Point")),
//!     (Value::from("x"), Value::Float(1.5)),
//! ]);
//! let bytes = to_cbor(&node).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), node);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, Decoder};
pub use encoder::{to_cbor, Encoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be written as canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be read back from CBOR.
pub trait Decode: Sized {
    /// Decode a value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(type_name: &str, fields: Vec<(&str, Value)>) -> Value {
        let mut pairs = vec![(Value::from("_type"), Value::from(type_name))];
        pairs.extend(fields.into_iter().map(|(k, v)| (Value::from(k), v)));
        Value::map(pairs)
    }

    #[test]
    fn node_roundtrip_through_traits() {
        let value = node(
            "Transform",
            vec![
                (
                    "position",
                    Value::map(vec![
                        (Value::from("x"), Value::Float(1.0)),
                        (Value::from("y"), Value::Float(-2.5)),
                        (Value::from("z"), Value::Float(0.0)),
                    ]),
                ),
                ("visible", Value::Bool(true)),
                ("layer", Value::Integer(-3)),
            ],
        );
        let bytes = value.encode().unwrap();
        assert_eq!(Value::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn graph_roundtrip() {
        let graph = Value::Array(vec![
            node("Scene", vec![("children", Value::from(vec!["a", "b"]))]),
            node("Entity", vec![("payload", Value::Bytes(vec![0, 255, 7]))]),
            node("Entity", vec![("name", Value::from("b")), ("note", Value::Null)]),
        ]);
        let bytes = to_cbor(&graph).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), graph);
    }

    #[test]
    fn identical_graphs_encode_identically() {
        let a = Value::Map(vec![
            (Value::from("y"), Value::Float(2.0)),
            (Value::from("x"), Value::Float(1.0)),
        ]);
        let b = Value::Map(vec![
            (Value::from("x"), Value::Float(1.0)),
            (Value::from("y"), Value::Float(2.0)),
        ]);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }
}
