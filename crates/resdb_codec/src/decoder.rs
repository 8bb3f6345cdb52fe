//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Largest element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Largest byte/text string length accepted.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Decode a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain NaN or
/// indefinite-length items, or carry trailing data after the value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder over a borrowed buffer.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major_type = initial >> 5;
        let info = initial & 0x1f;

        match major_type {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::decoding_failed("unsigned integer exceeds i64"))
            }
            1 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::decoding_failed("negative integer exceeds i64"))
            }
            2 => Ok(Value::Bytes(self.read_sized(info)?.to_vec())),
            3 => {
                let bytes = self.read_sized(info)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.read_count(info)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(Value::Array(items))
            }
            5 => self.decode_map(info),
            6 => {
                // Tags carry no meaning for resource graphs; decode the payload.
                let _tag = self.read_argument(info)?;
                self.decode()
            }
            _ => self.decode_simple(info),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, shorter_fits) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => {
                let v = u64::from(self.read_byte()?);
                (v, v < 24)
            }
            25 => {
                let v = u64::from(u16::from_be_bytes(self.read_array()?));
                (v, v <= u64::from(u8::MAX))
            }
            26 => {
                let v = u64::from(u32::from_be_bytes(self.read_array()?));
                (v, v <= u64::from(u16::MAX))
            }
            27 => {
                let v = u64::from_be_bytes(self.read_array()?);
                (v, v <= u64::from(u32::MAX))
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if shorter_fits {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_sized(&mut self, info: u8) -> CodecResult<&'a [u8]> {
        let len = self.read_argument(info)?;
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_BYTES_LENGTH,
            });
        }
        self.read_bytes(len as usize)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_count(&mut self, info: u8) -> CodecResult<usize> {
        let len = self.read_argument(info)?;
        if len > MAX_CONTAINER_ELEMENTS {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_CONTAINER_ELEMENTS,
            });
        }
        Ok(len as usize)
    }

    fn decode_map(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_count(info)?;
        let mut pairs = Vec::with_capacity(len);
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let data = self.data;
            let key_bytes = &data[key_start..self.pos];

            // keys must be strictly increasing in encoded order
            if let Some(prev) = prev_key {
                let ordering = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if ordering != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        let float = match info {
            20 => return Ok(Value::Bool(false)),
            21 => return Ok(Value::Bool(true)),
            22 | 23 => return Ok(Value::Null),
            25 => f64::from(half_to_f32(u16::from_be_bytes(self.read_array()?))),
            26 => f64::from(f32::from_be_bytes(self.read_array()?)),
            27 => f64::from_be_bytes(self.read_array()?),
            31 => return Err(CodecError::invalid_structure("break without indefinite")),
            other => return Err(CodecError::unsupported_type(format!("simple value {other}"))),
        };
        if float.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        Ok(Value::Float(float))
    }
}

/// Widen an IEEE 754 half-precision float.
fn half_to_f32(half: u16) -> f32 {
    let sign = u32::from(half >> 15) << 31;
    let exponent = u32::from((half >> 10) & 0x1f);
    let mantissa = u32::from(half & 0x3ff);

    let bits = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            // subnormal: value is m * 2^-24
            let magnitude = m as f32 * f32::from_bits(0x3380_0000);
            return if sign == 0 { magnitude } else { -magnitude };
        }
        (0x1f, m) => sign | 0x7f80_0000 | (m << 13),
        (e, m) => sign | ((e + 112) << 23) | (m << 13),
    };
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_integers() {
        assert_eq!(from_cbor(&[0x17]).unwrap(), Value::Integer(23));
        assert_eq!(from_cbor(&[0x19, 0x01, 0x00]).unwrap(), Value::Integer(256));
        assert_eq!(from_cbor(&[0x38, 99]).unwrap(), Value::Integer(-100));
    }

    #[test]
    fn decode_float_widths() {
        assert_eq!(
            from_cbor(&[0xfb, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            from_cbor(&[0xfa, 0x3f, 0xc0, 0x00, 0x00]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(from_cbor(&[0xf9, 0x3c, 0x00]).unwrap(), Value::Float(1.0));
        assert_eq!(from_cbor(&[0xf9, 0xc0, 0x00]).unwrap(), Value::Float(-2.0));
    }

    #[test]
    fn reject_nan_on_decode() {
        assert_eq!(
            from_cbor(&[0xfb, 0x7f, 0xf8, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn reject_indefinite_length() {
        assert_eq!(
            from_cbor(&[0x9f, 0x01, 0xff]),
            Err(CodecError::IndefiniteLengthForbidden)
        );
        assert_eq!(
            from_cbor(&[0xbf, 0x61, b'a', 0x01, 0xff]),
            Err(CodecError::IndefiniteLengthForbidden)
        );
    }

    #[test]
    fn reject_non_shortest_encoding() {
        assert!(matches!(
            from_cbor(&[0x18, 23]),
            Err(CodecError::InvalidStructure { .. })
        ));
        assert!(matches!(
            from_cbor(&[0x19, 0x00, 0xff]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_unsorted_map_keys() {
        assert!(matches!(
            from_cbor(&[0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_trailing_bytes() {
        assert_eq!(
            from_cbor(&[0x01, 0x02]),
            Err(CodecError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn unexpected_eof() {
        assert_eq!(from_cbor(&[]), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[0x19, 0x01]), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[0x62, b'a']), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(from_cbor(&[0x62, 0xff, 0xfe]), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn decoder_reads_sequence() {
        let mut decoder = Decoder::new(&[0x01, 0x61, b'z']);
        assert_eq!(decoder.decode().unwrap(), Value::Integer(1));
        assert_eq!(decoder.decode().unwrap(), Value::from("z"));
        assert!(decoder.is_empty());
    }

    mod properties {
        use super::*;
        use crate::to_cbor;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::Integer),
                any::<f64>()
                    .prop_filter("no NaN", |f| !f.is_nan())
                    .prop_map(Value::Float),
                "[a-z]{0,12}".prop_map(Value::Text),
                prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            ]
        }

        proptest! {
            #[test]
            fn node_maps_survive_encoding(
                fields in prop::collection::btree_map("[a-z_]{1,8}", leaf(), 0..8)
            ) {
                let node = Value::map(
                    fields.into_iter().map(|(k, v)| (Value::Text(k), v)).collect(),
                );
                let bytes = to_cbor(&node).unwrap();
                prop_assert_eq!(from_cbor(&bytes).unwrap(), node);
            }
        }
    }
}
