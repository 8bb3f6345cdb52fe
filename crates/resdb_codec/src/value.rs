//! Dynamic CBOR value type.

use std::cmp::Ordering;

/// A dynamic CBOR value.
///
/// Serialized resource nodes are maps from field names to values of this
/// type. Floats are allowed (vectors, colors and float fields need them) but
/// are always encoded as 64-bit doubles so the byte form stays canonical.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double-precision float. Never NaN once encoded.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs (keys are sorted for canonical encoding).
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with sorted keys.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Value::Map(pairs)
    }

    /// Compare two values in canonical CBOR key order.
    ///
    /// Canonical order is the order of the encoded bytes: shorter encodings
    /// first, then bytewise. Within a major type this reduces to comparing
    /// lengths and then contents.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let self_type = self.major_type();
        let other_type = other.major_type();
        if self_type != other_type {
            return self_type.cmp(&other_type);
        }

        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => {
                // Negative integers encode their argument as -1 - n.
                #[allow(clippy::cast_sign_loss)]
                let arg = |n: i64| if n >= 0 { n as u64 } else { (-1 - n) as u64 };
                let (a, b) = (arg(*a), arg(*b));
                uint_encoded_len(a).cmp(&uint_encoded_len(b)).then(a.cmp(&b))
            }
            (Value::Bytes(a), Value::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.cmp_canonical(y))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b.iter())
                    .map(|((ak, av), (bk, bv))| {
                        ak.cmp_canonical(bk).then_with(|| av.cmp_canonical(bv))
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            _ => self.simple_key().cmp(&other.simple_key()),
        }
    }

    /// Encoded length and trailing bits of a major-type-7 value.
    fn simple_key(&self) -> (usize, u64) {
        match self {
            Value::Bool(false) => (1, 0xf4),
            Value::Bool(true) => (1, 0xf5),
            Value::Null => (1, 0xf6),
            Value::Float(f) => (9, f.to_bits()),
            _ => (0, 0),
        }
    }

    fn major_type(&self) -> u8 {
        match self {
            Value::Integer(n) if *n >= 0 => 0,
            Value::Integer(_) => 1,
            Value::Bytes(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Bool(_) | Value::Null | Value::Float(_) => 7,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float.
    ///
    /// Integers are widened, since writers may emit whole numbers either way.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a text key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Encoded length (in bytes) of an unsigned CBOR argument.
pub(crate) fn uint_encoded_len(n: u64) -> usize {
    if n <= 23 {
        1
    } else if n <= 0xFF {
        2
    } else if n <= 0xFFFF {
        3
    } else if n <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::Array(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::Array(items.into_iter().map(Value::Text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_are_sorted_length_first() {
        let map = Value::map(vec![
            (Value::from("_uuid"), Value::Null),
            (Value::from("x"), Value::Float(1.0)),
            (Value::from("_type"), Value::Null),
            (Value::from("name"), Value::Null),
        ]);
        let keys: Vec<_> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap())
            .collect();
        assert_eq!(keys, vec!["x", "name", "_type", "_uuid"]);
    }

    #[test]
    fn integer_ordering() {
        let mut values = vec![
            Value::Integer(-1),
            Value::Integer(0),
            Value::Integer(300),
            Value::Integer(-2),
            Value::Integer(2),
        ];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(
            values,
            vec![
                Value::Integer(0),
                Value::Integer(2),
                Value::Integer(300),
                Value::Integer(-1),
                Value::Integer(-2),
            ]
        );
    }

    #[test]
    fn simple_values_sort_before_floats() {
        let mut values = vec![Value::Float(0.5), Value::Null, Value::Bool(true)];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(values, vec![Value::Bool(true), Value::Null, Value::Float(0.5)]);
    }

    #[test]
    fn float_accessor_widens_integers() {
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Integer(3).as_float(), Some(3.0));
        assert_eq!(Value::from("3").as_float(), None);
    }

    #[test]
    fn map_get() {
        let map = Value::map(vec![
            (Value::from("red"), Value::Float(1.0)),
            (Value::from("alpha"), Value::Float(0.5)),
        ]);
        assert_eq!(map.get("alpha"), Some(&Value::Float(0.5)));
        assert_eq!(map.get("green"), None);
        assert_eq!(Value::Null.get("red"), None);
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7u32), Value::Integer(7));
        assert_eq!(Value::from(0.25f32), Value::Float(0.25));
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
    }
}
