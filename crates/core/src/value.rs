//! Serialized values stored under keys.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Value encoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// An opaque stored value: the bincode encoding of a serde type.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Value(pub Vec<u8>);

impl Value {
    /// Serialize `value` into a stored value.
    pub fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Self, ValueError> {
        bincode::serialize(value)
            .map(Self)
            .map_err(|e| ValueError::Serialization(e.to_string()))
    }

    /// Deserialize the stored value as `V`.
    pub fn decode<V: DeserializeOwned>(&self) -> Result<V, ValueError> {
        bincode::deserialize(&self.0).map_err(|e| ValueError::Serialization(e.to_string()))
    }

    /// Wrap already-encoded bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "Value({} bytes, 0x{})", self.0.len(), hex::encode(shown))
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let value = Value::encode("Tom").unwrap();
        let decoded: String = value.decode().unwrap();
        assert_eq!(decoded, "Tom");
    }

    #[test]
    fn test_decode_wrong_type_fails() {
        let value = Value::from_bytes(vec![1]);
        let result: Result<String, _> = value.decode();
        assert!(matches!(result, Err(ValueError::Serialization(_))));
    }

    #[test]
    fn test_debug_is_truncated() {
        let value = Value::from_bytes(vec![0xAB; 32]);
        assert_eq!(format!("{:?}", value), "Value(32 bytes, 0xabababababababab)");
    }
}
