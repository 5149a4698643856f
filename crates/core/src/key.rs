//! Keys accepted by a storage area and the order the engine keeps them in.

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::json;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Key validation and decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("kv-storage: the given value is not allowed as a key ({0})")]
    InvalidKey(String),

    #[error("malformed encoded key: {0}")]
    Decode(String),
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeyError>;

/// A storage key.
///
/// Only numbers, dates, strings, binary buffers and (nested) arrays of those
/// can be used as keys. Keys of different kinds sort by kind first:
///
/// ```text
/// Number < Date < String < Binary < Array
/// ```
///
/// Within a kind, numbers compare numerically, dates by millisecond timestamp,
/// strings by code point, binary bytewise and arrays element by element with a
/// shorter prefix sorting first.
#[derive(Clone, Debug)]
pub enum Key {
    Number(f64),
    Date(DateTime<Utc>),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    /// Check that the key can be stored. NaN is rejected at any depth.
    pub fn validate(&self) -> Result<()> {
        match self {
            Key::Number(n) if n.is_nan() => Err(KeyError::InvalidKey("NaN".into())),
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    /// Build a key from a dynamically typed JSON value.
    ///
    /// Numbers, strings and arrays map directly. Dates and binary buffers use
    /// the tagged objects `{"$date": "<rfc3339>"}` and `{"$binary": "<hex>"}`;
    /// `{"$number": "Infinity"}` covers the infinities JSON cannot spell.
    /// Every other shape (plain objects, booleans, null) is rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        let key = match value {
            Json::Number(n) => Key::Number(
                n.as_f64()
                    .ok_or_else(|| KeyError::InvalidKey(format!("number {}", n)))?,
            ),
            Json::String(s) => Key::String(s.clone()),
            Json::Array(items) => Key::Array(
                items
                    .iter()
                    .map(Key::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Json::Object(map) => {
                let mut fields = map.iter();
                match (fields.next(), fields.next()) {
                    (Some((tag, inner)), None) => tagged_key(tag, inner)?,
                    _ => return Err(KeyError::InvalidKey("plain object".into())),
                }
            }
            Json::Bool(_) => return Err(KeyError::InvalidKey("boolean".into())),
            Json::Null => return Err(KeyError::InvalidKey("null".into())),
        };

        key.validate()?;
        Ok(key)
    }

    /// Render the key as JSON, the inverse of [`Key::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Key::Number(n) => match serde_json::Number::from_f64(*n) {
                Some(number) => serde_json::Value::Number(number),
                None if *n > 0.0 => json!({ "$number": "Infinity" }),
                None => json!({ "$number": "-Infinity" }),
            },
            Key::Date(date) => json!({ "$date": date.to_rfc3339() }),
            Key::String(s) => serde_json::Value::String(s.clone()),
            Key::Binary(bytes) => json!({ "$binary": hex::encode(bytes) }),
            Key::Array(items) => serde_json::Value::Array(items.iter().map(Key::to_json).collect()),
        }
    }

    /// Rank of the key kind in the engine order.
    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Binary(_) => 3,
            Key::Array(_) => 4,
        }
    }
}

/// Decode the single-field tagged objects used for dates, binary and infinities.
fn tagged_key(tag: &str, inner: &serde_json::Value) -> Result<Key> {
    let text = inner
        .as_str()
        .ok_or_else(|| KeyError::InvalidKey(format!("{} must be a string", tag)))?;

    match tag {
        "$date" => Ok(Key::from(
            DateTime::parse_from_rfc3339(text)
                .map_err(|e| KeyError::InvalidKey(format!("date: {}", e)))?
                .with_timezone(&Utc),
        )),
        "$binary" => Ok(Key::Binary(
            hex::decode(text).map_err(|e| KeyError::InvalidKey(format!("binary: {}", e)))?,
        )),
        "$number" => match text {
            "Infinity" => Ok(Key::Number(f64::INFINITY)),
            "-Infinity" => Ok(Key::Number(f64::NEG_INFINITY)),
            other => Err(KeyError::InvalidKey(format!("number {}", other))),
        },
        _ => Err(KeyError::InvalidKey("plain object".into())),
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // `==` first so that -0 and +0 compare equal.
            (Key::Number(a), Key::Number(b)) if a == b => Ordering::Equal,
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Date(a), Key::Date(b)) => a.timestamp_millis().cmp(&b.timestamp_millis()),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.iter().cmp(b.iter()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(n.into())
    }
}

/// Dates are kept at millisecond precision, the resolution keys compare and
/// encode at.
impl From<DateTime<Utc>> for Key {
    fn from(date: DateTime<Utc>) -> Self {
        Key::Date(date.trunc_subsecs(3))
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::Binary(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::Binary(bytes.to_vec())
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}
