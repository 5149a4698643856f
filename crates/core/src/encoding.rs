//! Order-preserving byte encoding for keys.
//!
//! Backends that compare raw bytes (sled) store keys in this form. For any two
//! valid keys `a < b` the encodings satisfy `encode(a) < encode(b)`
//! lexicographically, so byte-range scans walk keys in engine order.
//!
//! Layout:
//!
//! ```text
//! Number  0x10 ++ sortable f64 (8 bytes, big-endian)
//! Date    0x20 ++ sortable i64 milliseconds (8 bytes, big-endian)
//! String  0x30 ++ terminated UTF-8 bytes
//! Binary  0x40 ++ terminated bytes
//! Array   0x50 ++ encoded elements ++ 0x00
//! ```
//!
//! Terminated bytes escape `0x00` as `0x01 0x01` and `0x01` as `0x01 0x02`,
//! then end with `0x00`, so a prefix sorts before its extensions.

use crate::key::{Key, KeyError, Result};
use crate::range::KeyRange;
use chrono::DateTime;
use std::ops::Bound;

const TAG_NUMBER: u8 = 0x10;
const TAG_DATE: u8 = 0x20;
const TAG_STRING: u8 = 0x30;
const TAG_BINARY: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Encode a key into its order-preserving byte form.
pub fn encode_key(key: &Key) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(key, &mut buf);
    buf
}

/// Decode a key previously produced by [`encode_key`].
pub fn decode_key(bytes: &[u8]) -> Result<Key> {
    let mut buf = bytes;
    let key = decode_from(&mut buf)?;
    if !buf.is_empty() {
        return Err(KeyError::Decode(format!("{} trailing bytes", buf.len())));
    }
    Ok(key)
}

/// Translate a key range into bounds over encoded keys.
pub fn encode_range(range: &KeyRange) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    (encode_bound(range.lower()), encode_bound(range.upper()))
}

fn encode_bound(bound: Bound<&Key>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(key) => Bound::Included(encode_key(key)),
        Bound::Excluded(key) => Bound::Excluded(encode_key(key)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn encode_into(key: &Key, buf: &mut Vec<u8>) {
    match key {
        Key::Number(n) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&encode_f64_sortable(*n).to_be_bytes());
        }
        Key::Date(date) => {
            buf.push(TAG_DATE);
            let millis = date.timestamp_millis() as u64 ^ SIGN_BIT;
            buf.extend_from_slice(&millis.to_be_bytes());
        }
        Key::String(s) => {
            buf.push(TAG_STRING);
            encode_terminated(s.as_bytes(), buf);
        }
        Key::Binary(bytes) => {
            buf.push(TAG_BINARY);
            encode_terminated(bytes, buf);
        }
        Key::Array(items) => {
            buf.push(TAG_ARRAY);
            for item in items {
                encode_into(item, buf);
            }
            buf.push(TERMINATOR);
        }
    }
}

fn decode_from(buf: &mut &[u8]) -> Result<Key> {
    let tag = take_byte(buf)?;
    match tag {
        TAG_NUMBER => Ok(Key::Number(decode_f64_sortable(take_u64(buf)?))),
        TAG_DATE => {
            let millis = (take_u64(buf)? ^ SIGN_BIT) as i64;
            DateTime::from_timestamp_millis(millis)
                .map(Key::Date)
                .ok_or_else(|| KeyError::Decode(format!("date out of range: {}", millis)))
        }
        TAG_STRING => {
            let bytes = decode_terminated(buf)?;
            String::from_utf8(bytes)
                .map(Key::String)
                .map_err(|e| KeyError::Decode(e.to_string()))
        }
        TAG_BINARY => decode_terminated(buf).map(Key::Binary),
        TAG_ARRAY => {
            let mut items = Vec::new();
            loop {
                match buf.first() {
                    Some(&TERMINATOR) => {
                        *buf = &buf[1..];
                        return Ok(Key::Array(items));
                    }
                    Some(_) => items.push(decode_from(buf)?),
                    None => return Err(KeyError::Decode("unterminated array".into())),
                }
            }
        }
        other => Err(KeyError::Decode(format!("unknown key tag 0x{:02x}", other))),
    }
}

/// Positive floats get the sign bit flipped, negative floats get every bit
/// flipped. -0 is folded into +0 first.
fn encode_f64_sortable(value: f64) -> u64 {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

fn decode_f64_sortable(encoded: u64) -> f64 {
    let bits = if encoded & SIGN_BIT != 0 {
        encoded ^ SIGN_BIT
    } else {
        !encoded
    };
    f64::from_bits(bits)
}

fn encode_terminated(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        match byte {
            TERMINATOR => buf.extend_from_slice(&[ESCAPE, 0x01]),
            ESCAPE => buf.extend_from_slice(&[ESCAPE, 0x02]),
            _ => buf.push(byte),
        }
    }
    buf.push(TERMINATOR);
}

fn decode_terminated(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        match take_byte(buf)? {
            TERMINATOR => return Ok(out),
            ESCAPE => match take_byte(buf)? {
                0x01 => out.push(TERMINATOR),
                0x02 => out.push(ESCAPE),
                other => {
                    return Err(KeyError::Decode(format!(
                        "invalid escape sequence 0x01 0x{:02x}",
                        other
                    )))
                }
            },
            byte => out.push(byte),
        }
    }
}

fn take_byte(buf: &mut &[u8]) -> Result<u8> {
    let (&first, rest) = buf
        .split_first()
        .ok_or_else(|| KeyError::Decode("unexpected end of key".into()))?;
    *buf = rest;
    Ok(first)
}

fn take_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(KeyError::Decode("truncated 8-byte field".into()));
    }
    let (head, rest) = buf.split_at(8);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(head);
    *buf = rest;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_keys() -> Vec<Key> {
        vec![
            Key::Number(f64::NEG_INFINITY),
            Key::Number(-10.5),
            Key::Number(0.0),
            Key::Number(3.0),
            Key::Number(f64::INFINITY),
            Key::Date(Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap()),
            Key::Date(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()),
            Key::from(""),
            Key::from("a\u{0}b"),
            Key::from("mycat"),
            Key::from("mydog"),
            Key::from("mydog2"),
            Key::Binary(vec![]),
            Key::Binary(vec![0x00]),
            Key::Binary(vec![0x01, 0x00]),
            Key::Binary(vec![0xFF]),
            Key::Array(vec![]),
            Key::Array(vec![Key::from(1)]),
            Key::Array(vec![Key::from(1), Key::from("x")]),
            Key::Array(vec![Key::from("a")]),
            Key::Array(vec![Key::Array(vec![])]),
        ]
    }

    #[test]
    fn test_encoding_preserves_order() {
        let keys = sample_keys();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
            assert!(
                encode_key(&pair[0]) < encode_key(&pair[1]),
                "encoded {} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_decode_inverts_encode() {
        for key in sample_keys() {
            assert_eq!(decode_key(&encode_key(&key)).unwrap(), key);
        }
    }

    #[test]
    fn test_decoded_date_matches_constructed_date() {
        let key = Key::from(Utc.timestamp_opt(1_546_300_800, 987_654_321).unwrap());

        match (decode_key(&encode_key(&key)).unwrap(), key) {
            (Key::Date(decoded), Key::Date(original)) => assert_eq!(decoded, original),
            other => panic!("expected date keys, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_zero_encodes_as_zero() {
        assert_eq!(encode_key(&Key::Number(-0.0)), encode_key(&Key::Number(0.0)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_key(&[]).is_err());
        assert!(decode_key(&[0x99]).is_err());
        assert!(decode_key(&[TAG_STRING, b'a']).is_err());
        assert!(decode_key(&[TAG_NUMBER, 0, 0]).is_err());
    }
}
