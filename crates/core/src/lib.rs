//! Core key-value primitives for kvarea.
//!
//! This crate provides the types shared by the engine and the storage facade:
//! - Keys (allowed shapes, validation, engine ordering)
//! - Key ranges for cursor-style lookups
//! - Order-preserving key encoding for byte-ordered backends
//! - Serialized values

pub mod encoding;
pub mod key;
pub mod range;
pub mod value;

// Re-export commonly used types at the crate root
pub use encoding::{decode_key, encode_key, encode_range};
pub use key::{Key, KeyError};
pub use range::KeyRange;
pub use value::{Value, ValueError};
