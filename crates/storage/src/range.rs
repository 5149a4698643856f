//! Cursor state and the "next entry after" lookups iterators are built on.

use crate::error::Result;
use kvarea_core::{Key, KeyRange, Value};
use kvarea_engine::Transaction;

/// Position of an iterator in the key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing yielded yet; the next lookup starts at the smallest key.
    NotStarted,
    /// The last key yielded.
    After(Key),
    /// The engine reported no further key.
    Exhausted,
}

impl Cursor {
    /// Range for the next lookup, or `None` once exhausted.
    pub fn next_range(&self) -> Option<KeyRange> {
        match self {
            Cursor::NotStarted => Some(KeyRange::all()),
            Cursor::After(key) => Some(KeyRange::lower_bound(key.clone(), true)),
            Cursor::Exhausted => None,
        }
    }

    /// Cursor after a lookup that found `key`, or found nothing.
    pub fn advanced_to(key: Option<Key>) -> Self {
        match key {
            Some(key) => Cursor::After(key),
            None => Cursor::Exhausted,
        }
    }
}

/// Smallest key in `range`.
pub async fn next_key(transaction: &Transaction, range: &KeyRange) -> Result<Option<Key>> {
    Ok(transaction.get_key(range).await?)
}

/// Smallest key in `range` with its value.
pub async fn next_key_value_pair(
    transaction: &Transaction,
    range: &KeyRange,
) -> Result<Option<(Key, Value)>> {
    Ok(transaction.get_entry(range).await?)
}
