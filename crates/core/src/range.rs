//! Key ranges used for cursor-style lookups.

use crate::key::{Key, KeyError, Result};
use std::ops::{Bound, RangeBounds};

/// A contiguous interval of keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// Every key, starting from the smallest one.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys at or after `key`, or strictly after it when `open` is set.
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
            upper: Bound::Unbounded,
        }
    }

    /// Keys at or before `key`, or strictly before it when `open` is set.
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// Fails when the interval is empty by construction (`lower > upper`, or
    /// equal bounds with either end open).
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> Result<Self> {
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(KeyError::InvalidKey(format!(
                "empty range between {} and {}",
                lower, upper
            )));
        }

        Ok(Self {
            lower: if lower_open {
                Bound::Excluded(lower)
            } else {
                Bound::Included(lower)
            },
            upper: if upper_open {
                Bound::Excluded(upper)
            } else {
                Bound::Included(upper)
            },
        })
    }

    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// The part of this range strictly after `key`, or `None` when nothing
    /// of the range is left past it.
    pub fn starting_after(&self, key: Key) -> Option<Self> {
        let exhausted = match &self.upper {
            Bound::Included(upper) | Bound::Excluded(upper) => key >= *upper,
            Bound::Unbounded => false,
        };
        if exhausted {
            return None;
        }

        Some(Self {
            lower: Bound::Excluded(key),
            upper: self.upper.clone(),
        })
    }

    /// Check whether `key` falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        RangeBounds::contains(self, key)
    }
}

impl RangeBounds<Key> for KeyRange {
    fn start_bound(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    fn end_bound(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }
}
