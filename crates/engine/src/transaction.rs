//! Transactions over a single object store.

use crate::backend::{Backend, Write};
use crate::database::TransactionMode;
use crate::error::{EngineError, Result};
use crate::EngineStats;
use kvarea_core::{Key, KeyRange, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A transaction over one object store.
///
/// Writes are staged and only reach the backend on [`commit`](Self::commit),
/// as one atomic batch. Reads inside a read-write transaction see its own
/// staged writes. Dropping a transaction without committing aborts it.
pub struct Transaction {
    database: String,
    store: String,
    mode: TransactionMode,
    backend: Arc<dyn Backend>,
    stats: Arc<EngineStats>,
    closed: Arc<AtomicBool>,
    staged: Mutex<BTreeMap<Key, Option<Value>>>,
}

impl Transaction {
    pub(crate) fn new(
        database: String,
        store: String,
        mode: TransactionMode,
        backend: Arc<dyn Backend>,
        stats: Arc<EngineStats>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            database,
            store,
            mode,
            backend,
            stats,
            closed,
            staged: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Value of the smallest key in `range`.
    pub async fn get(&self, range: &KeyRange) -> Result<Option<Value>> {
        Ok(self.get_entry(range).await?.map(|(_, value)| value))
    }

    /// Smallest key in `range`.
    pub async fn get_key(&self, range: &KeyRange) -> Result<Option<Key>> {
        Ok(self.get_entry(range).await?.map(|(key, _)| key))
    }

    /// Smallest key in `range` together with its value.
    pub async fn get_entry(&self, range: &KeyRange) -> Result<Option<(Key, Value)>> {
        self.ensure_active()?;
        self.stats.record_read();

        let mut range = range.clone();
        loop {
            let stored = self
                .backend
                .first_in_range(&self.database, &self.store, &range)
                .await?;
            let staged = self.first_staged(&range);

            let (key, write) = match (stored, staged) {
                (stored, None) => return Ok(stored),
                (Some((stored_key, value)), Some((staged_key, _))) if stored_key < staged_key => {
                    return Ok(Some((stored_key, value)));
                }
                (_, Some(staged)) => staged,
            };

            match write {
                Some(value) => return Ok(Some((key, value))),
                // Deleted in this transaction: look past it.
                None => match range.starting_after(key) {
                    Some(rest) => range = rest,
                    None => return Ok(None),
                },
            }
        }
    }

    /// Stage `value` under `key`.
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        self.ensure_writable()?;
        key.validate()?;
        self.staged.lock().insert(key, Some(value));
        Ok(())
    }

    /// Stage removal of `key`. Removing a missing key is not an error.
    pub fn delete(&self, key: Key) -> Result<()> {
        self.ensure_writable()?;
        key.validate()?;
        self.staged.lock().insert(key, None);
        Ok(())
    }

    /// Apply all staged writes atomically.
    ///
    /// Fails with [`EngineError::Closed`] if the connection was closed while
    /// the transaction was running; nothing is written in that case.
    pub async fn commit(self) -> Result<()> {
        self.ensure_active()?;

        let staged = std::mem::take(&mut *self.staged.lock());
        if staged.is_empty() {
            return Ok(());
        }

        let writes = staged
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Write::Put { key, value },
                None => Write::Delete { key },
            })
            .collect();

        self.backend.apply(&self.database, &self.store, writes).await
    }

    /// Discard all staged writes.
    pub fn abort(self) {}

    fn ensure_active(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::ReadOnly);
        }
        Ok(())
    }

    fn first_staged(&self, range: &KeyRange) -> Option<(Key, Option<Value>)> {
        self.staged
            .lock()
            .range::<Key, _>((range.lower(), range.upper()))
            .next()
            .map(|(key, value)| (key.clone(), value.clone()))
    }
}
