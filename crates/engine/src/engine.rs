//! Engine entry point: opening, upgrading and deleting databases.

use crate::backend::{Backend, MemoryBackend, SledBackend};
use crate::database::{Database, DatabaseEvent};
use crate::error::{EngineError, Result};
use crate::schema::VersionChange;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Default)]
pub struct EngineStats {
    reads: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of read requests served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// Transactional, versioned object-store engine.
///
/// Opens and deletes are serialized per engine. Before a database is upgraded
/// or deleted, every open connection to it receives
/// [`DatabaseEvent::VersionChange`]; if any connection is still open after
/// that, the request fails with [`EngineError::Blocked`].
pub struct Engine {
    backend: Arc<dyn Backend>,
    stats: Arc<EngineStats>,
    connections: Mutex<HashMap<String, Vec<Weak<Database>>>>,
    lifecycle: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl Engine {
    /// Create an engine over the given backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            stats: Arc::new(EngineStats::default()),
            connections: Mutex::new(HashMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create an engine whose databases live in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Create an engine persisting to a sled directory.
    pub fn open_sled<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(SledBackend::open(path)?)))
    }

    /// Create an engine over a temporary sled directory (for testing).
    pub fn open_sled_temporary() -> Result<Self> {
        Ok(Self::new(Arc::new(SledBackend::open_temporary()?)))
    }

    /// Open `name` at `version`.
    ///
    /// When the stored version is lower (0 for a database that does not exist
    /// yet), open connections are asked to close and `upgrade` runs against
    /// the schema; its changes and the new version are persisted only if it
    /// succeeds. Requesting a lower version than the stored one fails with
    /// [`EngineError::VersionError`].
    pub async fn open<F>(&self, name: &str, version: u32, upgrade: F) -> Result<Arc<Database>>
    where
        F: FnOnce(&mut VersionChange<'_>) -> Result<()> + Send,
    {
        if version == 0 {
            return Err(EngineError::InvalidVersion(version));
        }

        let _guard = self.lifecycle.lock().await;

        let mut schema = self.backend.load_schema(name).await?.unwrap_or_default();
        let existing = schema.version;

        if version < existing {
            return Err(EngineError::VersionError {
                requested: version,
                existing,
            });
        }

        if version > existing {
            debug!(database = name, from = existing, to = version, "upgrading database");
            self.request_version_change(name, existing, Some(version))?;

            let mut change = VersionChange::new(existing, version, &mut schema);
            upgrade(&mut change)?;
            schema.version = version;
            self.backend.save_schema(name, &schema).await?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let database = Arc::new(Database::new(
            id,
            name.to_string(),
            schema,
            Arc::clone(&self.backend),
            Arc::clone(&self.stats),
        ));

        self.connections
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Arc::downgrade(&database));

        debug!(database = name, connection = id, version, "opened database");
        Ok(database)
    }

    /// Delete `name` and everything in it. Deleting a missing database succeeds.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let existing = self
            .backend
            .load_schema(name)
            .await?
            .map_or(0, |schema| schema.version);
        self.request_version_change(name, existing, None)?;

        self.backend.drop_database(name).await?;
        debug!(database = name, "deleted database");
        Ok(())
    }

    /// Forcibly close every open connection to `name`, delivering
    /// [`DatabaseEvent::Close`] to each, as an engine does when the backing
    /// storage goes away underneath it.
    pub fn close_connections(&self, name: &str) {
        for database in self.live_connections(name) {
            debug!(database = name, connection = database.id(), "closing connection");
            database.dispatch(DatabaseEvent::Close);
        }
    }

    /// Make all committed writes durable.
    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }

    /// Number of open connections to `name`.
    pub fn open_connections(&self, name: &str) -> usize {
        self.live_connections(name).len()
    }

    /// Number of read requests served so far.
    pub fn read_count(&self) -> u64 {
        self.stats.reads()
    }

    /// Ask every open connection to `name` to close.
    fn request_version_change(
        &self,
        name: &str,
        old_version: u32,
        new_version: Option<u32>,
    ) -> Result<()> {
        let live = self.live_connections(name);
        for database in &live {
            database.dispatch(DatabaseEvent::VersionChange {
                old_version,
                new_version,
            });
        }

        if live.iter().any(|database| !database.is_closed()) {
            return Err(EngineError::Blocked(name.to_string()));
        }
        Ok(())
    }

    /// Open connections to `name`, pruning dropped and closed ones.
    fn live_connections(&self, name: &str) -> Vec<Arc<Database>> {
        let mut connections = self.connections.lock();
        let Some(list) = connections.get_mut(name) else {
            return Vec::new();
        };

        let live: Vec<Arc<Database>> = list
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|database| !database.is_closed())
            .collect();

        *list = live.iter().map(Arc::downgrade).collect();
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TransactionMode;
    use crate::schema::StoreOptions;
    use kvarea_core::{Key, KeyRange, Value};
    use std::sync::atomic::AtomicUsize;

    fn create_store(change: &mut VersionChange<'_>) -> Result<()> {
        change.create_object_store("store", StoreOptions::default())
    }

    #[tokio::test]
    async fn test_open_runs_upgrade_once() {
        let engine = Engine::in_memory();
        let upgrades = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&upgrades);
            let db = engine
                .open("db", 1, move |change| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(change.old_version(), 0);
                    create_store(change)
                })
                .await
                .unwrap();
            assert_eq!(db.version(), 1);
            assert_eq!(db.object_store_names(), vec!["store".to_string()]);
        }

        assert_eq!(upgrades.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_and_lower_versions() {
        let engine = Engine::in_memory();
        assert!(matches!(
            engine.open("db", 0, |_| Ok(())).await,
            Err(EngineError::InvalidVersion(0))
        ));

        let db = engine.open("db", 2, |_| Ok(())).await.unwrap();
        db.close();

        assert!(matches!(
            engine.open("db", 1, |_| Ok(())).await,
            Err(EngineError::VersionError {
                requested: 1,
                existing: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_upgrade_is_not_persisted() {
        let engine = Engine::in_memory();
        let result = engine
            .open("db", 1, |_| Err(EngineError::Constraint("nope".into())))
            .await;
        assert!(result.is_err());

        // The next open still sees version 0 and upgrades.
        let db = engine.open("db", 1, create_store).await.unwrap();
        assert_eq!(db.object_store_names(), vec!["store".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_notifies_and_blocks() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();

        // A connection that ignores version changes blocks deletion.
        assert!(matches!(
            engine.delete_database("db").await,
            Err(EngineError::Blocked(_))
        ));

        db.on_event(|db, event| {
            if let DatabaseEvent::VersionChange { new_version, .. } = event {
                assert_eq!(new_version, None);
                db.close();
            }
        });
        engine.delete_database("db").await.unwrap();
        assert!(db.is_closed());
    }

    #[tokio::test]
    async fn test_close_connections_fires_close() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        db.on_event(move |_, event| {
            assert_eq!(event, DatabaseEvent::Close);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.close_connections("db");
        assert!(db.is_closed());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(matches!(
            db.transaction("store", TransactionMode::ReadOnly),
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_transactions_round_trip() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();

        let tx = db.transaction("store", TransactionMode::ReadWrite).unwrap();
        tx.put(Key::from("b"), Value::from_bytes(vec![2])).unwrap();
        tx.put(Key::from("a"), Value::from_bytes(vec![1])).unwrap();
        tx.commit().await.unwrap();

        let tx = db.transaction("store", TransactionMode::ReadOnly).unwrap();
        assert_eq!(
            tx.get_key(&KeyRange::all()).await.unwrap(),
            Some(Key::from("a"))
        );
        assert!(matches!(
            tx.put(Key::from("c"), Value::default()),
            Err(EngineError::ReadOnly)
        ));
        assert!(engine.read_count() >= 1);
    }

    #[tokio::test]
    async fn test_reads_see_staged_writes() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();

        let tx = db.transaction("store", TransactionMode::ReadWrite).unwrap();
        tx.put(Key::from("a"), Value::from_bytes(vec![1])).unwrap();
        tx.put(Key::from("b"), Value::from_bytes(vec![2])).unwrap();
        tx.commit().await.unwrap();

        let tx = db.transaction("store", TransactionMode::ReadWrite).unwrap();
        tx.delete(Key::from("a")).unwrap();
        tx.put(Key::from("c"), Value::from_bytes(vec![3])).unwrap();

        assert_eq!(
            tx.get_key(&KeyRange::all()).await.unwrap(),
            Some(Key::from("b"))
        );
        assert_eq!(
            tx.get_key(&KeyRange::lower_bound(Key::from("b"), true))
                .await
                .unwrap(),
            Some(Key::from("c"))
        );

        // Aborting leaves the committed state untouched.
        tx.abort();
        let tx = db.transaction("store", TransactionMode::ReadOnly).unwrap();
        assert_eq!(
            tx.get(&KeyRange::only(Key::from("a"))).await.unwrap(),
            Some(Value::from_bytes(vec![1]))
        );
    }

    #[tokio::test]
    async fn test_commit_after_close_fails() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();

        let tx = db.transaction("store", TransactionMode::ReadWrite).unwrap();
        tx.put(Key::from("a"), Value::from_bytes(vec![1])).unwrap();
        db.close();

        assert!(matches!(tx.commit().await, Err(EngineError::Closed)));
    }

    #[tokio::test]
    async fn test_missing_store() {
        let engine = Engine::in_memory();
        let db = engine.open("db", 1, create_store).await.unwrap();
        assert!(matches!(
            db.transaction("other", TransactionMode::ReadOnly),
            Err(EngineError::StoreNotFound(_))
        ));
    }
}
