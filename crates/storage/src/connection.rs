//! Lazily opened, cached connection to an area's database.

use crate::config::BackingStore;
use crate::error::{Result, StorageError};
use futures::future::{BoxFuture, FutureExt, Shared};
use kvarea_engine::{Database, DatabaseEvent, Engine, StoreOptions, Transaction, TransactionMode};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type OpenFuture = Shared<BoxFuture<'static, Result<Arc<Database>>>>;

/// An open attempt, pending or settled, tagged so that stale notifications
/// cannot evict a newer attempt.
struct CachedOpen {
    attempt: u64,
    future: OpenFuture,
}

struct ConnectionState {
    engine: Arc<Engine>,
    backing: BackingStore,
    cached: Mutex<Option<CachedOpen>>,
    attempts: AtomicU64,
}

/// Owns the connection of one storage area.
///
/// The database is opened on first use and shared by every operation and
/// iterator of the area. Concurrent callers during an open all await the same
/// attempt. The cached connection is dropped when the engine closes it, when
/// a version change is requested, when the open fails, and on [`clear`].
///
/// [`clear`]: ConnectionManager::clear
#[derive(Clone)]
pub struct ConnectionManager {
    state: Arc<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(engine: Arc<Engine>, backing: BackingStore) -> Self {
        Self {
            state: Arc::new(ConnectionState {
                engine,
                backing,
                cached: Mutex::new(None),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn backing_store(&self) -> &BackingStore {
        &self.state.backing
    }

    /// Return the live connection, opening it if needed.
    pub async fn ensure_connection(&self) -> Result<Arc<Database>> {
        let future = {
            let mut cached = self.state.cached.lock();
            match cached.as_ref() {
                Some(open) if !is_stale(&open.future) => open.future.clone(),
                _ => {
                    let attempt = self.state.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let future = open_connection(Arc::clone(&self.state), attempt)
                        .boxed()
                        .shared();
                    *cached = Some(CachedOpen {
                        attempt,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    /// Run `steps` inside a transaction of `mode` on the area's store.
    pub async fn perform<T, F, Fut>(&self, mode: TransactionMode, steps: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let database = self.ensure_connection().await?;
        let transaction = database.transaction(&self.state.backing.store, mode)?;
        steps(transaction).await
    }

    /// Delete the area's database.
    ///
    /// Waits for an in-flight open first so deletion never races connection
    /// establishment. A failed open is ignored; the database is deleted anyway.
    pub async fn clear(&self) -> Result<()> {
        let pending = self
            .state
            .cached
            .lock()
            .as_ref()
            .map(|open| (open.attempt, open.future.clone()));

        if let Some((attempt, future)) = pending {
            let _ = future.await;
            // An open started while we waited is left alone.
            self.state.forget(attempt);
        }

        self.state
            .engine
            .delete_database(&self.state.backing.database)
            .await
            .map_err(StorageError::Deletion)?;

        debug!(database = %self.state.backing.database, "cleared storage area");
        Ok(())
    }
}

/// A settled attempt whose connection has since been closed.
fn is_stale(future: &OpenFuture) -> bool {
    matches!(future.peek(), Some(Ok(database)) if database.is_closed())
}

async fn open_connection(state: Arc<ConnectionState>, attempt: u64) -> Result<Arc<Database>> {
    let result = state.open_validated().await;

    match &result {
        Ok(database) => state.watch(database, attempt),
        Err(err) => {
            debug!(database = %state.backing.database, error = %err, "open failed");
            state.forget(attempt);
        }
    }

    result
}

impl ConnectionState {
    async fn open_validated(&self) -> Result<Arc<Database>> {
        let store = self.backing.store.clone();
        let database = self
            .engine
            .open(&self.backing.database, self.backing.version, move |change| {
                change.create_object_store(&store, StoreOptions::default())
            })
            .await
            .map_err(StorageError::Connection)?;

        if let Err(err) = check_schema(&database, &self.backing.store) {
            warn!(database = %self.backing.database, "refusing corrupted database");
            // An open handle would block the deletion that repairs it.
            database.close();
            return Err(err);
        }

        debug!(
            database = %self.backing.database,
            connection = database.id(),
            "opened storage area connection"
        );
        Ok(database)
    }

    /// Drop the cache when the engine closes the connection or wants to
    /// change the database.
    fn watch(self: &Arc<Self>, database: &Database, attempt: u64) {
        let state = Arc::downgrade(self);
        database.on_event(move |database, event| {
            if let DatabaseEvent::VersionChange { .. } = event {
                database.close();
            }
            debug!(
                database = database.name(),
                connection = database.id(),
                ?event,
                "storage area connection invalidated"
            );
            if let Some(state) = state.upgrade() {
                state.forget(attempt);
            }
        });
    }

    fn forget(&self, attempt: u64) {
        let mut cached = self.cached.lock();
        if cached.as_ref().is_some_and(|open| open.attempt == attempt) {
            *cached = None;
        }
    }
}

/// A usable area database holds exactly one plain store: no key generator,
/// no key path, no indexes.
fn check_schema(database: &Database, store: &str) -> Result<()> {
    let corrupted = || StorageError::Corrupted {
        database: database.name().to_string(),
    };

    let names = database.object_store_names();
    if names.len() != 1 || names[0] != store {
        return Err(corrupted());
    }

    let schema = database.object_store(store).ok_or_else(corrupted)?;
    if schema.auto_increment || schema.key_path.is_some() || !schema.index_names.is_empty() {
        return Err(corrupted());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AreaConfig;
    use kvarea_engine::EngineError;

    fn manager(engine: &Arc<Engine>, name: &str) -> ConnectionManager {
        ConnectionManager::new(Arc::clone(engine), AreaConfig::default().backing_store(name))
    }

    #[tokio::test]
    async fn test_connection_is_cached() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "cached");

        let first = connection.ensure_connection().await.unwrap();
        let second = connection.ensure_connection().await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(first.name(), "kv-storage:cached");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_open() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "single-flight");

        let (a, b, c) = futures::join!(
            connection.ensure_connection(),
            connection.ensure_connection(),
            connection.ensure_connection()
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a.id(), b.id());
        assert_eq!(b.id(), c.id());
    }

    #[tokio::test]
    async fn test_engine_close_reopens() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "reopen");

        let first = connection.ensure_connection().await.unwrap();
        engine.close_connections("kv-storage:reopen");
        assert!(first.is_closed());

        let second = connection.ensure_connection().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_version_change_closes_and_reopens() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "upgrade");
        let first = connection.ensure_connection().await.unwrap();

        // Another context upgrading the database closes our connection.
        let upgraded = engine
            .open("kv-storage:upgrade", 2, |_| Ok(()))
            .await
            .unwrap();
        assert!(first.is_closed());
        upgraded.close();

        // Reopening at version 1 now fails, and the failure is not cached.
        let err = connection.ensure_connection().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Connection(EngineError::VersionError { .. })
        ));
        let again = connection.ensure_connection().await.unwrap_err();
        assert_eq!(err, again);
    }

    #[tokio::test]
    async fn test_corrupted_schema() {
        let engine = Arc::new(Engine::in_memory());
        engine
            .open("kv-storage:broken", 1, |change| {
                change.create_object_store("store", StoreOptions::default())?;
                change.create_object_store("extra", StoreOptions::default())
            })
            .await
            .unwrap()
            .close();

        let connection = manager(&engine, "broken");
        let err = connection.ensure_connection().await.unwrap_err();
        assert_eq!(
            err,
            StorageError::Corrupted {
                database: "kv-storage:broken".to_string()
            }
        );

        // Clearing removes the bad database and the area becomes usable.
        connection.clear().await.unwrap();
        connection.ensure_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_store_shapes() {
        let engine = Arc::new(Engine::in_memory());

        engine
            .open("kv-storage:auto", 1, |change| {
                change.create_object_store(
                    "store",
                    StoreOptions {
                        auto_increment: true,
                        key_path: None,
                    },
                )
            })
            .await
            .unwrap()
            .close();
        engine
            .open("kv-storage:keypath", 1, |change| {
                change.create_object_store(
                    "store",
                    StoreOptions {
                        auto_increment: false,
                        key_path: Some("id".to_string()),
                    },
                )
            })
            .await
            .unwrap()
            .close();
        engine
            .open("kv-storage:indexed", 1, |change| {
                change.create_object_store("store", StoreOptions::default())?;
                change.create_index("store", "by_value")
            })
            .await
            .unwrap()
            .close();
        engine
            .open("kv-storage:renamed", 1, |change| {
                change.create_object_store("other", StoreOptions::default())
            })
            .await
            .unwrap()
            .close();

        for name in ["auto", "keypath", "indexed", "renamed"] {
            let err = manager(&engine, name).ensure_connection().await.unwrap_err();
            assert!(
                matches!(err, StorageError::Corrupted { .. }),
                "{} should be corrupted",
                name
            );
        }
    }

    fn cached_attempt(connection: &ConnectionManager) -> Option<u64> {
        connection.state.cached.lock().as_ref().map(|open| open.attempt)
    }

    #[tokio::test]
    async fn test_failed_open_is_retried() {
        let engine = Arc::new(Engine::in_memory());
        engine
            .open("kv-storage:repaired", 1, |change| {
                change.create_object_store("other", StoreOptions::default())
            })
            .await
            .unwrap()
            .close();

        let connection = manager(&engine, "repaired");
        let err = connection.ensure_connection().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
        assert_eq!(cached_attempt(&connection), None);

        // Repaired behind the area's back; the next call opens afresh.
        engine.delete_database("kv-storage:repaired").await.unwrap();
        let database = connection.ensure_connection().await.unwrap();
        assert_eq!(database.object_store_names(), vec!["store".to_string()]);
        assert_eq!(cached_attempt(&connection), Some(2));
    }

    #[tokio::test]
    async fn test_stale_attempt_does_not_evict_newer_open() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "attempts");

        let first = connection.ensure_connection().await.unwrap();
        first.close();
        let second = connection.ensure_connection().await.unwrap();
        assert_eq!(cached_attempt(&connection), Some(2));

        // What `clear` does once the attempt it waited on has settled.
        connection.state.forget(1);
        assert_eq!(cached_attempt(&connection), Some(2));
        assert_eq!(connection.ensure_connection().await.unwrap().id(), second.id());

        connection.clear().await.unwrap();
        assert_eq!(cached_attempt(&connection), None);
    }

    #[tokio::test]
    async fn test_clear_without_connection() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "never-opened");
        connection.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_perform_runs_in_transaction() {
        let engine = Arc::new(Engine::in_memory());
        let connection = manager(&engine, "perform");

        let mode = connection
            .perform(TransactionMode::ReadWrite, |tx| async move { Ok::<_, StorageError>(tx.mode()) })
            .await
            .unwrap();
        assert_eq!(mode, TransactionMode::ReadWrite);
    }
}
