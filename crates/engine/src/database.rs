//! Open database connections.

use crate::backend::Backend;
use crate::error::{EngineError, Result};
use crate::schema::{DatabaseSchema, StoreSchema};
use crate::transaction::Transaction;
use crate::EngineStats;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Notification delivered to an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEvent {
    /// The engine closed the connection abnormally.
    Close,
    /// Another open or a delete wants to change the database. The connection
    /// is expected to close, otherwise the request is blocked.
    VersionChange {
        old_version: u32,
        /// `None` when the database is being deleted.
        new_version: Option<u32>,
    },
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Callback receiving connection events.
pub type EventHandler = Arc<dyn Fn(&Database, DatabaseEvent) + Send + Sync>;

/// A live connection to one database.
///
/// The schema is a snapshot taken at open time; it cannot change while the
/// connection stays open because upgrades require every connection to close.
pub struct Database {
    id: u64,
    name: String,
    schema: DatabaseSchema,
    backend: Arc<dyn Backend>,
    stats: Arc<EngineStats>,
    closed: Arc<AtomicBool>,
    handler: Mutex<Option<EventHandler>>,
}

impl Database {
    pub(crate) fn new(
        id: u64,
        name: String,
        schema: DatabaseSchema,
        backend: Arc<dyn Backend>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            id,
            name,
            schema,
            backend,
            stats,
            closed: Arc::new(AtomicBool::new(false)),
            handler: Mutex::new(None),
        }
    }

    /// Engine-wide unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.schema.version
    }

    /// Names of all object stores, in sorted order.
    pub fn object_store_names(&self) -> Vec<String> {
        self.schema.stores.keys().cloned().collect()
    }

    /// Metadata of one object store.
    pub fn object_store(&self, name: &str) -> Option<&StoreSchema> {
        self.schema.stores.get(name)
    }

    /// Begin a transaction over `store`.
    pub fn transaction(&self, store: &str, mode: TransactionMode) -> Result<Transaction> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        if !self.schema.stores.contains_key(store) {
            return Err(EngineError::StoreNotFound(store.to_string()));
        }

        Ok(Transaction::new(
            self.name.clone(),
            store.to_string(),
            mode,
            Arc::clone(&self.backend),
            Arc::clone(&self.stats),
            Arc::clone(&self.closed),
        ))
    }

    /// Close the connection. No event is delivered for a requested close.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Install the handler for close and version-change events, replacing any
    /// previous one.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&Database, DatabaseEvent) + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Deliver `event`. A `Close` event closes the connection first.
    pub(crate) fn dispatch(&self, event: DatabaseEvent) {
        if event == DatabaseEvent::Close {
            self.close();
        }

        // Clone out so the handler can call back into this connection.
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(self, event);
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.schema.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}
