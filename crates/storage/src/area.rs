//! The `StorageArea` facade and the process-wide default area.

use crate::config::{AreaConfig, BackingStore, DEFAULT_AREA_NAME};
use crate::connection::ConnectionManager;
use crate::error::{Result, StorageError};
use crate::iter::{IterMode, SequentialRangeIterator};
use kvarea_core::{Key, KeyRange, Value};
use kvarea_engine::{Engine, TransactionMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

static DEFAULT_STORAGE: OnceLock<StorageArea> = OnceLock::new();

/// A named, ordered key-value namespace backed by one engine database.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct StorageArea {
    name: String,
    connection: ConnectionManager,
}

impl StorageArea {
    /// Create the area called `name` with the default configuration.
    pub fn new(engine: Arc<Engine>, name: &str) -> Self {
        Self::with_config(engine, name, &AreaConfig::default())
    }

    pub fn with_config(engine: Arc<Engine>, name: &str, config: &AreaConfig) -> Self {
        Self {
            name: name.to_string(),
            connection: ConnectionManager::new(engine, config.backing_store(name)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical database and store holding this area's data.
    pub fn backing_store(&self) -> &BackingStore {
        self.connection.backing_store()
    }

    // =========================================================================
    // Single-key Operations
    // =========================================================================

    /// Get the value stored under `key`, decoded as `V`.
    pub async fn get<V: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<V>> {
        match self.get_raw(key).await? {
            Some(value) => Ok(Some(value.decode()?)),
            None => Ok(None),
        }
    }

    /// Get the encoded value stored under `key`.
    pub async fn get_raw(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = checked(key)?;
        self.connection
            .perform(TransactionMode::ReadOnly, |tx| async move {
                Ok::<_, StorageError>(tx.get(&KeyRange::only(key)).await?)
            })
            .await
    }

    /// Store `value` under `key`. `None` deletes the key.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: Option<&V>,
    ) -> Result<()> {
        let key = checked(key)?;
        let value = value.map(Value::encode).transpose()?;
        self.write(key, value).await
    }

    /// Store an already encoded value. `None` deletes the key.
    pub async fn set_raw(&self, key: impl Into<Key>, value: Option<Value>) -> Result<()> {
        let key = checked(key)?;
        self.write(key, value).await
    }

    /// Remove `key`. Removing a missing key succeeds.
    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = checked(key)?;
        self.write(key, None).await
    }

    /// Delete every key by deleting the backing database.
    ///
    /// The area stays usable; the next operation recreates the database.
    pub async fn clear(&self) -> Result<()> {
        self.connection.clear().await
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// Iterate over keys in ascending order.
    pub fn keys(&self) -> SequentialRangeIterator {
        self.iter(IterMode::Keys)
    }

    /// Iterate over values in ascending key order.
    pub fn values(&self) -> SequentialRangeIterator {
        self.iter(IterMode::Values)
    }

    /// Iterate over `(key, value)` entries in ascending key order.
    pub fn entries(&self) -> SequentialRangeIterator {
        self.iter(IterMode::Entries)
    }

    fn iter(&self, mode: IterMode) -> SequentialRangeIterator {
        SequentialRangeIterator::new(mode, self.connection.clone())
    }

    async fn write(&self, key: Key, value: Option<Value>) -> Result<()> {
        self.connection
            .perform(TransactionMode::ReadWrite, |tx| async move {
                match value {
                    Some(value) => tx.put(key, value)?,
                    None => tx.delete(key)?,
                }
                tx.commit().await?;
                Ok::<_, StorageError>(())
            })
            .await
    }
}

impl fmt::Debug for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageArea")
            .field("name", &self.name)
            .field("backing_store", self.backing_store())
            .finish()
    }
}

fn checked(key: impl Into<Key>) -> Result<Key> {
    let key = key.into();
    key.validate()?;
    Ok(key)
}

/// Install the process-wide default area on `engine`.
///
/// Only the first call has an effect; later calls return the installed area.
pub fn init_storage(engine: Arc<Engine>) -> &'static StorageArea {
    let mut installed = false;
    let area = DEFAULT_STORAGE.get_or_init(|| {
        installed = true;
        StorageArea::new(engine, DEFAULT_AREA_NAME)
    });

    if installed {
        debug!("installed default storage area");
    } else {
        warn!("default storage area already initialized, engine ignored");
    }
    area
}

/// The process-wide default area, backed by an in-memory engine unless
/// [`init_storage`] ran first.
pub fn storage() -> &'static StorageArea {
    DEFAULT_STORAGE.get_or_init(|| {
        debug!("default storage area falling back to in-memory engine");
        StorageArea::new(Arc::new(Engine::in_memory()), DEFAULT_AREA_NAME)
    })
}
