//! Physical storage behind the engine.
//!
//! A backend keeps schemas and store contents for any number of named
//! databases. Versioning, connections and transactions live in the engine on
//! top of it.

mod memory;
mod sled_db;

pub use self::memory::MemoryBackend;
pub use self::sled_db::SledBackend;

use crate::error::Result;
use crate::schema::DatabaseSchema;
use async_trait::async_trait;
use kvarea_core::{Key, KeyRange, Value};

/// A staged write, applied on commit.
#[derive(Debug, Clone)]
pub enum Write {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Load the schema of `database`, or `None` if it does not exist.
    async fn load_schema(&self, database: &str) -> Result<Option<DatabaseSchema>>;

    /// Persist the schema of `database`, creating the database if needed.
    async fn save_schema(&self, database: &str, schema: &DatabaseSchema) -> Result<()>;

    /// Remove `database` with all of its stores. No-op if it does not exist.
    async fn drop_database(&self, database: &str) -> Result<()>;

    /// Smallest entry of `store` whose key falls inside `range`.
    async fn first_in_range(
        &self,
        database: &str,
        store: &str,
        range: &KeyRange,
    ) -> Result<Option<(Key, Value)>>;

    /// Apply `writes` to `store` atomically.
    async fn apply(&self, database: &str, store: &str, writes: Vec<Write>) -> Result<()>;

    /// Make applied writes durable.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
