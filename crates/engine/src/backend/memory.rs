//! In-memory backend using ordered maps.

use super::{Backend, Write};
use crate::error::Result;
use crate::schema::DatabaseSchema;
use async_trait::async_trait;
use kvarea_core::{Key, KeyRange, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct MemoryDatabase {
    schema: DatabaseSchema,
    stores: HashMap<String, BTreeMap<Key, Value>>,
}

/// Backend that keeps everything in memory. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryBackend {
    databases: RwLock<HashMap<String, MemoryDatabase>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load_schema(&self, database: &str) -> Result<Option<DatabaseSchema>> {
        Ok(self
            .databases
            .read()
            .get(database)
            .map(|db| db.schema.clone()))
    }

    async fn save_schema(&self, database: &str, schema: &DatabaseSchema) -> Result<()> {
        let mut databases = self.databases.write();
        let db = databases.entry(database.to_string()).or_default();
        db.schema = schema.clone();
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        self.databases.write().remove(database);
        Ok(())
    }

    async fn first_in_range(
        &self,
        database: &str,
        store: &str,
        range: &KeyRange,
    ) -> Result<Option<(Key, Value)>> {
        let databases = self.databases.read();
        let entry = databases
            .get(database)
            .and_then(|db| db.stores.get(store))
            .and_then(|entries| entries.range::<Key, _>((range.lower(), range.upper())).next())
            .map(|(key, value)| (key.clone(), value.clone()));
        Ok(entry)
    }

    async fn apply(&self, database: &str, store: &str, writes: Vec<Write>) -> Result<()> {
        let mut databases = self.databases.write();
        let entries = databases
            .entry(database.to_string())
            .or_default()
            .stores
            .entry(store.to_string())
            .or_default();

        for write in writes {
            match write {
                Write::Put { key, value } => {
                    entries.insert(key, value);
                }
                Write::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
