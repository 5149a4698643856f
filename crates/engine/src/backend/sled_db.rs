//! sled-backed persistent backend.
//!
//! Layout inside one sled database:
//! - `__kvarea_meta`: database name → bincode `DatabaseSchema`
//! - `data\0{database}\0{store}`: encoded key → raw value bytes, one tree per store

use super::{Backend, Write};
use crate::error::{EngineError, Result};
use crate::schema::DatabaseSchema;
use async_trait::async_trait;
use kvarea_core::{decode_key, encode_key, encode_range, Key, KeyRange, Value};
use sled::{Db, Tree};
use std::path::Path;

const META_TREE: &[u8] = b"__kvarea_meta";

/// Backend persisting databases in an embedded sled store.
pub struct SledBackend {
    db: Db,
    meta: Tree,
}

impl SledBackend {
    /// Open a backend at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Open a backend that is removed when dropped (for testing).
    pub fn open_temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, meta })
    }

    /// Name of the tree holding one store's entries.
    /// Format: "data\0" + database + "\0" + store
    fn data_tree_name(database: &str, store: &str) -> Vec<u8> {
        let mut name = b"data\0".to_vec();
        name.extend_from_slice(database.as_bytes());
        name.push(0);
        name.extend_from_slice(store.as_bytes());
        name
    }

    fn data_tree(&self, database: &str, store: &str) -> Result<Tree> {
        Ok(self.db.open_tree(Self::data_tree_name(database, store))?)
    }

    /// Like `data_tree`, but never creates the tree: a store nothing was
    /// written to reads as empty.
    fn existing_data_tree(&self, database: &str, store: &str) -> Result<Option<Tree>> {
        let name = Self::data_tree_name(database, store);
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_slice());

        if !exists {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(name)?))
    }
}

#[async_trait]
impl Backend for SledBackend {
    async fn load_schema(&self, database: &str) -> Result<Option<DatabaseSchema>> {
        match self.meta.get(database)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_schema(&self, database: &str, schema: &DatabaseSchema) -> Result<()> {
        let encoded = bincode::serialize(schema)?;
        self.meta.insert(database, encoded)?;
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        let Some(schema) = self.load_schema(database).await? else {
            return Ok(());
        };

        for store in schema.stores.keys() {
            self.db.drop_tree(Self::data_tree_name(database, store))?;
        }
        self.meta.remove(database)?;
        Ok(())
    }

    async fn first_in_range(
        &self,
        database: &str,
        store: &str,
        range: &KeyRange,
    ) -> Result<Option<(Key, Value)>> {
        let Some(tree) = self.existing_data_tree(database, store)? else {
            return Ok(None);
        };
        let bounds = encode_range(range);

        match tree.range::<Vec<u8>, _>(bounds).next().transpose()? {
            Some((key, value)) => {
                let key = decode_key(&key).map_err(|e| EngineError::Encoding(e.to_string()))?;
                Ok(Some((key, Value::from_bytes(value.to_vec()))))
            }
            None => Ok(None),
        }
    }

    /// Atomicity comes from sled's `apply_batch`: the staged writes are
    /// collected into one batch and written through the WAL together.
    async fn apply(&self, database: &str, store: &str, writes: Vec<Write>) -> Result<()> {
        let tree = self.data_tree(database, store)?;
        let mut batch = sled::Batch::default();
        for write in writes {
            match write {
                Write::Put { key, value } => batch.insert(encode_key(&key), value.into_bytes()),
                Write::Delete { key } => batch.remove(encode_key(&key)),
            }
        }
        tree.apply_batch(batch)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StoreSchema;

    fn schema_with_store() -> DatabaseSchema {
        let mut schema = DatabaseSchema {
            version: 1,
            ..Default::default()
        };
        schema
            .stores
            .insert("store".to_string(), StoreSchema::default());
        schema
    }

    #[tokio::test]
    async fn test_schema_round_trip() {
        let backend = SledBackend::open_temporary().unwrap();
        assert_eq!(backend.load_schema("db").await.unwrap(), None);

        let schema = schema_with_store();
        backend.save_schema("db", &schema).await.unwrap();
        assert_eq!(backend.load_schema("db").await.unwrap(), Some(schema));
    }

    #[tokio::test]
    async fn test_range_lookup_uses_key_order() {
        let backend = SledBackend::open_temporary().unwrap();
        backend.save_schema("db", &schema_with_store()).await.unwrap();

        // Numbers sort before strings even though they were written last.
        let writes = vec![
            Write::Put {
                key: Key::from("mydog"),
                value: Value::from_bytes(b"Jerry".to_vec()),
            },
            Write::Put {
                key: Key::from("mycat"),
                value: Value::from_bytes(b"Tom".to_vec()),
            },
            Write::Put {
                key: Key::from(-7),
                value: Value::from_bytes(b"n".to_vec()),
            },
        ];
        backend.apply("db", "store", writes).await.unwrap();

        let (first, _) = backend
            .first_in_range("db", "store", &KeyRange::all())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, Key::from(-7));

        let (next, value) = backend
            .first_in_range("db", "store", &KeyRange::lower_bound(first, true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, Key::from("mycat"));
        assert_eq!(value.as_bytes(), b"Tom");
    }

    #[tokio::test]
    async fn test_drop_database_removes_entries() {
        let backend = SledBackend::open_temporary().unwrap();
        backend.save_schema("db", &schema_with_store()).await.unwrap();
        backend
            .apply(
                "db",
                "store",
                vec![Write::Put {
                    key: Key::from("k"),
                    value: Value::from_bytes(vec![1]),
                }],
            )
            .await
            .unwrap();

        backend.drop_database("db").await.unwrap();

        assert_eq!(backend.load_schema("db").await.unwrap(), None);
        assert!(backend
            .first_in_range("db", "store", &KeyRange::all())
            .await
            .unwrap()
            .is_none());
        assert!(!has_data_tree(&backend, "db", "store"));
    }

    fn has_data_tree(backend: &SledBackend, database: &str, store: &str) -> bool {
        let name = SledBackend::data_tree_name(database, store);
        backend
            .db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_slice())
    }

    #[tokio::test]
    async fn test_reads_do_not_create_trees() {
        let backend = SledBackend::open_temporary().unwrap();
        backend.save_schema("db", &schema_with_store()).await.unwrap();

        for database in ["db", "missing"] {
            assert!(backend
                .first_in_range(database, "store", &KeyRange::all())
                .await
                .unwrap()
                .is_none());
            assert!(!has_data_tree(&backend, database, "store"));
        }
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = SledBackend::open(dir.path()).unwrap();
            backend.save_schema("db", &schema_with_store()).await.unwrap();
            backend
                .apply(
                    "db",
                    "store",
                    vec![Write::Put {
                        key: Key::from("k"),
                        value: Value::from_bytes(vec![9]),
                    }],
                )
                .await
                .unwrap();
            backend.flush().await.unwrap();
        }

        let backend = SledBackend::open(dir.path()).unwrap();
        assert!(backend.load_schema("db").await.unwrap().is_some());
        let (_, value) = backend
            .first_in_range("db", "store", &KeyRange::only(Key::from("k")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.as_bytes(), &[9]);
    }
}
