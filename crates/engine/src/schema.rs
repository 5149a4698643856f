//! Database schema metadata and the upgrade hook.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape of one object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Whether the store generates its own keys.
    pub auto_increment: bool,
    /// Path used to extract keys from values, if any.
    pub key_path: Option<String>,
    /// Names of the secondary indexes on the store.
    pub index_names: Vec<String>,
}

/// Persisted schema of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Schema version; 0 means the database has never been created.
    pub version: u32,
    /// Object stores by name.
    pub stores: BTreeMap<String, StoreSchema>,
}

/// Options for [`VersionChange::create_object_store`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub auto_increment: bool,
    pub key_path: Option<String>,
}

/// Handle passed to the upgrade callback of [`Engine::open`](crate::Engine::open)
/// when the stored version is lower than the requested one.
///
/// Changes are only persisted if the callback returns `Ok`.
pub struct VersionChange<'a> {
    old_version: u32,
    new_version: u32,
    schema: &'a mut DatabaseSchema,
}

impl<'a> VersionChange<'a> {
    pub(crate) fn new(old_version: u32, new_version: u32, schema: &'a mut DatabaseSchema) -> Self {
        Self {
            old_version,
            new_version,
            schema,
        }
    }

    /// Version stored before this upgrade (0 for a new database).
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn object_store_names(&self) -> Vec<String> {
        self.schema.stores.keys().cloned().collect()
    }

    /// Create an object store. Fails if one with this name already exists.
    pub fn create_object_store(&mut self, name: &str, options: StoreOptions) -> Result<()> {
        if self.schema.stores.contains_key(name) {
            return Err(EngineError::Constraint(format!(
                "object store {} already exists",
                name
            )));
        }

        self.schema.stores.insert(
            name.to_string(),
            StoreSchema {
                auto_increment: options.auto_increment,
                key_path: options.key_path,
                index_names: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add a secondary index name to an existing store.
    pub fn create_index(&mut self, store: &str, index: &str) -> Result<()> {
        let schema = self
            .schema
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::StoreNotFound(store.to_string()))?;

        if schema.index_names.iter().any(|name| name == index) {
            return Err(EngineError::Constraint(format!(
                "index {} already exists on {}",
                index, store
            )));
        }

        schema.index_names.push(index.to_string());
        Ok(())
    }
}
