//! Storage area configuration.

use serde::Serialize;

/// Name of the process-wide default area.
pub const DEFAULT_AREA_NAME: &str = "default";

/// How a storage area maps onto the engine.
#[derive(Debug, Clone)]
pub struct AreaConfig {
    /// Prefix joined with the area name to form the physical database name.
    pub database_prefix: String,
    /// The single object store every area database holds.
    pub store_name: String,
    /// Schema version areas open their database at.
    pub version: u32,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            database_prefix: "kv-storage:".to_string(),
            store_name: "store".to_string(),
            version: 1,
        }
    }
}

impl AreaConfig {
    /// Physical coordinates of the area called `name`.
    pub fn backing_store(&self, name: &str) -> BackingStore {
        BackingStore {
            database: format!("{}{}", self.database_prefix, name),
            store: self.store_name.clone(),
            version: self.version,
        }
    }
}

/// Where an area's data physically lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackingStore {
    pub database: String,
    pub store: String,
    pub version: u32,
}
