//! Versioned, transactional object-store engine for kvarea.
//!
//! This crate provides the storage engine the kvarea facade is built on:
//! - Named databases with a schema version and named object stores
//! - Upgrade hooks run when a database is opened at a higher version
//! - Read-only and read-write transactions with range lookups
//! - Close and version-change notifications for open connections
//! - Pluggable backends (in-memory, sled)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Engine                             │
//! │      open / upgrade / delete, connection registry        │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │  Database (connection)  ──►  Transaction (one store)     │
//! │   - schema snapshot          - staged writes             │
//! │   - event handler            - get / get_key / get_entry │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │          Backend: MemoryBackend | SledBackend            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kvarea_core::{Key, KeyRange, Value};
//! use kvarea_engine::{Engine, StoreOptions, TransactionMode};
//!
//! # async fn example() -> kvarea_engine::Result<()> {
//! let engine = Engine::in_memory();
//! let db = engine
//!     .open("example", 1, |change| {
//!         change.create_object_store("store", StoreOptions::default())
//!     })
//!     .await?;
//!
//! let tx = db.transaction("store", TransactionMode::ReadWrite)?;
//! tx.put(Key::from("greeting"), Value::encode("hello").unwrap())?;
//! tx.commit().await?;
//!
//! let tx = db.transaction("store", TransactionMode::ReadOnly)?;
//! let first = tx.get_key(&KeyRange::all()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod database;
pub mod engine;
pub mod error;
pub mod schema;
pub mod transaction;

// Re-export commonly used types
pub use backend::{Backend, MemoryBackend, SledBackend, Write};
pub use database::{Database, DatabaseEvent, EventHandler, TransactionMode};
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, Result};
pub use schema::{DatabaseSchema, StoreOptions, StoreSchema, VersionChange};
pub use transaction::Transaction;
