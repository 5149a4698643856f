//! Asynchronous ordered key-value storage areas for kvarea.
//!
//! This crate provides the facade applications use:
//! - Named storage areas with `get`, `set`, `delete` and `clear`
//! - Lazy enumeration over keys, values and entries in key order
//! - A cached, self-healing connection per area
//! - A process-wide default area
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    StorageArea                           │
//! │     get / set / delete / clear    keys / values / entries│
//! └──────────────┬──────────────────────────────┬───────────┘
//!                │                              │
//!                │               ┌──────────────▼───────────┐
//!                │               │ SequentialRangeIterator  │
//!                │               │  - cursor                │
//!                │               │  - serialized advances   │
//!                │               └──────────────┬───────────┘
//!                │                              │
//! ┌──────────────▼──────────────────────────────▼───────────┐
//! │                 ConnectionManager                        │
//! │  - single-flight open     - schema validation            │
//! │  - invalidation on close / version change                │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                 kvarea_engine::Engine                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kvarea_engine::Engine;
//! use kvarea_storage::StorageArea;
//! use std::sync::Arc;
//!
//! # async fn example() -> kvarea_storage::Result<()> {
//! let engine = Arc::new(Engine::open_sled("./kvarea_data").unwrap());
//! let area = StorageArea::new(engine, "settings");
//!
//! area.set("theme", Some("dark")).await?;
//! let theme: Option<String> = area.get("theme").await?;
//!
//! let entries = area.entries().collect().await?;
//! # Ok(())
//! # }
//! ```

pub mod area;
pub mod config;
pub mod connection;
pub mod error;
pub mod iter;
pub mod range;

// Re-export commonly used types
pub use area::{init_storage, storage, StorageArea};
pub use config::{AreaConfig, BackingStore, DEFAULT_AREA_NAME};
pub use connection::ConnectionManager;
pub use error::{Result, StorageError};
pub use iter::{IterItem, IterMode, SequentialRangeIterator};
pub use range::Cursor;
