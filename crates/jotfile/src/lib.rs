//! jotfile: an embedded, single-process, file-backed JSON document store.
//!
//! Records live in memory, are searched through secondary indexes
//! (unique or multi-valued, optionally sparse, dotted paths allowed),
//! and persist to one append-only journal that is replayed on open and
//! compacted into canonical form. A lock file keeps other processes
//! out; a FIFO gate serializes every in-process operation.
//!
//! ```no_run
//! use jotfile::{document, Database, IndexSpec, Options};
//! use serde_json::json;
//!
//! # async fn demo() -> jotfile::Result<()> {
//! let db = Database::open("app.db", Options::default()).await?;
//! db.ensure_index(IndexSpec::new("tags")).await?;
//! db.insert(document::from_value(json!({"_id": 1, "tags": ["p", "q"]}))?)
//!     .await?;
//! let hits = db.find("tags", json!("q")).await?;
//! assert_eq!(hits.len(), 1);
//! db.close().await?;
//! # Ok(()) }
//! ```

mod database;
mod serializer;

pub use database::Database;
pub use jotfile_core::{date, document, Document, Error, Options, Result, SharedDocument};
pub use jotfile_storage::{CompactionSort, IndexSpec};
