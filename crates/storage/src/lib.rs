//! Storage layer for jotfile: codec, indexes, store, journal, lock file.
//!
//! Everything here is synchronous; the async boundary is at the caller
//! (the database façade), which serializes operations through its gate.

pub mod codec;
pub mod index;
pub mod journal;
pub mod lock;
pub mod store;

pub use index::{Index, IndexSpec};
pub use journal::{CompactionSort, Entry, Journal};
pub use lock::LockFile;
pub use store::{Store, UpsertMode};
