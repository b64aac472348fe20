//! jotfile-core: shared types for the jotfile document store.
//!
//! Provides the JSON document model, dotted-path field access, the
//! primary-key hash, date values, the options schema, and the error
//! type shared by every jotfile crate.

pub mod date;
pub mod document;
pub mod error;
pub mod options;

pub use document::{Document, SharedDocument};
pub use error::{Error, Result};
pub use options::Options;
