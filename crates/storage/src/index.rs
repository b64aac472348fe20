//! Secondary indexes: one field, unique or multi-valued, optionally sparse.
//!
//! An index links frozen document handles under the document's value at
//! the indexed field. Record identity is pointer identity
//! ([`Arc::ptr_eq`]), which is what makes removal guards and rollback
//! safe: removing a record an index never linked is a no-op.

use jotfile_core::document::{value_at, Document, SharedDocument};
use jotfile_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Descriptor for one index. Wire names (`fieldName`) match the journal
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(rename = "fieldName")]
    pub field_name: String,

    #[serde(default)]
    pub unique: bool,

    /// Sparse indexes skip records whose indexed value is null or absent.
    #[serde(default)]
    pub sparse: bool,
}

impl IndexSpec {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

/// An ordered rendering of an indexed JSON value. Key order is what
/// makes compaction output canonical.
///
/// Numbers canonicalize integral floats to `Int` so `2` and `2.0` land
/// on the same key; other floats key by bit pattern (JSON has no NaN).
/// Non-scalar values key by their canonical text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Composite(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> IndexKey {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    IndexKey::Int(i)
                } else {
                    let f = n.as_f64().unwrap_or(0.0);
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        IndexKey::Int(f as i64)
                    } else {
                        IndexKey::Float(f.to_bits())
                    }
                }
            }
            Value::String(s) => IndexKey::Str(s.clone()),
            other => IndexKey::Composite(serde_json::to_string(other).unwrap_or_default()),
        }
    }
}

/// Closed set of index shapes: one record per key, or many.
#[derive(Debug)]
enum Entries {
    Unique(BTreeMap<IndexKey, SharedDocument>),
    Multi(BTreeMap<IndexKey, Vec<SharedDocument>>),
}

#[derive(Debug)]
pub struct Index {
    spec: IndexSpec,
    entries: Entries,
}

impl Index {
    pub fn new(spec: IndexSpec) -> Self {
        let entries = if spec.unique {
            Entries::Unique(BTreeMap::new())
        } else {
            Entries::Multi(BTreeMap::new())
        };
        Self { spec, entries }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// The keys this document links under: one per distinct array
    /// element for array values, the null key for null/absent values on
    /// a non-sparse index, nothing on a sparse one.
    fn keys_for(&self, doc: &Document) -> Vec<IndexKey> {
        match value_at(doc, &self.spec.field_name) {
            None | Some(Value::Null) => {
                if self.spec.sparse {
                    Vec::new()
                } else {
                    vec![IndexKey::Null]
                }
            }
            Some(Value::Array(items)) => {
                let mut keys: Vec<IndexKey> = Vec::with_capacity(items.len());
                for item in items {
                    let key = IndexKey::from_value(item);
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
            Some(value) => vec![IndexKey::from_value(value)],
        }
    }

    /// Link a document. On a unique index, fails with `KeyViolation` if
    /// any of its keys already links a *different* record; the document
    /// is then linked under none of them.
    pub fn add(&mut self, doc: &SharedDocument) -> Result<()> {
        let keys = self.keys_for(doc);
        match &mut self.entries {
            Entries::Unique(map) => {
                for key in &keys {
                    if let Some(existing) = map.get(key) {
                        if !Arc::ptr_eq(existing, doc) {
                            return Err(Error::KeyViolation {
                                field: self.spec.field_name.clone(),
                                record: doc.clone(),
                            });
                        }
                    }
                }
                for key in keys {
                    map.insert(key, doc.clone());
                }
            }
            Entries::Multi(map) => {
                for key in keys {
                    let linked = map.entry(key).or_default();
                    if !linked.iter().any(|d| Arc::ptr_eq(d, doc)) {
                        linked.push(doc.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Unlink a document. A no-op for keys where this exact record is
    /// not the one linked.
    pub fn remove(&mut self, doc: &SharedDocument) {
        for key in self.keys_for(doc) {
            match &mut self.entries {
                Entries::Unique(map) => {
                    if map.get(&key).is_some_and(|d| Arc::ptr_eq(d, doc)) {
                        map.remove(&key);
                    }
                }
                Entries::Multi(map) => {
                    if let Some(linked) = map.get_mut(&key) {
                        linked.retain(|d| !Arc::ptr_eq(d, doc));
                        if linked.is_empty() {
                            map.remove(&key);
                        }
                    }
                }
            }
        }
    }

    /// All records linked under `value` (at most one on a unique index).
    pub fn find(&self, value: &Value) -> Vec<SharedDocument> {
        let key = IndexKey::from_value(value);
        match &self.entries {
            Entries::Unique(map) => map.get(&key).cloned().into_iter().collect(),
            Entries::Multi(map) => map.get(&key).cloned().unwrap_or_default(),
        }
    }

    /// One record linked under `value`, if any.
    pub fn find_one(&self, value: &Value) -> Option<SharedDocument> {
        let key = IndexKey::from_value(value);
        match &self.entries {
            Entries::Unique(map) => map.get(&key).cloned(),
            Entries::Multi(map) => map.get(&key).and_then(|v| v.first()).cloned(),
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        match &self.entries {
            Entries::Unique(map) => map.len(),
            Entries::Multi(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every linked record. On the primary index (unique, scalar keys)
    /// this is exactly the live record set.
    pub fn documents(&self) -> Vec<SharedDocument> {
        match &self.entries {
            Entries::Unique(map) => map.values().cloned().collect(),
            Entries::Multi(map) => map.values().flatten().cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
