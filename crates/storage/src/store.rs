//! The in-memory store: a primary index plus named secondary indexes,
//! kept mutually consistent across every mutation.
//!
//! The primary index owns the live record set; secondary indexes hold
//! additional handles to the same frozen documents. A mutation either
//! lands in every index or, after rollback, in none.

use crate::index::{Index, IndexSpec};
use jotfile_core::document::{self, Document, SharedDocument, KEY_PROBE_BUDGET};
use jotfile_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Existence requirement for an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// The primary key must not exist yet.
    Insert,
    /// The primary key must already exist.
    Update,
    /// Either way.
    Upsert,
}

#[derive(Debug)]
pub struct Store {
    primary_field: String,
    primary: Index,
    /// Secondary indexes by field name. BTreeMap gives the stable
    /// iteration order that compaction and rollback rely on.
    secondary: BTreeMap<String, Index>,
}

impl Store {
    pub fn new(primary_field: &str) -> Self {
        let primary = Index::new(IndexSpec::new(primary_field).unique());
        Self {
            primary_field: primary_field.to_string(),
            primary,
            secondary: BTreeMap::new(),
        }
    }

    pub fn primary_field(&self) -> &str {
        &self.primary_field
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Every live record, via the primary index.
    pub fn get_all(&self) -> Vec<SharedDocument> {
        self.primary.documents()
    }

    /// Descriptors of the secondary indexes, in stable (name) order.
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.secondary.values().map(|i| i.spec().clone()).collect()
    }

    fn index_for(&self, field: &str) -> Result<&Index> {
        if field == self.primary_field {
            return Ok(&self.primary);
        }
        self.secondary.get(field).ok_or_else(|| Error::NoIndex {
            field: field.to_string(),
        })
    }

    /// All records whose value at `field` equals `value`. Fails with
    /// `NoIndex` if `field` is not indexed.
    pub fn find(&self, field: &str, value: &Value) -> Result<Vec<SharedDocument>> {
        Ok(self.index_for(field)?.find(value))
    }

    /// One record whose value at `field` equals `value`, if any.
    pub fn find_one(&self, field: &str, value: &Value) -> Result<Option<SharedDocument>> {
        Ok(self.index_for(field)?.find_one(value))
    }

    /// Primary index first, then secondaries in name order. Every loop
    /// that touches "all indexes" must walk this same sequence so that
    /// rollback revisits exactly the indexes the forward pass did.
    fn indexes_mut(&mut self) -> impl Iterator<Item = &mut Index> + '_ {
        std::iter::once(&mut self.primary).chain(self.secondary.values_mut())
    }

    // -----------------------------------------------------------------------
    // Upsert
    // -----------------------------------------------------------------------

    /// Insert or replace one document.
    ///
    /// The candidate is normalized (generated primary key if missing),
    /// frozen, then linked into every index in order, unlinking the
    /// replaced record as it goes. If any index rejects the candidate,
    /// the whole mutation is rolled back and the error re-raised.
    pub fn upsert(&mut self, mut doc: Document, mode: UpsertMode) -> Result<SharedDocument> {
        let pk = match doc.get(&self.primary_field) {
            Some(v) if !v.is_null() => v.clone(),
            _ => {
                let key = self.generate_key(&doc)?;
                let value = Value::String(key);
                doc.insert(self.primary_field.clone(), value.clone());
                value
            }
        };

        let existing = self.primary.find_one(&pk);
        match mode {
            UpsertMode::Update if existing.is_none() => {
                return Err(Error::NotExists {
                    record: Arc::new(doc),
                })
            }
            UpsertMode::Insert if existing.is_some() => {
                return Err(Error::KeyViolation {
                    field: self.primary_field.clone(),
                    record: Arc::new(doc),
                })
            }
            _ => {}
        }

        let candidate: SharedDocument = Arc::new(doc);

        let mut failure = None;
        for index in self.indexes_mut() {
            if let Some(old) = &existing {
                index.remove(old);
            }
            if let Err(e) = index.add(&candidate) {
                failure = Some(e);
                break;
            }
        }

        if let Some(e) = failure {
            // Rollback: unlink the candidate everywhere, restore the
            // replaced record. None of this can fail: removal of a
            // never-linked record is a no-op and the old record was
            // valid in every index a moment ago.
            for index in self.indexes_mut() {
                index.remove(&candidate);
                if let Some(old) = &existing {
                    index.remove(old);
                    let _ = index.add(old);
                }
            }
            return Err(e);
        }

        Ok(candidate)
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Remove the record whose primary key matches `doc`'s. Returns the
    /// removed record so the caller can log a tombstone for it.
    pub fn delete(&mut self, doc: &Document) -> Result<SharedDocument> {
        let not_exists = || Error::NotExists {
            record: Arc::new(doc.clone()),
        };
        let pk = doc.get(&self.primary_field).ok_or_else(not_exists)?;
        let existing = self.primary.find_one(pk).ok_or_else(not_exists)?;

        for index in self.indexes_mut() {
            index.remove(&existing);
        }
        Ok(existing)
    }

    // -----------------------------------------------------------------------
    // Index lifecycle
    // -----------------------------------------------------------------------

    /// Install an index and back-fill it from the live records.
    ///
    /// Returns `false` (and changes nothing) when an identical index is
    /// already installed. A differing descriptor on the same field
    /// rebuilds off to the side and swaps in only after a successful
    /// back-fill, so a `KeyViolation` leaves the old index untouched.
    pub fn ensure_index(&mut self, spec: IndexSpec) -> Result<bool> {
        if spec.field_name == self.primary_field {
            return Ok(false);
        }
        if let Some(existing) = self.secondary.get(&spec.field_name) {
            if *existing.spec() == spec {
                return Ok(false);
            }
        }

        let mut index = Index::new(spec);
        for record in self.primary.documents() {
            index.add(&record)?;
        }
        self.secondary
            .insert(index.spec().field_name.clone(), index);
        Ok(true)
    }

    /// Detach a secondary index. Returns `false` for the primary index
    /// (which refuses removal), `NoIndex` for an unknown field.
    pub fn remove_index(&mut self, field: &str) -> Result<bool> {
        if field == self.primary_field {
            return Ok(false);
        }
        self.secondary
            .remove(field)
            .map(|_| true)
            .ok_or_else(|| Error::NoIndex {
                field: field.to_string(),
            })
    }

    /// Replay-mode index removal: absence is not an error.
    pub fn remove_index_replayed(&mut self, field: &str) {
        if field != self.primary_field {
            self.secondary.remove(field);
        }
    }

    // -----------------------------------------------------------------------
    // Key generation
    // -----------------------------------------------------------------------

    /// Deterministically generate a free primary key for a document:
    /// hash its canonical serialization, probe `(hash + n) mod 2^31`
    /// for the smallest free slot, encode base-36.
    fn generate_key(&self, doc: &Document) -> Result<String> {
        let hash = document::string_hash(&document::canonical(doc)?);
        for probe in 0..KEY_PROBE_BUDGET {
            let key = document::key_for_slot(hash, probe);
            if self.primary.find_one(&Value::String(key.clone())).is_none() {
                return Ok(key);
            }
        }
        Err(Error::KeySpaceExhausted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
