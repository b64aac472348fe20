//! The append-only journal: a newline-delimited JSON file of record
//! operations, replayed on open and rewritten in canonical form during
//! compaction.
//!
//! Four line shapes: a plain record, `{"$$deleted": <record>}`,
//! `{"$$addIndex": <descriptor>}`, `{"$$deleteIndex": {"fieldName": _}}`
//! (sentinel keys per [`Options`]). Appends flush to the OS buffer only;
//! a full fsync happens at compaction, whose temp-file-then-rename is
//! the durability commit point.

use crate::codec;
use crate::index::IndexSpec;
use crate::store::{Store, UpsertMode};
use jotfile_core::document::{value_at, Document};
use jotfile_core::{Error, Options, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One journal operation, borrowed from the caller for encoding.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    /// Live upsert of a record.
    Doc(&'a Document),
    /// Tombstone for the record's primary key.
    Deleted(&'a Document),
    /// Index creation directive.
    AddIndex(&'a IndexSpec),
    /// Index removal directive.
    RemoveIndex(&'a str),
}

#[derive(Debug, Serialize, Deserialize)]
struct RemoveIndexBody {
    #[serde(rename = "fieldName")]
    field_name: String,
}

/// Record ordering for the compacted file.
#[derive(Clone, Default)]
pub enum CompactionSort {
    /// Canonical primary-index order (ascending primary key).
    #[default]
    Unsorted,
    /// Explicitly by primary key.
    PrimaryKey,
    /// By the value at a (possibly dotted) field path.
    Field(String),
    /// Caller-supplied comparator.
    Comparator(Arc<dyn Fn(&Document, &Document) -> Ordering + Send + Sync>),
}

// Manual impl: comparator closures have no Debug.
impl std::fmt::Debug for CompactionSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionSort::Unsorted => f.write_str("Unsorted"),
            CompactionSort::PrimaryKey => f.write_str("PrimaryKey"),
            CompactionSort::Field(name) => write!(f, "Field({name})"),
            CompactionSort::Comparator(_) => f.write_str("Comparator(..)"),
        }
    }
}

/// The append-only journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    options: Options,
}

impl Journal {
    /// Open or create the journal at `path` for append + read.
    pub fn open(path: &Path, options: &Options) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            options: options.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -----------------------------------------------------------------------
    // Append
    // -----------------------------------------------------------------------

    /// Append one or more operations, each on its own line. The whole
    /// batch goes out in a single write.
    pub fn append(&mut self, entries: &[Entry<'_>]) -> Result<()> {
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&self.encode_entry(entry)?);
            buf.push('\n');
        }
        self.file.write_all(buf.as_bytes())?;
        Ok(())
    }

    fn encode_entry(&self, entry: &Entry<'_>) -> Result<String> {
        let envelope = |key: &str, value: Value| {
            let mut map = Document::new();
            map.insert(key.to_string(), value);
            map
        };
        match entry {
            Entry::Doc(doc) => codec::encode(doc),
            Entry::Deleted(doc) => codec::encode(&envelope(
                &self.options.deleted_sentinel,
                Value::Object((*doc).clone()),
            )),
            Entry::AddIndex(spec) => codec::encode(&envelope(
                &self.options.add_index_sentinel,
                serde_json::to_value(spec)?,
            )),
            Entry::RemoveIndex(field) => codec::encode(&envelope(
                &self.options.remove_index_sentinel,
                serde_json::to_value(RemoveIndexBody {
                    field_name: field.to_string(),
                })?,
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Hydrate (replay)
    // -----------------------------------------------------------------------

    /// Replay the journal into `store`, strictly in file order.
    ///
    /// Empty lines are skipped. A final line that fails to decode and is
    /// not newline-terminated is dropped as a crash-truncated tail; any
    /// other malformed line corrupts the whole hydrate.
    pub fn hydrate(&self, store: &mut Store) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let newline_terminated = contents.ends_with('\n');
        let lines: Vec<&str> = contents.split('\n').collect();
        let last_line = lines.iter().rposition(|l| !l.is_empty());

        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let map = match codec::decode(line) {
                Ok(map) => map,
                Err(e) => {
                    if Some(i) == last_line && !newline_terminated {
                        tracing::warn!(
                            "dropping truncated tail line {} of {}",
                            i + 1,
                            self.path.display()
                        );
                        break;
                    }
                    return Err(corrupt(i + 1, e));
                }
            };
            self.dispatch(map, store).map_err(|e| corrupt(i + 1, e))?;
        }
        Ok(())
    }

    fn dispatch(&self, mut map: Document, store: &mut Store) -> Result<()> {
        if let Some(inner) = map.remove(&self.options.deleted_sentinel) {
            let doc: Document = serde_json::from_value(inner)?;
            // The key may be absent if entries were reordered around a
            // compaction; replay never propagates deletion failures.
            let _ = store.delete(&doc);
        } else if let Some(inner) = map.remove(&self.options.add_index_sentinel) {
            let spec: IndexSpec = serde_json::from_value(inner)?;
            store.ensure_index(spec)?;
        } else if let Some(inner) = map.remove(&self.options.remove_index_sentinel) {
            let body: RemoveIndexBody = serde_json::from_value(inner)?;
            store.remove_index_replayed(&body.field_name);
        } else {
            store.upsert(map, UpsertMode::Upsert)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rewrite (compaction)
    // -----------------------------------------------------------------------

    /// Rewrite the journal as the canonical form of `store`: one
    /// `addIndex` line per secondary index (stable order), then one line
    /// per live record. Written to `<path>~`, fsynced, then atomically
    /// renamed over the live file. The rename is the commit point; a
    /// crash before it leaves the original untouched.
    pub fn rewrite(&mut self, store: &Store, sort: &CompactionSort) -> Result<()> {
        let mut docs = store.get_all();
        sort_docs(&mut docs, store.primary_field(), sort);

        let mut buf = String::new();
        for spec in store.index_specs() {
            buf.push_str(&self.encode_entry(&Entry::AddIndex(&spec))?);
            buf.push('\n');
        }
        for doc in &docs {
            buf.push_str(&self.encode_entry(&Entry::Doc(doc))?);
            buf.push('\n');
        }

        let tmp = temp_path(&self.path);
        {
            let mut tmp_file = File::create(&tmp)?;
            tmp_file.write_all(buf.as_bytes())?;
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        // The old append handle points at the replaced inode.
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

fn corrupt(line: usize, e: Error) -> Error {
    match e {
        Error::Json(source) => Error::Corrupt { line, source },
        other => other,
    }
}

/// `<path>~`, the compaction scratch file.
fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push("~");
    os.into()
}

fn sort_docs(docs: &mut [Arc<Document>], primary_field: &str, sort: &CompactionSort) {
    let by_field = |field: &str, a: &Document, b: &Document| {
        let null = Value::Null;
        codec::compare(
            value_at(a, field).unwrap_or(&null),
            value_at(b, field).unwrap_or(&null),
        )
    };
    match sort {
        CompactionSort::Unsorted => {}
        CompactionSort::PrimaryKey => docs.sort_by(|a, b| by_field(primary_field, a, b)),
        CompactionSort::Field(field) => docs.sort_by(|a, b| by_field(field, a, b)),
        CompactionSort::Comparator(cmp) => docs.sort_by(|a, b| cmp(a, b)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
