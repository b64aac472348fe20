//! The public database façade.
//!
//! A [`Database`] is a cheap handle onto a single worker that owns the
//! in-memory store, the journal, and the lock file. Every method
//! enqueues one task on the FIFO gate, so mutations and reads never
//! interleave and each operation's journal append happens after its
//! in-memory commit and before its future resolves.

use crate::serializer::Serializer;
use jotfile_core::{Document, Options, Result, SharedDocument};
use jotfile_storage::journal::Entry;
use jotfile_storage::{CompactionSort, IndexSpec, Journal, LockFile, Store, UpsertMode};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};

/// Worker-owned state: the store, the journal, and the lock (held for
/// the worker's lifetime, released when the database is closed).
struct Core {
    store: Store,
    journal: Journal,
    _lock: LockFile,
}

impl Core {
    /// The `load` bootstrap: lock acquisition, hydrate, then an initial
    /// compaction. Runs before any user operation.
    fn bootstrap(path: PathBuf, options: Options) -> Result<Self> {
        let lock = LockFile::acquire(&path)?;
        let mut store = Store::new(&options.primary_field);
        let mut journal = Journal::open(&path, &options)?;
        journal.hydrate(&mut store)?;
        journal.rewrite(&store, &CompactionSort::Unsorted)?;
        tracing::info!(
            "database opened: {} records, {} secondary indexes recovered from {}",
            store.len(),
            store.index_specs().len(),
            path.display()
        );
        Ok(Self {
            store,
            journal,
            _lock: lock,
        })
    }

    fn apply(&mut self, doc: Document, mode: UpsertMode) -> Result<SharedDocument> {
        let stored = self.store.upsert(doc, mode)?;
        self.journal.append(&[Entry::Doc(&stored)])?;
        Ok(stored)
    }

    /// Sequential batch. Stops at the first failure; earlier records
    /// stay committed in memory and on disk.
    fn apply_many(&mut self, docs: Vec<Document>, mode: UpsertMode) -> Result<Vec<SharedDocument>> {
        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs {
            stored.push(self.apply(doc, mode)?);
        }
        Ok(stored)
    }

    fn remove(&mut self, doc: &Document) -> Result<SharedDocument> {
        let removed = self.store.delete(doc)?;
        self.journal.append(&[Entry::Deleted(&removed)])?;
        Ok(removed)
    }
}

/// An embedded, file-backed JSON document store.
pub struct Database {
    serializer: Serializer<Core>,
    worker: Mutex<Option<JoinHandle<()>>>,
    load_started: AtomicBool,
    autocompact: Mutex<Option<JoinHandle<()>>>,
    options: Options,
    path: PathBuf,
}

impl Database {
    /// Create a handle. No I/O happens until [`Database::load`]; the
    /// operation queue stays paused and buffers submissions until then.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(path: impl Into<PathBuf>, options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.into();
        let (serializer, worker) = Serializer::spawn({
            let (path, options) = (path.clone(), options.clone());
            move || Core::bootstrap(path, options)
        });
        Ok(Self {
            serializer,
            worker: Mutex::new(Some(worker)),
            load_started: AtomicBool::new(false),
            autocompact: Mutex::new(None),
            options,
            path,
        })
    }

    /// Create and load in one step.
    pub async fn open(path: impl Into<PathBuf>, options: Options) -> Result<Self> {
        let db = Self::new(path, options)?;
        db.load().await?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, replay the journal, compact, unpause the
    /// queue. Happens-before every user operation. Calling it again
    /// just waits for the queue to drain.
    pub async fn load(&self) -> Result<()> {
        if self.load_started.swap(true, Ordering::SeqCst) {
            return self.serializer.wait().await;
        }
        self.serializer.load().await
    }

    /// Rebuild the in-memory state from the file, then compact.
    pub async fn reload(&self) -> Result<()> {
        let primary_field = self.options.primary_field.clone();
        self.serializer
            .run(move |core| {
                let mut store = Store::new(&primary_field);
                core.journal.hydrate(&mut store)?;
                core.journal.rewrite(&store, &CompactionSort::Unsorted)?;
                core.store = store;
                Ok(())
            })
            .await
    }

    /// Rewrite the journal as its minimal canonical form.
    pub async fn compact(&self) -> Result<()> {
        self.compact_sorted(CompactionSort::Unsorted).await
    }

    /// Compact with a chosen record order.
    pub async fn compact_sorted(&self, sort: CompactionSort) -> Result<()> {
        self.serializer
            .run(move |core| core.journal.rewrite(&core.store, &sort))
            .await
    }

    /// Install a secondary index, back-filled from the live records.
    /// Idempotent for an identical descriptor.
    pub async fn ensure_index(&self, spec: IndexSpec) -> Result<()> {
        self.serializer
            .run(move |core| {
                if core.store.ensure_index(spec.clone())? {
                    core.journal.append(&[Entry::AddIndex(&spec)])?;
                }
                Ok(())
            })
            .await
    }

    /// Remove a secondary index. `NoIndex` if it does not exist; the
    /// primary index is silently kept.
    pub async fn delete_index(&self, field: impl Into<String>) -> Result<()> {
        let field = field.into();
        self.serializer
            .run(move |core| {
                if core.store.remove_index(&field)? {
                    core.journal.append(&[Entry::RemoveIndex(&field)])?;
                }
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert a new record. `KeyViolation` if its primary key exists.
    pub async fn insert(&self, doc: Document) -> Result<SharedDocument> {
        self.apply_one(doc, UpsertMode::Insert).await
    }

    /// Replace an existing record. `NotExists` if its primary key does
    /// not.
    pub async fn update(&self, doc: Document) -> Result<SharedDocument> {
        self.apply_one(doc, UpsertMode::Update).await
    }

    /// Insert or replace.
    pub async fn upsert(&self, doc: Document) -> Result<SharedDocument> {
        self.apply_one(doc, UpsertMode::Upsert).await
    }

    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<SharedDocument>> {
        self.apply_batch(docs, UpsertMode::Insert).await
    }

    pub async fn update_many(&self, docs: Vec<Document>) -> Result<Vec<SharedDocument>> {
        self.apply_batch(docs, UpsertMode::Update).await
    }

    pub async fn upsert_many(&self, docs: Vec<Document>) -> Result<Vec<SharedDocument>> {
        self.apply_batch(docs, UpsertMode::Upsert).await
    }

    /// Delete the record matching `doc`'s primary key. Returns the
    /// removed record.
    pub async fn delete(&self, doc: Document) -> Result<SharedDocument> {
        self.serializer.run(move |core| core.remove(&doc)).await
    }

    pub async fn delete_many(&self, docs: Vec<Document>) -> Result<Vec<SharedDocument>> {
        self.serializer
            .run(move |core| {
                let mut removed = Vec::with_capacity(docs.len());
                for doc in &docs {
                    removed.push(core.remove(doc)?);
                }
                Ok(removed)
            })
            .await
    }

    async fn apply_one(&self, doc: Document, mode: UpsertMode) -> Result<SharedDocument> {
        self.serializer.run(move |core| core.apply(doc, mode)).await
    }

    async fn apply_batch(
        &self,
        docs: Vec<Document>,
        mode: UpsertMode,
    ) -> Result<Vec<SharedDocument>> {
        self.serializer
            .run(move |core| core.apply_many(docs, mode))
            .await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every live record.
    pub async fn get_all(&self) -> Result<Vec<SharedDocument>> {
        self.serializer.run(|core| Ok(core.store.get_all())).await
    }

    /// All records whose value at `field` equals `value`. The field
    /// must be indexed.
    pub async fn find(&self, field: impl Into<String>, value: Value) -> Result<Vec<SharedDocument>> {
        let field = field.into();
        self.serializer
            .run(move |core| core.store.find(&field, &value))
            .await
    }

    /// One matching record, if any. The field must be indexed.
    pub async fn find_one(
        &self,
        field: impl Into<String>,
        value: Value,
    ) -> Result<Option<SharedDocument>> {
        let field = field.into();
        self.serializer
            .run(move |core| core.store.find_one(&field, &value))
            .await
    }

    /// Wait until every previously submitted operation has completed.
    pub async fn wait(&self) -> Result<()> {
        self.serializer.wait().await
    }

    // -----------------------------------------------------------------------
    // Auto-compaction
    // -----------------------------------------------------------------------

    /// Submit a compaction every `every`, with the given record order.
    /// Replaces any earlier schedule. Tick failures are logged and do
    /// not corrupt state; ticks queued behind a slow queue are not
    /// coalesced.
    pub fn set_auto_compaction(&self, every: Duration, sort: CompactionSort) {
        let serializer = self.serializer.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let sort = sort.clone();
                let outcome = serializer
                    .run(move |core| core.journal.rewrite(&core.store, &sort))
                    .await;
                if let Err(e) = outcome {
                    tracing::warn!("auto-compaction failed: {e}");
                }
            }
        });
        let mut slot = lock_slot(&self.autocompact);
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Cancel the periodic compaction, if one is scheduled.
    pub fn stop_auto_compaction(&self) {
        let mut slot = lock_slot(&self.autocompact);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Drain the queue and shut the worker down, releasing the lock
    /// file deterministically. Dropping a `Database` releases it too,
    /// but asynchronously.
    pub async fn close(self) -> Result<()> {
        self.stop_auto_compaction();
        let worker = lock_slot(&self.worker).take();
        drop(self);
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.stop_auto_compaction();
    }
}

fn lock_slot<'a>(
    slot: &'a Mutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'a, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
