//! Local document store.
//!
//! Keeps both collections in memory behind one lock and, when rooted at a
//! directory, persists them as JSON after every write.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── .lock            # exclusive advisory lock held while open
//! ├── posts.json        # { "<post_id>": { ...document... }, ... }
//! └── comments.json     # { "<comment_id>": { ...document... }, ... }
//! ```
//!
//! Each batch is applied while holding the lock, so `max` and `add_to_set`
//! stay atomic for concurrent runs sharing one store instance.
//!
//! Files are read once at open and rewritten whole after each write, so two
//! processes cannot share a directory. `open` takes an exclusive lock on
//! `{root}/.lock` and fails when another process holds it. Concurrent
//! scheduled runs need the `mongo` backend.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{BulkWriteSummary, Document, FieldValue, Listing, UpsertOp, UpsertOutcome};
use crate::storage::{Collection, DocumentStore};

type DocumentMap = BTreeMap<String, Document>;

#[derive(Debug, Default)]
struct Collections {
    posts: DocumentMap,
    comments: DocumentMap,
}

impl Collections {
    fn get_mut(&mut self, collection: Collection) -> &mut DocumentMap {
        match collection {
            Collection::Posts => &mut self.posts,
            Collection::Comments => &mut self.comments,
        }
    }

    fn get(&self, collection: Collection) -> &DocumentMap {
        match collection {
            Collection::Posts => &self.posts,
            Collection::Comments => &self.comments,
        }
    }
}

/// Local document store backend.
#[derive(Clone)]
pub struct LocalStore {
    root_dir: Option<PathBuf>,
    collections: Arc<Mutex<Collections>>,
    /// Released when the last clone is dropped
    _lock: Option<Arc<File>>,
}

impl LocalStore {
    /// Create a store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            root_dir: None,
            collections: Arc::new(Mutex::new(Collections::default())),
            _lock: None,
        }
    }

    /// Open a store rooted at the given directory, loading existing files.
    ///
    /// Fails if another process already has the directory open.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await?;
        let lock = Self::lock_dir(&root_dir)?;

        let store = Self {
            root_dir: Some(root_dir),
            collections: Arc::new(Mutex::new(Collections::default())),
            _lock: Some(Arc::new(lock)),
        };

        let posts: DocumentMap = store.read_json(Collection::Posts).await?.unwrap_or_default();
        let comments: DocumentMap = store
            .read_json(Collection::Comments)
            .await?
            .unwrap_or_default();
        log::info!(
            "Local store opened: {} posts, {} comments",
            posts.len(),
            comments.len()
        );

        {
            let mut guard = store.collections.lock().await;
            guard.posts = posts;
            guard.comments = comments;
        }
        Ok(store)
    }

    /// Take the exclusive lock on `{root}/.lock` without waiting.
    fn lock_dir(root: &Path) -> Result<File> {
        let path = root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(AppError::store(
                format!("{} is locked by another process", path.display()),
            )),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: Collection) -> usize {
        self.collections.lock().await.get(collection).len()
    }

    /// Get the full path for a collection file.
    fn path(root: &Path, collection: Collection) -> PathBuf {
        root.join(format!("{}.json", collection.name()))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Persist one collection if this store is file-backed.
    async fn write_json<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        value: &T,
    ) -> Result<()> {
        let Some(root) = &self.root_dir else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(value)?;
        Self::write_bytes(&Self::path(root, collection), &bytes).await
    }

    /// Read a collection file, returning None if it doesn't exist.
    async fn read_json<T: DeserializeOwned>(&self, collection: Collection) -> Result<Option<T>> {
        let Some(root) = &self.root_dir else {
            return Ok(None);
        };
        match tokio::fs::read(Self::path(root, collection)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

fn engagement(doc: &Document, field: &str) -> FieldValue {
    doc.get(field).cloned().unwrap_or(FieldValue::Null)
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn upsert(&self, collection: Collection, op: &UpsertOp) -> Result<UpsertOutcome> {
        let mut guard = self.collections.lock().await;
        let docs = guard.get_mut(collection);
        let outcome = op.apply(docs)?;
        self.write_json(collection, &*docs).await?;
        Ok(outcome)
    }

    async fn bulk_upsert(
        &self,
        collection: Collection,
        ops: &[UpsertOp],
    ) -> Result<BulkWriteSummary> {
        let mut guard = self.collections.lock().await;
        let docs = guard.get_mut(collection);

        // Unordered: a failing instruction does not stop the rest.
        let mut summary = BulkWriteSummary::default();
        let mut failures = 0usize;
        for op in ops {
            match op.apply(docs) {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    failures += 1;
                    log::warn!("{} write failed for {}: {}", collection, op.id, e);
                }
            }
        }

        self.write_json(collection, &*docs).await?;

        if failures > 0 {
            return Err(AppError::store(format!(
                "{} of {} writes to {} failed",
                failures,
                ops.len(),
                collection
            )));
        }
        Ok(summary)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        log::debug!("Local store is keyed by identity; no secondary indexes to build");
        Ok(())
    }

    async fn top_post_ids(
        &self,
        subreddit: &str,
        seen_in: Listing,
        limit: usize,
    ) -> Result<Vec<String>> {
        let guard = self.collections.lock().await;
        let label = FieldValue::Str(seen_in.as_str().to_string());

        let mut candidates: Vec<(&String, &Document)> = guard
            .posts
            .iter()
            .filter(|(_, doc)| doc.get("subreddit").and_then(FieldValue::as_str) == Some(subreddit))
            .filter(|(_, doc)| doc.get("seen_in").is_some_and(|s| s.contains(&label)))
            .collect();

        candidates.sort_by(|(_, a), (_, b)| {
            let by_score = engagement(b, "score_max")
                .compare(&engagement(a, "score_max"))
                .unwrap_or(Ordering::Equal);
            by_score.then_with(|| {
                engagement(b, "num_comments_max")
                    .compare(&engagement(a, "num_comments_max"))
                    .unwrap_or(Ordering::Equal)
            })
        });

        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let guard = self.collections.lock().await;
        Ok(guard.get(collection).get(id).cloned())
    }
}
