//! Collection store abstractions.
//!
//! Two logical collections, `posts` and `comments`, keyed by the upstream
//! identity. Every backend must apply an [`UpsertOp`]'s groups atomically
//! per document:
//!
//! ```text
//! set_on_insert  -> only when the identity is new
//! set            -> always
//! max            -> max(current, new), never read-modify-write
//! add_to_set     -> array union
//! ```
//!
//! Backends:
//! - [`LocalStore`]: in-process documents, optionally persisted as JSON files
//! - `MongoStore`: MongoDB (feature `mongo`)

pub mod local;
#[cfg(feature = "mongo")]
pub mod mongo;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BulkWriteSummary, Document, Listing, StorageBackend, StorageConfig, UpsertOp, UpsertOutcome,
};

// Re-export for convenience
pub use local::LocalStore;
#[cfg(feature = "mongo")]
pub use mongo::MongoStore;

/// Logical collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Posts,
    Comments,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Comments => "comments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for collection store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Apply one instruction.
    async fn upsert(&self, collection: Collection, op: &UpsertOp) -> Result<UpsertOutcome>;

    /// Apply a batch as one unordered submission.
    ///
    /// Either the whole submission succeeds with aggregate counts or the
    /// call fails; no per-instruction status is reported.
    async fn bulk_upsert(
        &self,
        collection: Collection,
        ops: &[UpsertOp],
    ) -> Result<BulkWriteSummary>;

    /// Create the identity and scan indexes.
    async fn ensure_indexes(&self) -> Result<()>;

    /// Post ids of a community seen under `seen_in`, most engaged first.
    async fn top_post_ids(
        &self,
        subreddit: &str,
        seen_in: Listing,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Fetch a stored document by identity.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>>;
}

/// Open the store selected by configuration.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    log::info!("Storage: {:?}", config.backend);

    match config.backend {
        StorageBackend::Local => {
            let store = LocalStore::open(&config.path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "mongo")]
        StorageBackend::Mongo => {
            let store = MongoStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongo"))]
        StorageBackend::Mongo => {
            log::error!("MongoDB storage requested but 'mongo' feature is not enabled");
            Err(crate::error::AppError::config(
                "MongoDB feature not enabled",
            ))
        }
    }
}
