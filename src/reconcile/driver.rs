//! Batch/retry driver.
//!
//! Drains a candidate stream into fixed-size batches and submits each one as
//! an unordered bulk upsert. Per batch:
//!
//! ```text
//! accumulating -> submitting -> committed
//!                     |
//!                     +-> retrying -> committed
//!                                  -> dropped
//! ```
//!
//! A failed submission is retried exactly once after a fixed backoff. If the
//! retry fails too the batch is dropped and logged; the run continues.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{BulkWriteSummary, CollectorConfig, CommentCandidate, PostCandidate, UpsertOp};
use crate::storage::{Collection, DocumentStore};

use super::Reconcilable;

/// Source of the build-time timestamp stamped on each instruction.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Batching and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    batch_size: usize,
    retry_backoff: Duration,
    write_timeout: Duration,
}

impl ReconcileOptions {
    pub fn new(batch_size: usize, retry_backoff: Duration, write_timeout: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(AppError::config("batch size must be > 0"));
        }
        if write_timeout.is_zero() {
            return Err(AppError::config("write timeout must be > 0"));
        }
        Ok(Self {
            batch_size,
            retry_backoff,
            write_timeout,
        })
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        Self::new(
            config.batch_size,
            config.retry_backoff(),
            config.write_timeout(),
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            retry_backoff: Duration::from_millis(500),
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// Running totals of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    /// Records pulled from the stream
    pub seen: u64,
    /// Records dropped because no instruction could be built
    pub skipped: u64,
    /// Batches committed
    pub batches: u64,
    /// Batches lost after the retry also failed
    pub dropped_batches: u64,
    /// Instructions inside dropped batches
    pub dropped_ops: u64,
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
}

impl UpsertStats {
    fn absorb(&mut self, summary: &BulkWriteSummary) {
        self.batches += 1;
        self.matched += summary.matched;
        self.modified += summary.modified;
        self.upserted += summary.upserted;
    }

    /// Add another pass's totals into this one.
    pub fn merge(&mut self, other: &UpsertStats) {
        self.seen += other.seen;
        self.skipped += other.skipped;
        self.batches += other.batches;
        self.dropped_batches += other.dropped_batches;
        self.dropped_ops += other.dropped_ops;
        self.matched += other.matched;
        self.modified += other.modified;
        self.upserted += other.upserted;
    }
}

impl fmt::Display for UpsertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={} skipped={} batches={} dropped(batches={}, ops={}) matched={} modified={} upserted={}",
            self.seen,
            self.skipped,
            self.batches,
            self.dropped_batches,
            self.dropped_ops,
            self.matched,
            self.modified,
            self.upserted
        )
    }
}

/// Terminal state of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed {
        attempts: u8,
        summary: BulkWriteSummary,
    },
    Dropped {
        size: usize,
    },
}

/// Reconciles candidate streams into a [`DocumentStore`].
pub struct Reconciler<'a> {
    store: &'a dyn DocumentStore,
    options: ReconcileOptions,
    clock: Clock,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn DocumentStore, options: ReconcileOptions) -> Self {
        Self {
            store,
            options,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for build-time timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn upsert_posts<S>(&self, posts: S) -> UpsertStats
    where
        S: Stream<Item = PostCandidate>,
    {
        self.reconcile(Collection::Posts, posts).await
    }

    pub async fn upsert_comments<S>(&self, comments: S) -> UpsertStats
    where
        S: Stream<Item = CommentCandidate>,
    {
        self.reconcile(Collection::Comments, comments).await
    }

    /// Drain `records` into `collection`.
    ///
    /// Never fails: malformed records are skipped and failed batches are
    /// retried once, then dropped. Both are visible in the returned totals.
    pub async fn reconcile<C, S>(&self, collection: Collection, records: S) -> UpsertStats
    where
        C: Reconcilable,
        S: Stream<Item = C>,
    {
        pin_mut!(records);

        let mut stats = UpsertStats::default();
        let mut ops: Vec<UpsertOp> = Vec::with_capacity(self.options.batch_size);

        while let Some(record) = records.next().await {
            stats.seen += 1;
            match record.build_upsert((self.clock)()) {
                Ok(op) => ops.push(op),
                Err(e) => {
                    stats.skipped += 1;
                    log::error!("Invalid {} skipped: {} ({})", C::KIND, record.describe(), e);
                    continue;
                }
            }

            if ops.len() >= self.options.batch_size {
                self.flush(collection, &mut ops, &mut stats).await;
            }
        }
        self.flush(collection, &mut ops, &mut stats).await;

        log::info!("{} upsert complete: {}", collection, stats);
        stats
    }

    async fn flush(&self, collection: Collection, ops: &mut Vec<UpsertOp>, stats: &mut UpsertStats) {
        if ops.is_empty() {
            return;
        }

        match self.submit(collection, ops).await {
            BatchOutcome::Committed { summary, .. } => {
                stats.absorb(&summary);
                log::info!(
                    "{} bulk write: matched={} modified={} upserted={}",
                    collection,
                    summary.matched,
                    summary.modified,
                    summary.upserted
                );
            }
            BatchOutcome::Dropped { size } => {
                stats.dropped_batches += 1;
                stats.dropped_ops += size as u64;
            }
        }
        ops.clear();
    }

    /// Submit one batch with at most one retry.
    pub async fn submit(&self, collection: Collection, ops: &[UpsertOp]) -> BatchOutcome {
        let first_error = match self.attempt(collection, ops).await {
            Ok(summary) => {
                return BatchOutcome::Committed {
                    attempts: 1,
                    summary,
                };
            }
            Err(e) => e,
        };

        log::warn!(
            "{} bulk write failed; retrying once after {:?} (ops={}): {}",
            collection,
            self.options.retry_backoff,
            ops.len(),
            first_error
        );
        tokio::time::sleep(self.options.retry_backoff).await;

        match self.attempt(collection, ops).await {
            Ok(summary) => BatchOutcome::Committed {
                attempts: 2,
                summary,
            },
            Err(e) => {
                log::error!(
                    "{} retry failed; dropping batch (ops={}): {}",
                    collection,
                    ops.len(),
                    e
                );
                BatchOutcome::Dropped { size: ops.len() }
            }
        }
    }

    async fn attempt(&self, collection: Collection, ops: &[UpsertOp]) -> Result<BulkWriteSummary> {
        let deadline = self.options.write_timeout;
        match tokio::time::timeout(deadline, self.store.bulk_upsert(collection, ops)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(deadline)),
        }
    }
}
