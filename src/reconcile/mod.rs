//! Idempotent upsert/aggregation engine.
//!
//! - `builder`: turns one candidate sighting into an [`UpsertOp`](crate::models::UpsertOp)
//! - `driver`: batches instructions into a store with a single retry

pub mod builder;
pub mod driver;

pub use builder::Reconcilable;
pub use driver::{BatchOutcome, Clock, ReconcileOptions, Reconciler, UpsertStats};
