// src/models/mod.rs

//! Domain models for the collector.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod comment;
mod config;
mod document;
mod listing;
mod post;
mod tier;

// Re-export all public types
pub use comment::CommentCandidate;
pub use config::{CollectorConfig, Config, RedditConfig, StorageBackend, StorageConfig};
pub use document::{
    BulkWriteSummary, Document, FieldValue, Fields, ID_FIELD, UpsertOp, UpsertOutcome,
};
pub use listing::{CommentSort, Listing, TimeFilter};
pub use post::PostCandidate;
pub use tier::{ListingLimits, Tier};
