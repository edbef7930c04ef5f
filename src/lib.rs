// src/lib.rs

//! Forum trend collector library.
//!
//! Streams posts and comments from curated communities and reconciles every
//! sighting into a document store with idempotent merge upserts.

pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod services;
pub mod storage;
pub mod utils;
