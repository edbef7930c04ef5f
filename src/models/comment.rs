//! Comment candidate as produced by a comment-tree pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CommentSort;

/// One sighting of a comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentCandidate {
    pub comment_id: Option<String>,
    pub post_id: Option<String>,
    pub subreddit: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: Option<i64>,
    pub is_top_level: Option<bool>,
    pub permalink: Option<String>,
    pub created_utc: Option<i64>,
    pub parent_id: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
    /// Comment ordering that produced this sighting
    pub sort: Option<CommentSort>,
}

impl CommentCandidate {
    pub fn label(&self) -> String {
        format!(
            "{} on {}",
            self.comment_id.as_deref().unwrap_or("?"),
            self.post_id.as_deref().unwrap_or("?")
        )
    }
}
