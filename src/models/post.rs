//! Post candidate as produced by a listing pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Listing, TimeFilter};

/// One sighting of a forum post, normalized but not yet validated.
///
/// Every field is optional so loosely-typed upstream payloads deserialize;
/// the upsert builder decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCandidate {
    pub post_id: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub upvote_ratio: Option<f64>,
    pub num_comments: Option<i64>,
    pub permalink: Option<String>,
    pub created_utc: Option<i64>,
    pub ingested_at: Option<DateTime<Utc>>,
    /// Listing that produced this sighting
    pub listing: Option<Listing>,
    /// Top-N window, only set for the `top` listing
    pub time_filter: Option<TimeFilter>,
}

impl PostCandidate {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        format!(
            "{} (r/{})",
            self.post_id.as_deref().unwrap_or("?"),
            self.subreddit.as_deref().unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_sparse_json() {
        let json = r#"{"post_id": "abc123", "score": 7, "listing": "hot"}"#;
        let post: PostCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(post.post_id.as_deref(), Some("abc123"));
        assert_eq!(post.score, Some(7));
        assert_eq!(post.listing, Some(Listing::Hot));
        assert!(post.upvote_ratio.is_none());
        assert!(post.time_filter.is_none());
    }

    #[test]
    fn test_label() {
        let post = PostCandidate {
            post_id: Some("x1".into()),
            subreddit: Some("rust".into()),
            ..Default::default()
        };
        assert_eq!(post.label(), "x1 (r/rust)");
    }
}
