//! Merge-operation builder.
//!
//! Turns one candidate sighting into an [`UpsertOp`]. Building has no side
//! effects; a malformed candidate yields [`AppError::MalformedRecord`] so the
//! caller can drop it and keep going.

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{CommentCandidate, FieldValue, PostCandidate, UpsertOp};

/// A candidate record that can be reconciled into a collection.
pub trait Reconcilable {
    /// Entity kind used in logs and errors.
    const KIND: &'static str;

    /// Upstream identity, if the candidate carries one.
    fn identity(&self) -> Option<&str>;

    /// Build the merge instruction for this sighting.
    ///
    /// `now` is captured once per record at build time and used for every
    /// timestamp the instruction carries.
    fn build_upsert(&self, now: DateTime<Utc>) -> Result<UpsertOp>;

    /// Short label for log lines.
    fn describe(&self) -> String;
}

/// Identity must be present and non-blank.
fn required<'a>(kind: &'static str, field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::malformed(kind, format!("missing {}", field))),
    }
}

fn text(value: &Option<String>) -> FieldValue {
    FieldValue::Str(value.clone().unwrap_or_default())
}

impl Reconcilable for PostCandidate {
    const KIND: &'static str = "post";

    fn identity(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    fn build_upsert(&self, now: DateTime<Utc>) -> Result<UpsertOp> {
        let id = required(Self::KIND, "post_id", self.identity())?;

        let upvote_ratio = self.upvote_ratio.unwrap_or(0.0);
        if !upvote_ratio.is_finite() {
            return Err(AppError::malformed(
                Self::KIND,
                format!("upvote_ratio is not finite for {}", id),
            ));
        }
        let score = self.score.unwrap_or(0);
        let num_comments = self.num_comments.unwrap_or(0);

        let mut op = UpsertOp::new(id);
        op.set_on_insert = vec![
            ("post_id", id.into()),
            ("subreddit", text(&self.subreddit)),
            ("created_utc", self.created_utc.unwrap_or(0).into()),
            ("permalink", text(&self.permalink)),
            ("first_seen_at", now.into()),
            ("time_filter", self.time_filter.map(|t| t.as_str()).into()),
        ];
        op.set = vec![
            ("title", text(&self.title)),
            ("selftext", text(&self.selftext)),
            ("author", self.author.clone().into()),
            ("score", score.into()),
            ("upvote_ratio", upvote_ratio.into()),
            ("num_comments", num_comments.into()),
            ("ingested_at", self.ingested_at.unwrap_or(now).into()),
            ("last_seen_at", now.into()),
            ("listing", self.listing.map(|l| l.as_str()).into()),
        ];
        op.max = vec![
            ("score_max", score.into()),
            ("num_comments_max", num_comments.into()),
        ];
        if let Some(listing) = self.listing {
            op.add_to_set = vec![("seen_in", listing.as_str().into())];
        }
        Ok(op)
    }

    fn describe(&self) -> String {
        self.label()
    }
}

impl Reconcilable for CommentCandidate {
    const KIND: &'static str = "comment";

    fn identity(&self) -> Option<&str> {
        self.comment_id.as_deref()
    }

    fn build_upsert(&self, now: DateTime<Utc>) -> Result<UpsertOp> {
        let id = required(Self::KIND, "comment_id", self.identity())?;
        let post_id = required(Self::KIND, "post_id", self.post_id.as_deref())?;

        let is_top_level = self.is_top_level.unwrap_or_else(|| {
            self.parent_id
                .as_deref()
                .is_some_and(|p| p.starts_with("t3_"))
        });

        // Comments carry no aggregates: every sighting overwrites the record.
        let mut op = UpsertOp::new(id);
        op.set = vec![
            ("comment_id", id.into()),
            ("post_id", post_id.into()),
            ("subreddit", text(&self.subreddit)),
            ("author", self.author.clone().into()),
            ("body", text(&self.body)),
            ("score", self.score.unwrap_or(0).into()),
            ("is_top_level", is_top_level.into()),
            ("permalink", text(&self.permalink)),
            ("created_utc", self.created_utc.unwrap_or(0).into()),
            ("parent_id", self.parent_id.clone().into()),
            ("ingested_at", self.ingested_at.unwrap_or(now).into()),
            ("sort", self.sort.map(|s| s.as_str()).into()),
        ];
        Ok(op)
    }

    fn describe(&self) -> String {
        self.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentSort, Listing, TimeFilter};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn field<'a>(fields: &'a [(&'static str, FieldValue)], name: &str) -> Option<&'a FieldValue> {
        fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    #[test]
    fn test_post_groups() {
        let post = PostCandidate {
            post_id: Some("abc123".into()),
            subreddit: Some("artificial".into()),
            score: Some(42),
            num_comments: Some(7),
            created_utc: Some(1_700_000_000),
            listing: Some(Listing::Top),
            time_filter: Some(TimeFilter::Day),
            ..Default::default()
        };
        let op = post.build_upsert(at(100)).unwrap();

        assert_eq!(op.id, "abc123");
        assert_eq!(
            field(&op.set_on_insert, "first_seen_at"),
            Some(&FieldValue::Time(at(100)))
        );
        assert_eq!(
            field(&op.set_on_insert, "time_filter"),
            Some(&FieldValue::Str("day".into()))
        );
        assert_eq!(field(&op.set, "score"), Some(&FieldValue::Int(42)));
        assert_eq!(field(&op.max, "score_max"), Some(&FieldValue::Int(42)));
        assert_eq!(
            field(&op.max, "num_comments_max"),
            Some(&FieldValue::Int(7))
        );
        assert_eq!(op.add_to_set, vec![("seen_in", FieldValue::Str("top".into()))]);
    }

    #[test]
    fn test_post_defaults() {
        let post = PostCandidate {
            post_id: Some("p1".into()),
            ..Default::default()
        };
        let op = post.build_upsert(at(5)).unwrap();

        assert_eq!(field(&op.set, "score"), Some(&FieldValue::Int(0)));
        assert_eq!(field(&op.set, "upvote_ratio"), Some(&FieldValue::Float(0.0)));
        assert_eq!(field(&op.set, "num_comments"), Some(&FieldValue::Int(0)));
        assert_eq!(field(&op.set, "ingested_at"), Some(&FieldValue::Time(at(5))));
        assert_eq!(field(&op.set, "listing"), Some(&FieldValue::Null));
        assert!(op.add_to_set.is_empty());
    }

    #[test]
    fn test_post_without_identity_is_rejected() {
        for id in [None, Some("".to_string()), Some("   ".to_string())] {
            let post = PostCandidate {
                post_id: id,
                score: Some(1),
                ..Default::default()
            };
            let err = post.build_upsert(at(0)).unwrap_err();
            assert!(matches!(err, AppError::MalformedRecord { kind: "post", .. }));
        }
    }

    #[test]
    fn test_post_non_finite_ratio_is_rejected() {
        let post = PostCandidate {
            post_id: Some("p1".into()),
            upvote_ratio: Some(f64::NAN),
            ..Default::default()
        };
        assert!(post.build_upsert(at(0)).is_err());
    }

    #[test]
    fn test_comment_overwrites_everything() {
        let comment = CommentCandidate {
            comment_id: Some("c1".into()),
            post_id: Some("abc123".into()),
            parent_id: Some("t3_abc123".into()),
            score: Some(3),
            sort: Some(CommentSort::Hot),
            ..Default::default()
        };
        let op = comment.build_upsert(at(9)).unwrap();

        assert!(op.set_on_insert.is_empty());
        assert!(op.max.is_empty());
        assert!(op.add_to_set.is_empty());
        assert_eq!(field(&op.set, "is_top_level"), Some(&FieldValue::Bool(true)));
        assert_eq!(field(&op.set, "sort"), Some(&FieldValue::Str("hot".into())));
    }

    #[test]
    fn test_comment_requires_post() {
        let comment = CommentCandidate {
            comment_id: Some("c1".into()),
            ..Default::default()
        };
        assert!(comment.build_upsert(at(0)).is_err());
    }

    #[test]
    fn test_explicit_top_level_flag_wins() {
        let comment = CommentCandidate {
            comment_id: Some("c2".into()),
            post_id: Some("p".into()),
            parent_id: Some("t1_c1".into()),
            is_top_level: Some(true),
            ..Default::default()
        };
        let op = comment.build_upsert(at(0)).unwrap();
        assert_eq!(field(&op.set, "is_top_level"), Some(&FieldValue::Bool(true)));
    }
}
