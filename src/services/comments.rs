// src/services/comments.rs

//! Comment collector service.

use std::sync::Mutex;

use async_stream::stream;
use chrono::Utc;
use futures::Stream;

use crate::models::{CommentCandidate, CommentSort};
use crate::utils::permalink;

use super::api::{ForumApi, RawComment};
use super::filters::{FetchStats, FilterOptions, SkipReason, is_bot, is_englishish, is_tombstone};

/// What to take from one post's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentQuery {
    pub sort: CommentSort,
    /// Comments scanned at most
    pub cap: usize,
    /// Comments yielded at most
    pub limit: usize,
    /// Only direct replies to the post; otherwise every loaded level
    pub top_level_only: bool,
}

impl Default for CommentQuery {
    fn default() -> Self {
        Self {
            sort: CommentSort::New,
            cap: 500,
            limit: 100,
            top_level_only: true,
        }
    }
}

/// Streams comment candidates from a [`ForumApi`].
pub struct CommentCollector<'a> {
    api: &'a dyn ForumApi,
    options: FilterOptions,
    stats: Mutex<FetchStats>,
}

impl<'a> CommentCollector<'a> {
    pub fn new(api: &'a dyn ForumApi, options: FilterOptions) -> Self {
        Self {
            api,
            options,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Totals over every thread streamed so far.
    pub fn stats(&self) -> FetchStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn record(&self, pass: &FetchStats) {
        if let Ok(mut total) = self.stats.lock() {
            total.merge(pass);
        }
    }

    fn check(&self, comment: &RawComment) -> Result<(), SkipReason> {
        let Some(author) = comment.author.as_deref() else {
            return Err(SkipReason::Removed);
        };
        let body = comment.body.as_deref().unwrap_or_default();
        if is_tombstone(author) || is_tombstone(body) {
            return Err(SkipReason::Removed);
        }
        if self.options.skip_bots && is_bot(author, true) {
            return Err(SkipReason::Bot);
        }
        if self.options.english_only && !is_englishish(body) {
            return Err(SkipReason::Language);
        }
        Ok(())
    }

    fn normalize(
        comment: &RawComment,
        post_id: &str,
        subreddit: &str,
        sort: CommentSort,
    ) -> CommentCandidate {
        CommentCandidate {
            comment_id: Some(comment.id.clone()),
            post_id: Some(post_id.to_string()),
            subreddit: Some(subreddit.to_string()),
            author: comment.author.clone(),
            body: Some(comment.body.clone().unwrap_or_default()),
            score: Some(comment.score.unwrap_or(0)),
            is_top_level: Some(comment.is_top_level()),
            permalink: Some(permalink(comment.permalink.as_deref().unwrap_or_default())),
            created_utc: Some(comment.created_utc.unwrap_or(0.0) as i64),
            parent_id: comment.parent_id.clone(),
            ingested_at: Some(Utc::now()),
            sort: Some(sort),
        }
    }

    /// Stream candidates from one post's thread.
    ///
    /// A failed thread fetch is logged and yields nothing.
    pub fn stream<'s>(
        &'s self,
        post_id: &'s str,
        query: CommentQuery,
    ) -> impl Stream<Item = CommentCandidate> + Send + 's
    where
        'a: 's,
    {
        stream! {
            let thread = match self.api.fetch_comments(post_id, query.sort).await {
                Ok(thread) => thread,
                Err(e) => {
                    log::error!("Failed to fetch comments for post {}: {}", post_id, e);
                    return;
                }
            };
            let subreddit = thread.subreddit.clone().unwrap_or_default();
            log::info!(
                "Fetching comments for post {} | subreddit={} | sort={} | cap={} | limit={} | top_level_only={}",
                post_id, subreddit, query.sort, query.cap, query.limit, query.top_level_only
            );

            let pool: Vec<RawComment> = if query.top_level_only {
                thread.top_level().into_iter().take(query.cap).cloned().collect()
            } else {
                thread.flatten().into_iter().take(query.cap).cloned().collect()
            };

            let mut stats = FetchStats::default();
            stats.skip_malformed(thread.malformed(query.top_level_only));
            let mut samples_left = self.options.debug_samples;

            for comment in pool {
                if stats.yielded >= query.limit as u64 {
                    break;
                }
                stats.seen += 1;

                if let Err(reason) = self.check(&comment) {
                    stats.skip(reason);
                    continue;
                }

                let candidate = Self::normalize(&comment, post_id, &subreddit, query.sort);
                if samples_left > 0 {
                    samples_left -= 1;
                    let body = candidate.body.as_deref().unwrap_or_default();
                    let sample: String = body.chars().take(200).collect();
                    log::debug!("Sample comment: {}", sample.replace('\n', " "));
                }
                yield candidate;
                stats.yielded += 1;

                if self.options.pace_due(stats.seen) {
                    tokio::time::sleep(self.options.pace_delay).await;
                }
            }

            log::info!("Finished post {} (r/{}) | {}", post_id, subreddit, stats);
            self.record(&stats);
        }
    }
}
