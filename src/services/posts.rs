// src/services/posts.rs

//! Post collector service.
//!
//! Pages through community listings and yields normalized post candidates
//! lazily, one community after another.

use std::sync::Mutex;

use async_stream::stream;
use chrono::{Duration as ChronoDuration, Utc};
use futures::Stream;

use crate::models::{Listing, PostCandidate, TimeFilter};
use crate::utils::permalink;

use super::api::{ForumApi, RawPost};
use super::filters::{FetchStats, FilterOptions, SkipReason, is_bot, is_englishish, is_tombstone};
use super::reddit::MAX_PAGE;

/// What to fetch from each community.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostQuery {
    pub listing: Listing,
    /// Only sent for [`Listing::Top`]
    pub time_filter: TimeFilter,
    /// Items requested per community
    pub limit: usize,
    /// Posts created before `now - window_days` are skipped
    pub window_days: i64,
}

impl PostQuery {
    fn time_filter(&self) -> Option<TimeFilter> {
        (self.listing == Listing::Top).then_some(self.time_filter)
    }
}

/// Streams post candidates from a [`ForumApi`].
pub struct PostCollector<'a> {
    api: &'a dyn ForumApi,
    options: FilterOptions,
    stats: Mutex<FetchStats>,
}

impl<'a> PostCollector<'a> {
    pub fn new(api: &'a dyn ForumApi, options: FilterOptions) -> Self {
        Self {
            api,
            options,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Totals over every community streamed so far.
    pub fn stats(&self) -> FetchStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn record(&self, pass: &FetchStats) {
        if let Ok(mut total) = self.stats.lock() {
            total.merge(pass);
        }
    }

    /// Decide whether a fetched post is kept.
    fn check(&self, post: &RawPost, cutoff_ts: i64) -> Result<(), SkipReason> {
        let created = post.created_utc.unwrap_or(0.0) as i64;
        if created < cutoff_ts {
            return Err(SkipReason::Old);
        }

        let author = post.author.as_deref().filter(|a| !is_tombstone(a));
        let Some(author) = author else {
            return Err(SkipReason::Removed);
        };
        if post.removed_by_category.is_some() {
            return Err(SkipReason::Removed);
        }
        if self.options.skip_bots && is_bot(author, false) {
            return Err(SkipReason::Bot);
        }
        if !self.options.include_nsfw && post.over_18 {
            return Err(SkipReason::Nsfw);
        }
        if self.options.english_only {
            let text = format!(
                "{} {}",
                post.title.as_deref().unwrap_or_default(),
                post.selftext.as_deref().unwrap_or_default()
            );
            if !is_englishish(&text) {
                return Err(SkipReason::Language);
            }
        }
        Ok(())
    }

    fn normalize(post: RawPost, query: &PostQuery) -> PostCandidate {
        PostCandidate {
            permalink: Some(permalink(post.permalink.as_deref().unwrap_or_default())),
            created_utc: Some(post.created_utc.unwrap_or(0.0) as i64),
            post_id: Some(post.id),
            subreddit: Some(post.subreddit),
            title: Some(post.title.unwrap_or_default()),
            selftext: Some(post.selftext.unwrap_or_default()),
            author: post.author,
            score: Some(post.score.unwrap_or(0)),
            upvote_ratio: Some(post.upvote_ratio.unwrap_or(0.0)),
            num_comments: Some(post.num_comments.unwrap_or(0)),
            ingested_at: Some(Utc::now()),
            listing: Some(query.listing),
            time_filter: query.time_filter(),
        }
    }

    /// Stream candidates for each community in order.
    ///
    /// A failed page ends that community; the next one still runs.
    pub fn stream<'s>(
        &'s self,
        subreddits: &'s [String],
        query: PostQuery,
    ) -> impl Stream<Item = PostCandidate> + Send + 's
    where
        'a: 's,
    {
        stream! {
            for subreddit in subreddits {
                let cutoff_ts = (Utc::now() - ChronoDuration::days(query.window_days)).timestamp();
                let filter_label = match query.time_filter() {
                    Some(t) => format!("({})", t),
                    None => String::new(),
                };
                log::info!(
                    "Fetching {} posts from r/{} | listing={}{} | window={}d",
                    query.limit, subreddit, query.listing, filter_label, query.window_days
                );

                let mut stats = FetchStats::default();
                let mut samples_left = self.options.debug_samples;
                let mut after: Option<String> = None;
                let mut fetched = 0usize;

                while fetched < query.limit {
                    let want = (query.limit - fetched).min(MAX_PAGE);
                    let page = match self
                        .api
                        .fetch_listing(subreddit, query.listing, query.time_filter(), want, after.as_deref())
                        .await
                    {
                        Ok(page) => page,
                        Err(e) => {
                            log::error!("Failed to fetch r/{} {}: {}", subreddit, query.listing, e);
                            break;
                        }
                    };
                    stats.skip_malformed(page.malformed);
                    if page.posts.is_empty() {
                        break;
                    }

                    for post in page.posts.into_iter().take(query.limit - fetched) {
                        fetched += 1;
                        stats.seen += 1;

                        if let Err(reason) = self.check(&post, cutoff_ts) {
                            stats.skip(reason);
                            continue;
                        }

                        let candidate = Self::normalize(post, &query);
                        if samples_left > 0 {
                            samples_left -= 1;
                            log::debug!("Sample post: {}", candidate.title.as_deref().unwrap_or_default());
                        }
                        yield candidate;
                        stats.yielded += 1;

                        if self.options.pace_due(stats.seen) {
                            tokio::time::sleep(self.options.pace_delay).await;
                        }
                    }

                    after = page.after;
                    if after.is_none() {
                        break;
                    }
                }

                log::info!("Finished r/{} | {}", subreddit, stats);
                self.record(&stats);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::services::testing::{FakeForum, raw_post};

    fn query(limit: usize) -> PostQuery {
        PostQuery {
            listing: Listing::Hot,
            time_filter: TimeFilter::Week,
            limit,
            window_days: 14,
        }
    }

    fn quiet() -> FilterOptions {
        FilterOptions {
            pace_delay: std::time::Duration::ZERO,
            ..FilterOptions::default()
        }
    }

    #[tokio::test]
    async fn test_filters_count_each_reason() {
        let now = Utc::now().timestamp() as f64;
        let mut old = raw_post("old", "ai", now - 30.0 * 86_400.0);
        old.title = Some("An old post about the model".into());
        let mut removed = raw_post("removed", "ai", now);
        removed.removed_by_category = Some("moderator".into());
        let mut deleted = raw_post("deleted", "ai", now);
        deleted.author = Some("[deleted]".into());
        let mut bot = raw_post("bot", "ai", now);
        bot.author = Some("SummaryBot".into());
        let mut nsfw = raw_post("nsfw", "ai", now);
        nsfw.over_18 = true;
        let mut foreign = raw_post("foreign", "ai", now);
        foreign.title = Some("这个模型在编程方面表现很好".into());
        let keep = raw_post("keep", "ai", now);

        let forum = FakeForum::default().with_pages(
            "ai",
            vec![vec![old, removed, deleted, bot, nsfw, foreign, keep]],
        );
        let collector = PostCollector::new(&forum, quiet());
        let subs = vec!["ai".to_string()];

        let posts: Vec<_> = collector.stream(&subs, query(100)).collect().await;

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post_id.as_deref(), Some("keep"));
        assert_eq!(posts[0].listing, Some(Listing::Hot));
        assert_eq!(posts[0].time_filter, None);

        let stats = collector.stats();
        assert_eq!(stats.seen, 7);
        assert_eq!(stats.yielded, 1);
        assert_eq!(stats.skipped_old, 1);
        assert_eq!(stats.skipped_removed, 2);
        assert_eq!(stats.skipped_bots, 1);
        assert_eq!(stats.skipped_nsfw, 1);
        assert_eq!(stats.skipped_lang, 1);
    }

    #[tokio::test]
    async fn test_paginates_until_limit() {
        let now = Utc::now().timestamp() as f64;
        let page = |prefix: &str| -> Vec<RawPost> {
            (0..3)
                .map(|i| raw_post(&format!("{prefix}{i}"), "ai", now))
                .collect()
        };
        let forum = FakeForum::default().with_pages("ai", vec![page("a"), page("b"), page("c")]);
        let collector = PostCollector::new(&forum, quiet());
        let subs = vec!["ai".to_string()];

        let posts: Vec<_> = collector.stream(&subs, query(5)).collect().await;

        let ids: Vec<_> = posts.iter().filter_map(|p| p.post_id.as_deref()).collect();
        assert_eq!(ids, ["a0", "a1", "a2", "b0", "b1"]);
        assert_eq!(forum.listing_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_community_does_not_stop_others() {
        let now = Utc::now().timestamp() as f64;
        let forum = FakeForum::default()
            .with_failure("broken")
            .with_pages("ai", vec![vec![raw_post("ok", "ai", now)]]);
        let collector = PostCollector::new(&forum, quiet());
        let subs = vec!["broken".to_string(), "ai".to_string()];

        let posts: Vec<_> = collector.stream(&subs, query(10)).collect().await;
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_posts_are_skipped_not_fatal() {
        let now = Utc::now().timestamp() as f64;
        let forum = FakeForum::default()
            .with_pages(
                "ai",
                vec![
                    vec![raw_post("a", "ai", now)],
                    vec![raw_post("b", "ai", now)],
                ],
            )
            .with_malformed("ai", 1);
        let collector = PostCollector::new(&forum, quiet());
        let subs = vec!["ai".to_string()];

        let posts: Vec<_> = collector.stream(&subs, query(10)).collect().await;

        let ids: Vec<_> = posts.iter().filter_map(|p| p.post_id.as_deref()).collect();
        assert_eq!(ids, ["a", "b"]);
        let stats = collector.stats();
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.skipped_malformed, 1);
    }

    #[tokio::test]
    async fn test_top_listing_carries_time_filter() {
        let now = Utc::now().timestamp() as f64;
        let mut post = raw_post("t", "ai", now);
        post.permalink = Some("/r/ai/comments/t/x/".into());
        let forum = FakeForum::default().with_pages("ai", vec![vec![post]]);
        let collector = PostCollector::new(&forum, quiet());
        let subs = vec!["ai".to_string()];

        let top = PostQuery {
            listing: Listing::Top,
            ..query(10)
        };
        let posts: Vec<_> = collector.stream(&subs, top).collect().await;

        assert_eq!(posts[0].time_filter, Some(TimeFilter::Week));
        assert_eq!(
            posts[0].permalink.as_deref(),
            Some("https://reddit.com/r/ai/comments/t/x/")
        );
    }

    #[tokio::test]
    async fn test_filters_can_be_disabled() {
        let now = Utc::now().timestamp() as f64;
        let mut bot = raw_post("bot", "ai", now);
        bot.author = Some("helperbot".into());
        bot.over_18 = true;
        bot.title = Some("这个模型".into());

        let forum = FakeForum::default().with_pages("ai", vec![vec![bot]]);
        let options = FilterOptions {
            include_nsfw: true,
            skip_bots: false,
            english_only: false,
            ..quiet()
        };
        let collector = PostCollector::new(&forum, options);
        let subs = vec!["ai".to_string()];

        let posts: Vec<_> = collector.stream(&subs, query(10)).collect().await;
        assert_eq!(posts.len(), 1);
    }
}
