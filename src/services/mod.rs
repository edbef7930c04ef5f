//! Service layer for the collector.
//!
//! This module contains the forum-facing logic:
//! - API access behind [`ForumApi`] (`RedditClient` over HTTPS)
//! - Post fetching and filtering (`PostCollector`)
//! - Comment fetching and filtering (`CommentCollector`)

pub mod api;
mod comments;
pub mod filters;
mod posts;
mod reddit;

pub use api::{CommentThread, ForumApi, ListingPage, RawComment, RawPost};
pub use comments::{CommentCollector, CommentQuery};
pub use filters::{FetchStats, FilterOptions, SkipReason};
pub use posts::{PostCollector, PostQuery};
pub use reddit::RedditClient;

/// Scripted [`ForumApi`] for tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::api::{CommentThread, ForumApi, ListingPage, RawComment, RawPost};
    use crate::error::{AppError, Result};
    use crate::models::{CommentSort, Listing, TimeFilter};

    /// Serves fixed pages per community and fixed threads per post.
    ///
    /// The `after` cursor is the index of the next page.
    #[derive(Default)]
    pub struct FakeForum {
        pages: HashMap<String, Vec<Vec<RawPost>>>,
        failing: HashSet<String>,
        malformed: HashMap<String, usize>,
        threads: HashMap<String, CommentThread>,
        listing_calls: AtomicUsize,
        requests: Mutex<Vec<String>>,
    }

    impl FakeForum {
        pub fn with_pages(mut self, subreddit: &str, pages: Vec<Vec<RawPost>>) -> Self {
            self.pages.insert(subreddit.to_string(), pages);
            self
        }

        /// Report `count` undecodable children on the first page.
        pub fn with_malformed(mut self, subreddit: &str, count: usize) -> Self {
            self.malformed.insert(subreddit.to_string(), count);
            self
        }

        pub fn with_failure(mut self, subreddit: &str) -> Self {
            self.failing.insert(subreddit.to_string());
            self
        }

        pub fn with_thread(mut self, post_id: &str, thread: CommentThread) -> Self {
            self.threads.insert(post_id.to_string(), thread);
            self
        }

        pub fn listing_calls(&self) -> usize {
            self.listing_calls.load(Ordering::SeqCst)
        }

        /// Requests seen so far, as `listing:<sub>:<listing>` or `comments:<id>:<sort>`.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }

        fn log(&self, entry: String) {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(entry);
            }
        }
    }

    #[async_trait]
    impl ForumApi for FakeForum {
        async fn fetch_listing(
            &self,
            subreddit: &str,
            listing: Listing,
            _time_filter: Option<TimeFilter>,
            _limit: usize,
            after: Option<&str>,
        ) -> Result<ListingPage> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            self.log(format!("listing:{}:{}", subreddit, listing));
            if self.failing.contains(subreddit) {
                return Err(AppError::fetch(subreddit, "HTTP 503"));
            }

            let Some(pages) = self.pages.get(subreddit) else {
                return Ok(ListingPage::default());
            };
            let index: usize = after.and_then(|a| a.parse().ok()).unwrap_or(0);
            Ok(ListingPage {
                posts: pages.get(index).cloned().unwrap_or_default(),
                after: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
                malformed: match index {
                    0 => self.malformed.get(subreddit).copied().unwrap_or(0),
                    _ => 0,
                },
            })
        }

        async fn fetch_comments(&self, post_id: &str, sort: CommentSort) -> Result<CommentThread> {
            self.log(format!("comments:{}:{}", post_id, sort));
            self.threads
                .get(post_id)
                .cloned()
                .ok_or_else(|| AppError::fetch(post_id, "HTTP 404"))
        }
    }

    pub fn raw_post(id: &str, subreddit: &str, created_utc: f64) -> RawPost {
        RawPost {
            id: id.to_string(),
            subreddit: subreddit.to_string(),
            title: Some("What is the best model for this task?".into()),
            selftext: Some(String::new()),
            author: Some("alice".into()),
            score: Some(10),
            upvote_ratio: Some(0.9),
            num_comments: Some(2),
            permalink: Some(format!("/r/{}/comments/{}/", subreddit, id)),
            created_utc: Some(created_utc),
            over_18: false,
            removed_by_category: None,
        }
    }

    pub fn raw_comment(id: &str, parent_id: &str, depth: u32, body: &str) -> RawComment {
        RawComment {
            id: id.to_string(),
            author: Some("alice".into()),
            body: Some(body.to_string()),
            score: Some(1),
            permalink: Some(format!("/r/x/comments/p/_/{}/", id)),
            created_utc: Some(1_700_000_000.0),
            parent_id: Some(parent_id.to_string()),
            link_id: None,
            depth: Some(depth),
            replies: Vec::new(),
        }
    }
}
