// src/pipeline/comments.rs

//! Comment collection job.
//!
//! Seeds come from the store, not the forum: the most engaged posts already
//! seen under `seed_listing` in each community.

use async_stream::stream;
use futures::{StreamExt, pin_mut};

use crate::error::Result;
use crate::models::{CommentSort, Listing};
use crate::reconcile::UpsertStats;
use crate::services::{CommentCollector, CommentQuery};

use super::{JobContext, JobReport, TierReport};

/// One comment pass over the seed posts of every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentJob {
    pub sort: CommentSort,
    pub seed_listing: Listing,
    /// Comments scanned per post
    pub cap: usize,
    /// Comments yielded per post
    pub limit: usize,
    pub top_level_only: bool,
}

impl CommentJob {
    /// Job with default bounds; seeds come from the listing matching the sort.
    pub fn new(sort: CommentSort) -> Self {
        let seed_listing = match sort {
            CommentSort::New => Listing::New,
            CommentSort::Top => Listing::Top,
            _ => Listing::Hot,
        };
        Self {
            sort,
            seed_listing,
            cap: 300,
            limit: 120,
            top_level_only: true,
        }
    }

    pub fn label(&self) -> String {
        format!("comments/{}", self.sort)
    }

    fn query(&self) -> CommentQuery {
        CommentQuery {
            sort: self.sort,
            cap: self.cap,
            limit: self.limit,
            top_level_only: self.top_level_only,
        }
    }
}

/// Stream comments of each tier's seed posts into the `comments` collection.
pub async fn run_comment_job(ctx: &JobContext<'_>, job: &CommentJob) -> Result<JobReport> {
    let reconciler = ctx.reconciler()?;
    let mut report = JobReport::new(job.label());
    let query = job.query();

    log::info!(
        "Starting {} | seeds from seen_in={} | cap={} | limit={}",
        report.job,
        job.seed_listing,
        job.cap,
        job.limit
    );

    for tier in &ctx.config.tiers {
        let mut seeds = Vec::new();
        for subreddit in &tier.subreddits {
            let ids = ctx
                .store
                .top_post_ids(subreddit, job.seed_listing, tier.comment_seeds)
                .await?;
            log::info!("[{}] r/{}: {} seed posts", tier.name, subreddit, ids.len());
            seeds.extend(ids);
        }

        let collector = CommentCollector::new(ctx.api, ctx.filters());
        let upserts = if seeds.is_empty() {
            UpsertStats::default()
        } else {
            let collector = &collector;
            let comments = stream! {
                for post_id in &seeds {
                    let thread = collector.stream(post_id, query);
                    pin_mut!(thread);
                    while let Some(comment) = thread.next().await {
                        yield comment;
                    }
                }
            };
            reconciler.upsert_comments(comments).await
        };

        report.push(TierReport {
            tier: tier.name.clone(),
            fetched: collector.stats(),
            upserts,
        });
    }

    log::info!("{} complete: {} | {}", report.job, report.fetched, report.upserts);
    Ok(report)
}
