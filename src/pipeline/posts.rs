// src/pipeline/posts.rs

//! Post collection job.

use crate::error::{AppError, Result};
use crate::models::{Config, Listing, TimeFilter};
use crate::services::{PostCollector, PostQuery};

use super::{JobContext, JobReport, TierReport};

/// Window wide enough to keep every all-time top post.
pub const ALL_TIME_WINDOW_DAYS: i64 = 5000;

/// One listing pass over every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostJob {
    pub listing: Listing,
    pub time_filter: TimeFilter,
    pub window_days: i64,
}

impl PostJob {
    /// Listing pass with the configured window.
    pub fn new(listing: Listing, config: &Config) -> Self {
        Self {
            listing,
            time_filter: TimeFilter::default(),
            window_days: config.collector.window_days,
        }
    }

    /// All-time top pass.
    pub fn top_all_time() -> Self {
        Self {
            listing: Listing::Top,
            time_filter: TimeFilter::All,
            window_days: ALL_TIME_WINDOW_DAYS,
        }
    }

    /// Reject settings that would make the job meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.window_days <= 0 {
            return Err(AppError::config(format!(
                "window_days must be > 0 (got {})",
                self.window_days
            )));
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        match self.listing {
            Listing::Top => format!("posts/top({})", self.time_filter),
            other => format!("posts/{}", other),
        }
    }
}

/// Stream one listing from every tier into the `posts` collection.
pub async fn run_post_job(ctx: &JobContext<'_>, job: &PostJob) -> Result<JobReport> {
    job.validate()?;
    let reconciler = ctx.reconciler()?;
    let mut report = JobReport::new(job.label());

    log::info!("Starting {}", report.job);

    for tier in &ctx.config.tiers {
        let query = PostQuery {
            listing: job.listing,
            time_filter: job.time_filter,
            limit: tier.limit_for(job.listing),
            window_days: job.window_days,
        };
        log::info!(
            "[{}] {} communities, {} posts each",
            tier.name,
            tier.subreddits.len(),
            query.limit
        );

        let collector = PostCollector::new(ctx.api, ctx.filters());
        let upserts = reconciler
            .upsert_posts(collector.stream(&tier.subreddits, query))
            .await;

        report.push(TierReport {
            tier: tier.name.clone(),
            fetched: collector.stats(),
            upserts,
        });
    }

    log::info!("{} complete: {} | {}", report.job, report.fetched, report.upserts);
    Ok(report)
}
