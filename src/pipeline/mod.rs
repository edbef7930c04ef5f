//! Pipeline entry points for collector jobs.
//!
//! - `run_post_job`: stream one listing from every tier into `posts`
//! - `run_comment_job`: stream comments of the most engaged stored posts into `comments`
//! - `run_all`: the scheduled sequence of both

mod comments;
mod posts;
mod report;
mod run;

pub use comments::{CommentJob, run_comment_job};
pub use posts::{PostJob, run_post_job};
pub use report::{JobReport, RunReport, TierReport};
pub use run::run_all;

use crate::error::Result;
use crate::models::Config;
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::services::{FilterOptions, ForumApi};
use crate::storage::DocumentStore;

/// Everything a job needs, built once per run and passed down.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub config: &'a Config,
    pub store: &'a dyn DocumentStore,
    pub api: &'a dyn ForumApi,
}

impl<'a> JobContext<'a> {
    pub fn new(config: &'a Config, store: &'a dyn DocumentStore, api: &'a dyn ForumApi) -> Self {
        Self { config, store, api }
    }

    fn reconciler(&self) -> Result<Reconciler<'a>> {
        let options = ReconcileOptions::from_config(&self.config.collector)?;
        Ok(Reconciler::new(self.store, options))
    }

    fn filters(&self) -> FilterOptions {
        FilterOptions::from_config(&self.config.collector, &self.config.reddit)
    }
}

/// Two small tiers with pacing disabled.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    use crate::models::{ListingLimits, Tier};

    let mut config = Config::default();
    config.reddit.pace_delay_ms = 0;
    config.tiers = vec![
        Tier::new(
            "FAST",
            &["ChatGPT"],
            ListingLimits {
                new: 2,
                hot: 2,
                top: 2,
            },
            1,
        ),
        Tier::new("CORE", &["artificial"], ListingLimits::default(), 1),
    ];
    config
}
