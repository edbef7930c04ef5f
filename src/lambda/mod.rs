// src/lambda/mod.rs

//! AWS Lambda handler for scheduled collector jobs.
//!
//! Each invocation:
//! 1. Loads configuration from `CONFIG_PATH` (default `config.toml`) plus environment
//! 2. Opens the configured store and ensures its indexes
//! 3. Runs the requested job and returns its report

use std::time::Instant;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::{AppError, Result};
use crate::models::{CommentSort, Config, Listing, TimeFilter};
use crate::pipeline::{
    CommentJob, JobContext, PostJob, RunReport, run_all, run_comment_job, run_post_job,
};
use crate::services::RedditClient;
use crate::storage;

/// Which job to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Posts,
    Comments,
    All,
}

/// Lambda invocation payload.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub job: JobKind,

    /// Listing for a posts job
    pub listing: Option<Listing>,
    /// Top-N window for a `top` posts job (default: day)
    pub time_filter: Option<TimeFilter>,
    /// Overrides `collector.window_days`
    pub window_days: Option<i64>,

    /// Sort for a comments job
    pub sort: Option<CommentSort>,
    /// Listing the seed posts must have been seen in
    pub seed_listing: Option<Listing>,
    pub cap: Option<usize>,
    pub limit: Option<usize>,
    pub top_level_only: Option<bool>,
}

impl JobRequest {
    fn post_job(&self, config: &Config) -> Result<PostJob> {
        let listing = self
            .listing
            .ok_or_else(|| AppError::validation("posts job requires 'listing'"))?;
        let mut job = PostJob::new(listing, config);
        if let Some(t) = self.time_filter {
            job.time_filter = t;
        }
        if let Some(days) = self.window_days {
            job.window_days = days;
        }
        job.validate()?;
        Ok(job)
    }

    fn comment_job(&self) -> Result<CommentJob> {
        let sort = self
            .sort
            .ok_or_else(|| AppError::validation("comments job requires 'sort'"))?;
        let mut job = CommentJob::new(sort);
        if let Some(listing) = self.seed_listing {
            job.seed_listing = listing;
        }
        if let Some(cap) = self.cap {
            job.cap = cap;
        }
        if let Some(limit) = self.limit {
            job.limit = limit;
        }
        if let Some(top_level_only) = self.top_level_only {
            job.top_level_only = top_level_only;
        }
        Ok(job)
    }
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct JobResponse {
    /// Whether the job ran to completion
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<JobRequest>,
) -> std::result::Result<JobResponse, LambdaError> {
    let start = Instant::now();
    let (request, _context) = event.into_parts();

    info!("Starting job: {:?}", request.job);

    match run_job(&request).await {
        Ok(report) => {
            let execution_time_ms = start.elapsed().as_millis() as u64;
            info!(
                "Job completed: {} upserted, {} dropped batches in {}ms",
                report.upserts.upserted, report.upserts.dropped_batches, execution_time_ms
            );
            Ok(JobResponse {
                success: true,
                report: Some(report),
                error: None,
                execution_time_ms,
            })
        }
        Err(e) => {
            error!("Job failed: {}", e);
            Ok(JobResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

/// Load configuration suitable for the Lambda environment.
fn load_lambda_config() -> Result<Config> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = Config::load_or_default(&path)?;
    config.apply_env()?;
    config.validate()?;
    config.require_credentials()?;
    Ok(config)
}

async fn run_job(request: &JobRequest) -> Result<RunReport> {
    let config = load_lambda_config()?;

    // Build jobs before any I/O so a bad payload fails fast.
    let post_job = match request.job {
        JobKind::Posts => Some(request.post_job(&config)?),
        _ => None,
    };
    let comment_job = match request.job {
        JobKind::Comments => Some(request.comment_job()?),
        _ => None,
    };

    let store = storage::open(&config.storage).await?;
    store.ensure_indexes().await?;
    let api = RedditClient::new(&config.reddit)?;
    let ctx = JobContext::new(&config, store.as_ref(), &api);

    match (post_job, comment_job) {
        (Some(job), _) => Ok(run_post_job(&ctx, &job).await?.into()),
        (_, Some(job)) => Ok(run_comment_job(&ctx, &job).await?.into()),
        _ => run_all(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_request() {
        let req: JobRequest = serde_json::from_str(r#"{"job": "all"}"#).unwrap();
        assert_eq!(req.job, JobKind::All);
        assert!(req.listing.is_none());
    }

    #[test]
    fn test_posts_request() {
        let json = r#"{"job": "posts", "listing": "top", "time_filter": "week", "window_days": 30}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        let job = req.post_job(&Config::default()).unwrap();
        assert_eq!(job.listing, Listing::Top);
        assert_eq!(job.time_filter, TimeFilter::Week);
        assert_eq!(job.window_days, 30);
    }

    #[test]
    fn test_comments_request() {
        let json = r#"{"job": "comments", "sort": "best", "cap": 50, "top_level_only": false}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        let job = req.comment_job().unwrap();
        assert_eq!(job.sort, CommentSort::Confidence);
        assert_eq!(job.seed_listing, Listing::Hot);
        assert_eq!(job.cap, 50);
        assert!(!job.top_level_only);
    }

    #[test]
    fn test_missing_options_rejected() {
        let req: JobRequest = serde_json::from_str(r#"{"job": "posts"}"#).unwrap();
        assert!(req.post_job(&Config::default()).is_err());
        let req: JobRequest = serde_json::from_str(r#"{"job": "comments"}"#).unwrap();
        assert!(req.comment_job().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let json = r#"{"job": "posts", "listing": "new", "window_days": 0}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert!(req.post_job(&Config::default()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_listing_rejected() {
        let json = r#"{"job": "posts", "listing": "rising"}"#;
        assert!(serde_json::from_str::<JobRequest>(json).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = JobResponse {
            error: Some("boom".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("report").is_none());
    }
}
