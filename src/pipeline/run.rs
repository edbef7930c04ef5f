// src/pipeline/run.rs

//! Scheduled job sequence.

use crate::error::Result;
use crate::models::{CommentSort, Listing};

use super::{CommentJob, JobContext, PostJob, RunReport, run_comment_job, run_post_job};

/// Run every job in schedule order: all-time top, new and hot posts, then
/// top, new and hot comments.
///
/// Comment jobs run last so their seeds include posts stored by this run.
pub async fn run_all(ctx: &JobContext<'_>) -> Result<RunReport> {
    let post_jobs = [
        PostJob::top_all_time(),
        PostJob::new(Listing::New, ctx.config),
        PostJob::new(Listing::Hot, ctx.config),
    ];
    let comment_jobs = [
        CommentJob::new(CommentSort::Top),
        CommentJob::new(CommentSort::New),
        CommentJob::new(CommentSort::Hot),
    ];
    let total = post_jobs.len() + comment_jobs.len();

    let mut report = RunReport::default();
    for (step, job) in post_jobs.iter().enumerate() {
        log::info!("[STEP {}/{}] {}", step + 1, total, job.label());
        report.push(run_post_job(ctx, job).await?);
    }
    for (step, job) in comment_jobs.iter().enumerate() {
        log::info!("[STEP {}/{}] {}", post_jobs.len() + step + 1, total, job.label());
        report.push(run_comment_job(ctx, job).await?);
    }

    log::info!("All jobs complete: {}", report.upserts);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::test_config;
    use crate::services::CommentThread;
    use crate::services::api::CommentNode;
    use crate::services::testing::{FakeForum, raw_comment, raw_post};
    use crate::storage::{Collection, LocalStore};

    #[tokio::test]
    async fn test_run_all_order_and_totals() {
        let now = Utc::now().timestamp() as f64;
        let thread = CommentThread {
            subreddit: Some("ChatGPT".into()),
            comments: vec![CommentNode::Comment(raw_comment(
                "c1",
                "t3_p1",
                0,
                "I think this is right",
            ))],
        };
        let forum = FakeForum::default()
            .with_pages("ChatGPT", vec![vec![raw_post("p1", "ChatGPT", now)]])
            .with_thread("p1", thread);
        let store = LocalStore::in_memory();
        let config = test_config();
        let ctx = JobContext::new(&config, &store, &forum);

        let report = run_all(&ctx).await.unwrap();

        let jobs: Vec<_> = report.jobs.iter().map(|j| j.job.as_str()).collect();
        assert_eq!(
            jobs,
            [
                "posts/top(all)",
                "posts/new",
                "posts/hot",
                "comments/top",
                "comments/new",
                "comments/hot"
            ]
        );

        let requests = forum.requests();
        assert_eq!(
            &requests[..6],
            [
                "listing:ChatGPT:top",
                "listing:artificial:top",
                "listing:ChatGPT:new",
                "listing:artificial:new",
                "listing:ChatGPT:hot",
                "listing:artificial:hot",
            ]
        );
        assert_eq!(
            &requests[6..],
            ["comments:p1:top", "comments:p1:new", "comments:p1:hot"]
        );

        // One post sighted three times, one comment sighted three times.
        assert_eq!(store.count(Collection::Posts).await, 1);
        assert_eq!(store.count(Collection::Comments).await, 1);
        assert_eq!(report.upserts.upserted, 2);
        assert_eq!(report.upserts.seen, 6);
    }
}
