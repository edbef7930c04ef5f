// src/pipeline/report.rs

//! Job reports.

use serde::Serialize;

use crate::reconcile::UpsertStats;
use crate::services::FetchStats;

/// Outcome for one tier of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierReport {
    pub tier: String,
    pub fetched: FetchStats,
    pub upserts: UpsertStats,
}

/// Outcome of one job across all tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub tiers: Vec<TierReport>,
    pub fetched: FetchStats,
    pub upserts: UpsertStats,
}

impl JobReport {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, tier: TierReport) {
        self.fetched.merge(&tier.fetched);
        self.upserts.merge(&tier.upserts);
        self.tiers.push(tier);
    }
}

/// Outcome of a sequence of jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    pub upserts: UpsertStats,
}

impl RunReport {
    pub fn push(&mut self, job: JobReport) {
        self.upserts.merge(&job.upserts);
        self.jobs.push(job);
    }
}

impl From<JobReport> for RunReport {
    fn from(job: JobReport) -> Self {
        let mut report = RunReport::default();
        report.push(job);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(name: &str, upserted: u64) -> TierReport {
        TierReport {
            tier: name.into(),
            fetched: FetchStats {
                seen: upserted,
                yielded: upserted,
                ..Default::default()
            },
            upserts: UpsertStats {
                upserted,
                batches: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let mut job = JobReport::new("posts/new");
        job.push(tier("FAST", 3));
        job.push(tier("CORE", 4));
        assert_eq!(job.upserts.upserted, 7);
        assert_eq!(job.fetched.yielded, 7);

        let mut run = RunReport::from(job.clone());
        run.push(job);
        assert_eq!(run.jobs.len(), 2);
        assert_eq!(run.upserts.batches, 4);
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(JobReport::new("comments/hot")).unwrap();
        assert_eq!(json["job"], "comments/hot");
        assert_eq!(json["upserts"]["dropped_batches"], 0);
    }
}
