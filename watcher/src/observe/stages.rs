//! Grouping of jobs into ordered stage columns

use std::collections::HashMap;

use serde::Serialize;

use crate::models::pipeline::Job;
use crate::models::status::Status;

/// Stage order used when none is configured
pub const DEFAULT_STAGE_ORDER: [&str; 4] = ["build", "test", "scan", "deploy"];

/// Jobs sharing a stage name, in backend order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageGroup {
    pub name: String,
    pub jobs: Vec<Job>,
}

impl StageGroup {
    /// Aggregate status of the stage
    pub fn status(&self) -> Status {
        let any = |wanted: &Status| self.jobs.iter().any(|job| &job.status == wanted);

        if any(&Status::Failed) {
            Status::Failed
        } else if any(&Status::Running) {
            Status::Running
        } else if self
            .jobs
            .iter()
            .any(|job| matches!(job.status, Status::Pending | Status::Unknown(_)))
        {
            Status::Pending
        } else {
            Status::Success
        }
    }
}

/// Partition jobs into stages
///
/// Stages named in `canonical_order` come first, in that order. Stage names
/// missing from it follow in the order they first appear in `jobs`. Stages
/// without jobs are left out.
pub fn group_by_stage<S: AsRef<str>>(jobs: &[Job], canonical_order: &[S]) -> Vec<StageGroup> {
    let mut buckets: HashMap<&str, Vec<Job>> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for job in jobs {
        let bucket = buckets.entry(job.stage.as_str()).or_insert_with(|| {
            first_seen.push(job.stage.as_str());
            Vec::new()
        });
        bucket.push(job.clone());
    }

    let mut order: Vec<&str> = Vec::with_capacity(canonical_order.len() + first_seen.len());
    for stage in canonical_order.iter().map(|s| s.as_ref()).chain(first_seen) {
        if !order.contains(&stage) {
            order.push(stage);
        }
    }

    order
        .into_iter()
        .filter_map(|stage| {
            buckets.remove(stage).map(|jobs| StageGroup {
                name: stage.to_string(),
                jobs,
            })
        })
        .collect()
}
