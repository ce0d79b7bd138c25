//! Pipeline domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use openapi_client::models as wire;

use crate::errors::ObserverError;
use crate::models::status::Status;

/// A pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: i64,
    pub project_id: i64,
    pub status: Status,
    pub commit_hash: Option<String>,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Abbreviated commit hash, or `None` for manual runs
    pub fn short_commit(&self) -> Option<&str> {
        self.commit_hash
            .as_deref()
            .filter(|hash| !hash.is_empty())
            .map(|hash| hash.get(..8).unwrap_or(hash))
    }
}

/// A job of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,

    /// Free-form grouping key
    pub stage: String,

    pub image: String,
    pub status: Status,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The deployment of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub pipeline_id: i64,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Owner of a log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum LogOwner {
    Job(i64),

    /// Keyed by pipeline id, a pipeline has at most one deployment
    Deployment(i64),
}

/// A single line of log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub id: i64,
    pub owner: LogOwner,

    /// Display order, the index in the backend's response
    pub position: usize,

    pub content: String,
}

fn parse_required(field: &str, value: &str) -> Result<DateTime<Utc>, ObserverError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ObserverError::Malformed(format!("{}: {} ({})", field, value, e)))
}

fn parse_optional(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

impl TryFrom<wire::Pipeline> for PipelineRun {
    type Error = ObserverError;

    fn try_from(pipeline: wire::Pipeline) -> Result<Self, Self::Error> {
        Ok(Self {
            id: pipeline.id,
            project_id: pipeline.project_id,
            status: Status::from(pipeline.status.as_str()),
            created_at: parse_required("created_at", &pipeline.created_at)?,
            finished_at: parse_optional(pipeline.finished_at.as_deref()),
            commit_hash: pipeline.commit_hash,
            branch: pipeline.branch,
        })
    }
}

impl From<wire::Job> for Job {
    fn from(job: wire::Job) -> Self {
        Self {
            id: job.id,
            pipeline_id: job.pipeline_id,
            status: Status::from(job.status.as_str()),
            started_at: parse_optional(job.started_at.as_deref()),
            finished_at: parse_optional(job.finished_at.as_deref()),
            name: job.name,
            stage: job.stage,
            image: job.image,
            exit_code: job.exit_code,
        }
    }
}

impl From<wire::Deployment> for Deployment {
    fn from(deployment: wire::Deployment) -> Self {
        Self {
            id: deployment.id,
            pipeline_id: deployment.pipeline_id,
            status: Status::from(deployment.status.as_str()),
            started_at: parse_optional(deployment.started_at.as_deref()),
            finished_at: parse_optional(deployment.finished_at.as_deref()),
        }
    }
}

/// Convert job logs, keeping the backend's order as display order
pub fn job_log_lines(logs: Vec<wire::JobLog>) -> Vec<LogLine> {
    logs.into_iter()
        .enumerate()
        .map(|(position, log)| LogLine {
            id: log.id,
            owner: LogOwner::Job(log.job_id),
            position,
            content: log.content,
        })
        .collect()
}

/// Convert deployment logs, keeping the backend's order as display order
pub fn deployment_log_lines(logs: Vec<wire::DeploymentLog>) -> Vec<LogLine> {
    logs.into_iter()
        .enumerate()
        .map(|(position, log)| LogLine {
            id: log.id,
            owner: LogOwner::Deployment(log.pipeline_id),
            position,
            content: log.content,
        })
        .collect()
}
