//! API models
//!
//! Statuses and timestamps are kept as the backend sends them. Conversion
//! into typed values happens on the client side.

use serde::{Deserialize, Serialize};

/// Pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub project_id: i64,
    pub status: String,
    #[serde(default)]
    pub commit_hash: Option<String>,
    pub branch: String,
    pub created_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Job within a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    pub stage: String,
    pub image: String,
    pub status: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Single log line of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub id: i64,
    pub job_id: i64,
    pub content: String,
    pub created_at: String,
}

/// Deployment of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub pipeline_id: i64,
    pub status: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Single log line of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub id: i64,
    pub pipeline_id: i64,
    pub content: String,
    pub created_at: String,
}

/// Trigger pipeline request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPipelineRequest {
    pub branch: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
