//! Read boundary between the observation engine and the backend

use async_trait::async_trait;

use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::pipeline::{Deployment, Job, LogLine, PipelineRun};

/// Read operations the observation engine needs from the backend
///
/// All operations are idempotent reads.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Fails with `NotFound` when the pipeline does not exist
    async fn get_pipeline(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<PipelineRun, ObserverError>;

    async fn get_jobs(&self, project_id: i64, pipeline_id: i64) -> Result<Vec<Job>, ObserverError>;

    /// `Ok(None)` when the pipeline has no deployment, distinct from a failure
    async fn get_deployment(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Option<Deployment>, ObserverError>;

    async fn get_job_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
        job_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError>;

    async fn get_deployment_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError>;
}

#[async_trait]
impl PipelineApi for HttpClient {
    async fn get_pipeline(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<PipelineRun, ObserverError> {
        HttpClient::get_pipeline(self, project_id, pipeline_id).await
    }

    async fn get_jobs(&self, project_id: i64, pipeline_id: i64) -> Result<Vec<Job>, ObserverError> {
        HttpClient::get_jobs(self, project_id, pipeline_id).await
    }

    async fn get_deployment(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Option<Deployment>, ObserverError> {
        HttpClient::get_deployment(self, project_id, pipeline_id).await
    }

    async fn get_job_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
        job_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        HttpClient::get_job_logs(self, project_id, pipeline_id, job_id).await
    }

    async fn get_deployment_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        HttpClient::get_deployment_logs(self, project_id, pipeline_id).await
    }
}
