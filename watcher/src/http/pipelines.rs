//! Pipeline and job API client

use openapi_client::models::{Job as WireJob, JobLog, Pipeline, TriggerPipelineRequest};

use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::pipeline::{job_log_lines, Job, LogLine, PipelineRun};

impl HttpClient {
    /// Get a pipeline run by ID
    pub async fn get_pipeline(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<PipelineRun, ObserverError> {
        let path = format!("/projects/{}/pipelines/{}", project_id, pipeline_id);
        let pipeline: Pipeline = self.get(&path).await?;
        PipelineRun::try_from(pipeline)
    }

    /// Trigger a new pipeline run on a branch
    pub async fn trigger_pipeline(
        &self,
        project_id: i64,
        branch: &str,
    ) -> Result<PipelineRun, ObserverError> {
        let path = format!("/projects/{}/pipelines", project_id);
        let request = TriggerPipelineRequest {
            branch: branch.to_string(),
        };
        let pipeline: Pipeline = self.post(&path, &request).await?;
        PipelineRun::try_from(pipeline)
    }

    /// Get the jobs of a pipeline run, in backend order
    pub async fn get_jobs(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Vec<Job>, ObserverError> {
        let path = format!("/projects/{}/pipelines/{}/jobs", project_id, pipeline_id);
        let jobs: Vec<WireJob> = self.get(&path).await?;
        Ok(jobs.into_iter().map(Job::from).collect())
    }

    /// Get the full log of a job
    pub async fn get_job_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
        job_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        let path = format!(
            "/projects/{}/pipelines/{}/jobs/{}/logs",
            project_id, pipeline_id, job_id
        );
        let logs: Vec<JobLog> = self.get(&path).await?;
        Ok(job_log_lines(logs))
    }
}
