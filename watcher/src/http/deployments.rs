//! Deployment API client

use openapi_client::models::{Deployment as WireDeployment, DeploymentLog};

use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::pipeline::{deployment_log_lines, Deployment, LogLine};

impl HttpClient {
    /// Get the deployment of a pipeline run
    ///
    /// A 404 means the pipeline has no deployment (yet) and maps to `None`.
    pub async fn get_deployment(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Option<Deployment>, ObserverError> {
        let path = format!("/projects/{}/pipelines/{}/deployment", project_id, pipeline_id);
        match self.get::<WireDeployment>(&path).await {
            Ok(deployment) => Ok(Some(Deployment::from(deployment))),
            Err(ObserverError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get the full log of a pipeline's deployment
    pub async fn get_deployment_logs(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        let path = format!(
            "/projects/{}/pipelines/{}/deployment/logs",
            project_id, pipeline_id
        );
        let logs: Vec<DeploymentLog> = self.get(&path).await?;
        Ok(deployment_log_lines(logs))
    }
}
