//! Explicit context an observation session is built from

use std::sync::Arc;

use uuid::Uuid;

use crate::http::api::PipelineApi;
use crate::observe::cadence::CadenceTable;
use crate::observe::stages::DEFAULT_STAGE_ORDER;
use crate::utils::RetryOptions;

/// Everything a session needs, passed in rather than looked up
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub api: Arc<dyn PipelineApi>,
    pub project_id: i64,
    pub pipeline_id: i64,
    pub cadence: CadenceTable,
    pub retry: RetryOptions,
    pub stage_order: Vec<String>,
}

impl SessionContext {
    /// Create a context with default cadence, retry budget and stage order
    pub fn new(api: Arc<dyn PipelineApi>, project_id: i64, pipeline_id: i64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            api,
            project_id,
            pipeline_id,
            cadence: CadenceTable::default(),
            retry: RetryOptions::default(),
            stage_order: DEFAULT_STAGE_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_cadence(mut self, cadence: CadenceTable) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stage_order(mut self, stage_order: Vec<String>) -> Self {
        self.stage_order = stage_order;
        self
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("project_id", &self.project_id)
            .field("pipeline_id", &self.pipeline_id)
            .field("cadence", &self.cadence)
            .field("retry", &self.retry)
            .field("stage_order", &self.stage_order)
            .finish_non_exhaustive()
    }
}
