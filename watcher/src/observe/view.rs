//! Immutable view model of an observed pipeline

use serde::Serialize;

use crate::models::pipeline::{Deployment, Job, PipelineRun};
use crate::observe::log_tail::LogTarget;
use crate::observe::stages::StageGroup;

/// Overall state of the observed pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ViewStatus {
    /// The pipeline has not loaded yet
    Loading,

    Ready,

    /// The backend does not know the pipeline
    NotFound,

    /// The pipeline never loaded and its fetch keeps failing
    Unavailable(String),
}

/// Which log stream the user is tailing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Selection {
    #[default]
    None,
    Job(i64),
    Deployment,
}

impl Selection {
    pub fn log_target(&self) -> Option<LogTarget> {
        match self {
            Selection::None => None,
            Selection::Job(id) => Some(LogTarget::Job(*id)),
            Selection::Deployment => Some(LogTarget::Deployment),
        }
    }
}

/// The log panel of the selected stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPanel {
    pub target: LogTarget,
    pub title: String,
    pub lines: Vec<String>,

    /// No fetch for this target has completed yet
    pub loading: bool,

    /// The stream's owner is settled and polling has stopped
    pub settled: bool,

    /// The backend has no log stream for this target
    pub missing: bool,

    pub following: bool,

    /// Bumped whenever the presentation should scroll to the last line
    pub scroll_revision: u64,
}

impl LogPanel {
    /// Whether the stream will not change anymore
    pub fn is_done(&self) -> bool {
        self.settled || self.missing
    }
}

/// Resources that loaded once and are failing since, still shown with
/// their last good value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Staleness {
    pub pipeline: bool,
    pub jobs: bool,
    pub deployment: bool,
    pub log: bool,
}

/// Snapshot of everything a renderer needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineView {
    pub project_id: i64,
    pub pipeline_id: i64,
    pub status: ViewStatus,
    pub pipeline: Option<PipelineRun>,
    pub stages: Vec<StageGroup>,
    pub jobs_loading: bool,

    /// Present only when the backend reports a deployment
    pub deployment: Option<Deployment>,

    pub selection: Selection,
    pub log: Option<LogPanel>,
    pub stale: Staleness,
}

impl PipelineView {
    pub fn loading(project_id: i64, pipeline_id: i64) -> Self {
        Self {
            project_id,
            pipeline_id,
            status: ViewStatus::Loading,
            pipeline: None,
            stages: Vec::new(),
            jobs_loading: true,
            deployment: None,
            selection: Selection::None,
            log: None,
            stale: Staleness::default(),
        }
    }

    /// Whether deployment logs can be selected
    pub fn can_select_deployment(&self) -> bool {
        self.deployment.is_some()
    }

    pub fn job(&self, job_id: i64) -> Option<&Job> {
        self.stages
            .iter()
            .flat_map(|stage| stage.jobs.iter())
            .find(|job| job.id == job_id)
    }

    /// Whether the pipeline and its deployment, if any, are both settled
    pub fn is_finished(&self) -> bool {
        let pipeline_done = self
            .pipeline
            .as_ref()
            .is_some_and(|pipeline| pipeline.status.is_terminal());
        let deployment_done = self
            .deployment
            .as_ref()
            .map_or(true, |deployment| deployment.status.is_terminal());

        pipeline_done && deployment_done
    }
}
