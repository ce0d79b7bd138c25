//! Shared fixtures: an in-memory backend and wait helpers

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use pipewatch::errors::ObserverError;
use pipewatch::http::api::PipelineApi;
use pipewatch::models::pipeline::{Deployment, Job, LogLine, LogOwner, PipelineRun};
use pipewatch::models::status::Status;
use pipewatch::observe::poller::ResourceState;
use pipewatch::observe::view::PipelineView;

pub const PROJECT_ID: i64 = 1;
pub const PIPELINE_ID: i64 = 42;

/// Scripted answer of the fake backend
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    NotFound,
    Fail,
}

impl<T: Clone> Reply<T> {
    fn to_result(&self, what: &str) -> Result<T, ObserverError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::NotFound => Err(ObserverError::NotFound(what.to_string())),
            Reply::Fail => Err(ObserverError::Transient(format!("{} unavailable", what))),
        }
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub pipeline: AtomicUsize,
    pub jobs: AtomicUsize,
    pub deployment: AtomicUsize,
    pub job_logs: AtomicUsize,
    pub deployment_logs: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct Backend {
    pipeline: Reply<PipelineRun>,
    jobs: Reply<Vec<Job>>,
    deployment: Reply<Option<Deployment>>,
    job_logs: HashMap<i64, Vec<LogLine>>,
    deployment_logs: Vec<LogLine>,
    log_delay: Duration,
    logs_failing: bool,
}

impl Backend {
    fn log_reply(&self, lines: Vec<LogLine>) -> Reply<Vec<LogLine>> {
        if self.logs_failing {
            Reply::Fail
        } else {
            Reply::Ok(lines)
        }
    }
}

/// In-memory `PipelineApi` whose answers tests can change at any time
pub struct FakeApi {
    backend: Mutex<Backend>,
    pub calls: Calls,
}

impl FakeApi {
    pub fn new(pipeline: PipelineRun, jobs: Vec<Job>) -> Arc<Self> {
        Arc::new(Self {
            backend: Mutex::new(Backend {
                pipeline: Reply::Ok(pipeline),
                jobs: Reply::Ok(jobs),
                deployment: Reply::Ok(None),
                job_logs: HashMap::new(),
                deployment_logs: Vec::new(),
                log_delay: Duration::ZERO,
                logs_failing: false,
            }),
            calls: Calls::default(),
        })
    }

    pub fn set_pipeline(&self, reply: Reply<PipelineRun>) {
        self.backend.lock().unwrap().pipeline = reply;
    }

    pub fn set_jobs(&self, reply: Reply<Vec<Job>>) {
        self.backend.lock().unwrap().jobs = reply;
    }

    pub fn set_deployment(&self, reply: Reply<Option<Deployment>>) {
        self.backend.lock().unwrap().deployment = reply;
    }

    pub fn set_job_logs(&self, job_id: i64, contents: &[&str]) {
        let lines = log_lines(LogOwner::Job(job_id), contents);
        self.backend.lock().unwrap().job_logs.insert(job_id, lines);
    }

    /// Delay every log response, in virtual time
    pub fn set_log_delay(&self, delay: Duration) {
        self.backend.lock().unwrap().log_delay = delay;
    }

    /// Make every log read fail with a transient error
    pub fn set_logs_failing(&self, failing: bool) {
        self.backend.lock().unwrap().logs_failing = failing;
    }

    pub fn set_deployment_logs(&self, contents: &[&str]) {
        self.backend.lock().unwrap().deployment_logs =
            log_lines(LogOwner::Deployment(PIPELINE_ID), contents);
    }
}

#[async_trait]
impl PipelineApi for FakeApi {
    async fn get_pipeline(
        &self,
        _project_id: i64,
        _pipeline_id: i64,
    ) -> Result<PipelineRun, ObserverError> {
        self.calls.pipeline.fetch_add(1, Ordering::SeqCst);
        self.backend.lock().unwrap().pipeline.to_result("pipeline")
    }

    async fn get_jobs(&self, _project_id: i64, _pipeline_id: i64) -> Result<Vec<Job>, ObserverError> {
        self.calls.jobs.fetch_add(1, Ordering::SeqCst);
        self.backend.lock().unwrap().jobs.to_result("jobs")
    }

    async fn get_deployment(
        &self,
        _project_id: i64,
        _pipeline_id: i64,
    ) -> Result<Option<Deployment>, ObserverError> {
        self.calls.deployment.fetch_add(1, Ordering::SeqCst);
        self.backend.lock().unwrap().deployment.to_result("deployment")
    }

    async fn get_job_logs(
        &self,
        _project_id: i64,
        _pipeline_id: i64,
        job_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        self.calls.job_logs.fetch_add(1, Ordering::SeqCst);
        // Answer with the content as of arrival, like a real backend would
        let (reply, delay) = {
            let backend = self.backend.lock().unwrap();
            let reply = match backend.job_logs.get(&job_id) {
                Some(lines) => backend.log_reply(lines.clone()),
                None => Reply::NotFound,
            };
            (reply, backend.log_delay)
        };
        tokio::time::sleep(delay).await;
        reply.to_result("job logs")
    }

    async fn get_deployment_logs(
        &self,
        _project_id: i64,
        _pipeline_id: i64,
    ) -> Result<Vec<LogLine>, ObserverError> {
        self.calls.deployment_logs.fetch_add(1, Ordering::SeqCst);
        let (reply, delay) = {
            let backend = self.backend.lock().unwrap();
            (backend.log_reply(backend.deployment_logs.clone()), backend.log_delay)
        };
        tokio::time::sleep(delay).await;
        reply.to_result("deployment logs")
    }
}

pub fn pipeline(status: Status) -> PipelineRun {
    PipelineRun {
        id: PIPELINE_ID,
        project_id: PROJECT_ID,
        status,
        commit_hash: Some("9f86d081884c7d65".to_string()),
        branch: "main".to_string(),
        created_at: Utc::now(),
        finished_at: None,
    }
}

pub fn job(id: i64, name: &str, stage: &str, status: Status) -> Job {
    Job {
        id,
        pipeline_id: PIPELINE_ID,
        name: name.to_string(),
        stage: stage.to_string(),
        image: "rust:1.84".to_string(),
        status,
        exit_code: None,
        started_at: None,
        finished_at: None,
    }
}

pub fn deployment(status: Status) -> Deployment {
    Deployment {
        id: 7,
        pipeline_id: PIPELINE_ID,
        status,
        started_at: None,
        finished_at: None,
    }
}

pub fn log_lines(owner: LogOwner, contents: &[&str]) -> Vec<LogLine> {
    contents
        .iter()
        .enumerate()
        .map(|(position, content)| LogLine {
            id: position as i64 + 1,
            owner,
            position,
            content: content.to_string(),
        })
        .collect()
}

const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// Wait, in virtual time, until a poller state satisfies `predicate`
pub async fn wait_state<T: Clone>(
    rx: &mut watch::Receiver<ResourceState<T>>,
    predicate: impl FnMut(&ResourceState<T>) -> bool,
) -> ResourceState<T> {
    let state = tokio::time::timeout(WAIT_LIMIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for poller state")
        .expect("poller stopped");
    state.clone()
}

/// Wait, in virtual time, until a view satisfies `predicate`
pub async fn wait_view(
    rx: &mut watch::Receiver<Arc<PipelineView>>,
    mut predicate: impl FnMut(&PipelineView) -> bool,
) -> Arc<PipelineView> {
    let view = tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|view| predicate(view)))
        .await
        .expect("timed out waiting for view")
        .expect("session stopped");
    view.clone()
}
