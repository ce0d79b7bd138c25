//! Live observation of one pipeline run
//!
//! An [`ObservationSession`] is a handle to a driver task. The driver owns
//! the four resource pollers (pipeline, jobs, deployment and the selected log
//! stream), the selection and the log tail, and republishes an immutable
//! [`PipelineView`] whenever any of them changes. Selection is written only
//! by commands sent through the handle, never by poll results.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::errors::ObserverError;
use crate::models::pipeline::{Deployment, Job, PipelineRun};
use crate::models::status::Status;
use crate::observe::context::SessionContext;
use crate::observe::log_tail::{LogSnapshot, LogTail, LogTarget};
use crate::observe::poller::{
    FetchFn, IntervalFn, PollerOptions, ResourcePhase, ResourcePoller, ResourceState,
};
use crate::observe::stages::group_by_stage;
use crate::observe::view::{LogPanel, PipelineView, Selection, Staleness, ViewStatus};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug)]
enum Command {
    Select(Selection),
    Refresh,
    Follow(bool),
    Shutdown,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<(), ObserverError>>,
}

/// Handle to a running observation session
///
/// Dropping the handle stops the session and all of its polling.
pub struct ObservationSession {
    id: Uuid,
    command_tx: mpsc::Sender<Request>,
    view_rx: watch::Receiver<Arc<PipelineView>>,
    task: JoinHandle<()>,
}

impl ObservationSession {
    /// Start observing the context's pipeline on the current tokio runtime
    pub fn start(ctx: SessionContext) -> Self {
        let id = ctx.session_id;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let initial = PipelineView::loading(ctx.project_id, ctx.pipeline_id);
        let (view_tx, view_rx) = watch::channel(Arc::new(initial));

        let span = info_span!(
            "session",
            id = %ctx.session_id,
            project = ctx.project_id,
            pipeline = ctx.pipeline_id
        );
        let driver = Driver::new(ctx, command_rx, view_tx);
        let task = tokio::spawn(driver.run().instrument(span));

        Self {
            id,
            command_tx,
            view_rx,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current view snapshot
    pub fn view(&self) -> Arc<PipelineView> {
        self.view_rx.borrow().clone()
    }

    /// Subscribe to view changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<PipelineView>> {
        self.view_rx.clone()
    }

    /// Tail the logs of a job
    ///
    /// Returns once the view with the cleared log panel has been published.
    pub async fn select_job(&self, job_id: i64) -> Result<(), ObserverError> {
        self.request(Command::Select(Selection::Job(job_id))).await
    }

    /// Tail the deployment logs
    ///
    /// Fails with `SelectionUnavailable` while the pipeline has no deployment.
    pub async fn select_deployment(&self) -> Result<(), ObserverError> {
        self.request(Command::Select(Selection::Deployment)).await
    }

    /// Close the log panel
    pub async fn clear_selection(&self) -> Result<(), ObserverError> {
        self.request(Command::Select(Selection::None)).await
    }

    /// Fetch every active resource now
    pub async fn refresh(&self) -> Result<(), ObserverError> {
        self.request(Command::Refresh).await
    }

    /// Toggle auto-follow of the log tail
    pub async fn set_follow(&self, follow: bool) -> Result<(), ObserverError> {
        self.request(Command::Follow(follow)).await
    }

    /// Stop all polling and wait for the driver to exit
    pub async fn shutdown(mut self) {
        if self.request(Command::Shutdown).await.is_ok() {
            let _ = (&mut self.task).await;
        }
    }

    async fn request(&self, command: Command) -> Result<(), ObserverError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Request { command, reply })
            .await
            .map_err(|_| ObserverError::SessionClosed)?;
        reply_rx.await.map_err(|_| ObserverError::SessionClosed)?
    }
}

impl Drop for ObservationSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ActiveLog {
    target: LogTarget,
    generation: u64,
    poller: ResourcePoller<LogSnapshot>,
    state_rx: watch::Receiver<ResourceState<LogSnapshot>>,
}

struct Driver {
    ctx: SessionContext,
    pipeline: ResourcePoller<PipelineRun>,
    pipeline_rx: watch::Receiver<ResourceState<PipelineRun>>,
    jobs: ResourcePoller<Vec<Job>>,
    jobs_rx: watch::Receiver<ResourceState<Vec<Job>>>,
    deployment: ResourcePoller<Option<Deployment>>,
    deployment_rx: watch::Receiver<ResourceState<Option<Deployment>>>,
    deployment_enabled: bool,
    active_log: Option<ActiveLog>,
    selection: Selection,
    log_tail: LogTail,
    command_rx: mpsc::Receiver<Request>,
    view_tx: watch::Sender<Arc<PipelineView>>,
}

impl Driver {
    fn new(
        ctx: SessionContext,
        command_rx: mpsc::Receiver<Request>,
        view_tx: watch::Sender<Arc<PipelineView>>,
    ) -> Self {
        let coarse = ctx.cadence;

        let pipeline = ResourcePoller::spawn(
            PollerOptions::new("pipeline", ctx.retry.clone()),
            fetch_pipeline(&ctx),
            Arc::new(move |_: Option<&PipelineRun>| coarse.coarse_cadence()),
        );
        let jobs = ResourcePoller::spawn(
            PollerOptions::new("jobs", ctx.retry.clone()),
            fetch_jobs(&ctx),
            Arc::new(move |_: Option<&Vec<Job>>| coarse.coarse_cadence()),
        );
        // Enabled once the pipeline itself has loaded
        let deployment = ResourcePoller::spawn(
            PollerOptions::new("deployment", ctx.retry.clone()).disabled(),
            fetch_deployment(&ctx),
            Arc::new(move |_: Option<&Option<Deployment>>| coarse.coarse_cadence()),
        );

        Self {
            pipeline_rx: pipeline.subscribe(),
            jobs_rx: jobs.subscribe(),
            deployment_rx: deployment.subscribe(),
            ctx,
            pipeline,
            jobs,
            deployment,
            deployment_enabled: false,
            active_log: None,
            selection: Selection::None,
            log_tail: LogTail::new(),
            command_rx,
            view_tx,
        }
    }

    async fn run(mut self) {
        info!("Observation session started");

        loop {
            tokio::select! {
                request = self.command_rx.recv() => {
                    let Some(Request { command, reply }) = request else {
                        break;
                    };
                    if matches!(command, Command::Shutdown) {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    let result = self.handle_command(command);
                    self.publish();
                    let _ = reply.send(result);
                }
                changed = self.pipeline_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_pipeline();
                    self.publish();
                }
                changed = self.jobs_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
                changed = self.deployment_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_deployment();
                    self.publish();
                }
                generation = log_changed(&mut self.active_log) => {
                    self.on_log(generation);
                    self.publish();
                }
            }
        }

        info!("Observation session stopped");
    }

    fn handle_command(&mut self, command: Command) -> Result<(), ObserverError> {
        match command {
            Command::Select(selection) => self.select(selection),
            Command::Refresh => {
                self.pipeline.refresh();
                self.jobs.refresh();
                if self.deployment_enabled {
                    self.deployment.refresh();
                }
                if let Some(active) = &self.active_log {
                    active.poller.refresh();
                }
                Ok(())
            }
            Command::Follow(follow) => {
                self.log_tail.set_follow(follow);
                Ok(())
            }
            Command::Shutdown => Ok(()),
        }
    }

    fn select(&mut self, selection: Selection) -> Result<(), ObserverError> {
        if selection == Selection::Deployment && !self.has_deployment() {
            return Err(ObserverError::SelectionUnavailable(format!(
                "pipeline {} has no deployment",
                self.ctx.pipeline_id
            )));
        }

        if selection == self.selection {
            // Reselecting restarts a stopped or failed stream
            if let Some(active) = &self.active_log {
                debug!("Reselected {:?}, resuming log polling", active.target);
                active.poller.enable();
            }
            return Ok(());
        }

        debug!("Selection {:?} -> {:?}", self.selection, selection);
        self.selection = selection;

        // Cancels the previous stream's polling and drops its pending results
        self.active_log = None;

        let target = selection.log_target();
        let generation = self.log_tail.reset(target);
        self.active_log = target.map(|target| self.spawn_log_poller(target, generation));

        Ok(())
    }

    fn spawn_log_poller(&self, target: LogTarget, generation: u64) -> ActiveLog {
        let cadence = self.ctx.cadence;
        // Stops only once a read issued after the owner finished has landed
        let interval: IntervalFn<LogSnapshot> =
            Arc::new(move |snapshot: Option<&LogSnapshot>| {
                cadence.log_cadence(snapshot.and_then(|s| s.owner_status.as_ref()))
            });

        let (options, fetch) = match target {
            LogTarget::Job(job_id) => (
                PollerOptions::new(format!("job-logs:{}", job_id), self.ctx.retry.clone()),
                fetch_job_logs(&self.ctx, job_id, self.jobs_rx.clone()),
            ),
            LogTarget::Deployment => (
                PollerOptions::new("deployment-logs", self.ctx.retry.clone()),
                fetch_deployment_logs(&self.ctx, self.deployment_rx.clone()),
            ),
        };
        let poller = ResourcePoller::spawn(options, fetch, interval);

        ActiveLog {
            target,
            generation,
            state_rx: poller.subscribe(),
            poller,
        }
    }

    fn has_deployment(&self) -> bool {
        matches!(self.deployment_rx.borrow().data, Some(Some(_)))
    }

    fn on_pipeline(&mut self) {
        if !self.deployment_enabled && self.pipeline_rx.borrow().data.is_some() {
            debug!("Pipeline loaded, polling deployment");
            self.deployment_enabled = true;
            self.deployment.enable();
        }
    }

    fn on_deployment(&mut self) {
        let gone = matches!(self.deployment_rx.borrow().data, Some(None));
        if gone && self.selection == Selection::Deployment {
            info!("Deployment no longer reported, clearing deployment selection");
            self.selection = Selection::None;
            self.active_log = None;
            self.log_tail.reset(None);
        }
    }

    fn on_log(&mut self, generation: u64) {
        let Some(active) = &self.active_log else {
            return;
        };
        if active.generation != generation {
            return;
        }

        let state = active.state_rx.borrow();
        if let Some(snapshot) = &state.data {
            self.log_tail.replace(generation, &snapshot.lines);
        }
    }

    fn publish(&self) {
        let view = self.build_view();
        self.view_tx.send_if_modified(|current| {
            if **current == view {
                return false;
            }
            *current = Arc::new(view);
            true
        });
    }

    fn build_view(&self) -> PipelineView {
        let pipeline = self.pipeline_rx.borrow();
        let jobs = self.jobs_rx.borrow();
        let deployment = self.deployment_rx.borrow();

        let status = match (&pipeline.data, pipeline.phase) {
            (_, ResourcePhase::NotFound) => ViewStatus::NotFound,
            (Some(_), _) => ViewStatus::Ready,
            (None, ResourcePhase::Error) => ViewStatus::Unavailable(
                pipeline
                    .error
                    .clone()
                    .unwrap_or_else(|| "pipeline fetch failed".to_string()),
            ),
            (None, _) => ViewStatus::Loading,
        };

        let stages = jobs
            .data
            .as_deref()
            .map(|jobs| group_by_stage(jobs, &self.ctx.stage_order))
            .unwrap_or_default();

        let current_deployment = deployment.data.clone().flatten();

        let log = self.active_log.as_ref().map(|active| {
            let state = active.state_rx.borrow();
            let title = match active.target {
                LogTarget::Job(job_id) => {
                    let name = jobs
                        .data
                        .as_ref()
                        .and_then(|jobs| jobs.iter().find(|job| job.id == job_id))
                        .map(|job| job.name.clone())
                        .unwrap_or_else(|| format!("Job #{}", job_id));
                    format!("{} Logs", name)
                }
                LogTarget::Deployment => "Deployment Logs".to_string(),
            };
            let missing = state.phase == ResourcePhase::NotFound;
            LogPanel {
                target: active.target,
                title,
                lines: self.log_tail.lines().to_vec(),
                loading: !self.log_tail.is_loaded() && !missing,
                settled: state.phase == ResourcePhase::Stopped,
                missing,
                following: self.log_tail.is_following(),
                scroll_revision: self.log_tail.scroll_revision(),
            }
        });

        let stale = Staleness {
            pipeline: pipeline.is_stale(),
            jobs: jobs.is_stale(),
            deployment: deployment.is_stale(),
            log: self
                .active_log
                .as_ref()
                .is_some_and(|active| active.state_rx.borrow().is_stale()),
        };

        PipelineView {
            project_id: self.ctx.project_id,
            pipeline_id: self.ctx.pipeline_id,
            status,
            pipeline: pipeline.data.clone(),
            stages,
            jobs_loading: jobs.is_first_load(),
            deployment: current_deployment,
            selection: self.selection,
            log,
            stale,
        }
    }
}

async fn log_changed(active: &mut Option<ActiveLog>) -> u64 {
    match active {
        Some(active) => {
            if active.state_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            active.generation
        }
        None => std::future::pending().await,
    }
}

fn fetch_pipeline(ctx: &SessionContext) -> FetchFn<PipelineRun> {
    let api = ctx.api.clone();
    let (project_id, pipeline_id) = (ctx.project_id, ctx.pipeline_id);
    Arc::new(move || {
        let api = api.clone();
        async move { api.get_pipeline(project_id, pipeline_id).await }.boxed()
    })
}

fn fetch_jobs(ctx: &SessionContext) -> FetchFn<Vec<Job>> {
    let api = ctx.api.clone();
    let (project_id, pipeline_id) = (ctx.project_id, ctx.pipeline_id);
    Arc::new(move || {
        let api = api.clone();
        async move { api.get_jobs(project_id, pipeline_id).await }.boxed()
    })
}

fn fetch_deployment(ctx: &SessionContext) -> FetchFn<Option<Deployment>> {
    let api = ctx.api.clone();
    let (project_id, pipeline_id) = (ctx.project_id, ctx.pipeline_id);
    Arc::new(move || {
        let api = api.clone();
        async move { api.get_deployment(project_id, pipeline_id).await }.boxed()
    })
}

fn job_status(jobs: &ResourceState<Vec<Job>>, job_id: i64) -> Option<Status> {
    jobs.data
        .as_ref()
        .and_then(|jobs| jobs.iter().find(|job| job.id == job_id))
        .map(|job| job.status.clone())
}

fn deployment_status(deployment: &ResourceState<Option<Deployment>>) -> Option<Status> {
    deployment
        .data
        .as_ref()
        .and_then(|deployment| deployment.as_ref())
        .map(|deployment| deployment.status.clone())
}

fn fetch_job_logs(
    ctx: &SessionContext,
    job_id: i64,
    jobs_rx: watch::Receiver<ResourceState<Vec<Job>>>,
) -> FetchFn<LogSnapshot> {
    let api = ctx.api.clone();
    let (project_id, pipeline_id) = (ctx.project_id, ctx.pipeline_id);
    Arc::new(move || {
        let api = api.clone();
        let owner_status = job_status(&jobs_rx.borrow(), job_id);
        async move {
            api.get_job_logs(project_id, pipeline_id, job_id)
                .await
                .map(|lines| LogSnapshot {
                    owner_status,
                    lines,
                })
        }
        .boxed()
    })
}

fn fetch_deployment_logs(
    ctx: &SessionContext,
    deployment_rx: watch::Receiver<ResourceState<Option<Deployment>>>,
) -> FetchFn<LogSnapshot> {
    let api = ctx.api.clone();
    let (project_id, pipeline_id) = (ctx.project_id, ctx.pipeline_id);
    Arc::new(move || {
        let api = api.clone();
        let owner_status = deployment_status(&deployment_rx.borrow());
        async move {
            api.get_deployment_logs(project_id, pipeline_id)
                .await
                .map(|lines| LogSnapshot {
                    owner_status,
                    lines,
                })
        }
        .boxed()
    })
}
