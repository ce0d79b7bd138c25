//! Main application run loop

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::options::{AppOptions, WatchTarget};
use crate::errors::ObserverError;
use crate::http::api::PipelineApi;
use crate::http::client::HttpClient;
use crate::observe::context::SessionContext;
use crate::observe::session::ObservationSession;
use crate::observe::view::{PipelineView, Selection, ViewStatus};
use crate::render::render;

/// Watch a pipeline run until shutdown or, with `exit_on_finish`, until it settles
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ObserverError> {
    info!("Initializing pipeline watcher...");

    let client = HttpClient::new(
        &options.backend_base_url,
        options.token.clone(),
        options.request_timeout,
    )?;

    let pipeline_id = match &options.target {
        WatchTarget::Pipeline(id) => *id,
        WatchTarget::Trigger { branch } => {
            let pipeline = client.trigger_pipeline(options.project_id, branch).await?;
            info!(
                "Triggered pipeline #{} on branch {} of project {}",
                pipeline.id, branch, options.project_id
            );
            pipeline.id
        }
    };

    let api: Arc<dyn PipelineApi> = Arc::new(client);
    let ctx = SessionContext::new(api, options.project_id, pipeline_id)
        .with_cadence(options.cadence)
        .with_retry(options.retry.clone())
        .with_stage_order(options.stage_order.clone());

    let session = ObservationSession::start(ctx);
    info!("Watching pipeline #{} (session {})", pipeline_id, session.id());

    let result = watch_session(&session, &options, shutdown_signal).await;
    session.shutdown().await;
    result
}

async fn watch_session(
    session: &ObservationSession,
    options: &AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ObserverError> {
    let mut views = session.subscribe();
    let mut pending_selection = Some(options.initial_selection);
    tokio::pin!(shutdown_signal);

    loop {
        let view = views.borrow_and_update().clone();
        print_view(&view, options.log_tail_lines);

        if let Some(selection) = pending_selection {
            if apply_selection(session, &view, selection).await? {
                pending_selection = None;
            }
        }

        match &view.status {
            ViewStatus::NotFound => {
                return Err(ObserverError::NotFound(format!(
                    "pipeline {} of project {}",
                    view.pipeline_id, view.project_id
                )));
            }
            ViewStatus::Ready if options.exit_on_finish && is_settled(&view) => {
                info!("Pipeline #{} finished", view.pipeline_id);
                return Ok(());
            }
            _ => {}
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received, shutting down...");
                return Ok(());
            }
            changed = views.changed() => {
                if changed.is_err() {
                    warn!("Observation session ended unexpectedly");
                    return Err(ObserverError::SessionClosed);
                }
            }
        }
    }
}

/// Apply the requested selection once the view can take it
///
/// Returns true once the selection has been handled.
async fn apply_selection(
    session: &ObservationSession,
    view: &PipelineView,
    selection: Selection,
) -> Result<bool, ObserverError> {
    match selection {
        Selection::None => Ok(true),
        Selection::Job(job_id) => {
            session.select_job(job_id).await?;
            Ok(true)
        }
        Selection::Deployment if view.can_select_deployment() => {
            match session.select_deployment().await {
                Ok(()) => Ok(true),
                // The deployment vanished between the snapshot and the command
                Err(ObserverError::SelectionUnavailable(_)) => Ok(false),
                Err(e) => Err(e),
            }
        }
        Selection::Deployment if view.is_finished() => {
            warn!("Pipeline #{} finished without a deployment", view.pipeline_id);
            Ok(true)
        }
        Selection::Deployment => Ok(false),
    }
}

fn is_settled(view: &PipelineView) -> bool {
    view.is_finished() && view.log.as_ref().map_or(true, |log| log.is_done())
}

fn print_view(view: &PipelineView, log_tail_lines: usize) {
    let text = render(view, log_tail_lines);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", text).and_then(|_| stdout.flush()) {
        error!("Failed to write view: {}", e);
    }
}
