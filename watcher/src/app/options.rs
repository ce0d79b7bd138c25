//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::observe::cadence::CadenceTable;
use crate::observe::view::Selection;
use crate::storage::settings::Settings;
use crate::utils::RetryOptions;

/// Which pipeline run to watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// An existing run
    Pipeline(i64),

    /// Trigger a new run on a branch and watch it
    Trigger { branch: String },
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Backend API base URL
    pub backend_base_url: String,

    /// Transport timeout per request
    pub request_timeout: Duration,

    /// Bearer token for the backend, if any
    pub token: Option<SecretString>,

    pub project_id: i64,
    pub target: WatchTarget,

    /// Log stream to tail once it is available
    pub initial_selection: Selection,

    /// Return once the pipeline and its deployment have settled
    pub exit_on_finish: bool,

    /// Number of log lines shown under the stage graph
    pub log_tail_lines: usize,

    pub cadence: CadenceTable,
    pub retry: RetryOptions,
    pub stage_order: Vec<String>,
}

impl AppOptions {
    /// Options for watching `target`, tuned by the settings file
    pub fn from_settings(settings: &Settings, project_id: i64, target: WatchTarget) -> Self {
        Self {
            backend_base_url: settings.backend.base_url.clone(),
            request_timeout: settings.backend.request_timeout(),
            token: None,
            project_id,
            target,
            initial_selection: Selection::None,
            exit_on_finish: false,
            log_tail_lines: 20,
            cadence: CadenceTable::from(&settings.cadence),
            retry: RetryOptions::from(&settings.retry),
            stage_order: settings.stage_order.clone(),
        }
    }
}
