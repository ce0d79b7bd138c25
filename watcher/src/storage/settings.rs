//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ObserverError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::observe::cadence::CadenceTable;
use crate::observe::stages::DEFAULT_STAGE_ORDER;
use crate::utils::RetryOptions;

/// Upper bound on retries of a single fetch
pub const MAX_RETRIES: u32 = 10;

/// Watcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Polling intervals
    #[serde(default)]
    pub cadence: CadenceSettings,

    /// Per-fetch retry budget
    #[serde(default)]
    pub retry: RetrySettings,

    /// Canonical stage order, unknown stages are appended after these
    #[serde(default = "default_stage_order")]
    pub stage_order: Vec<String>,
}

fn default_stage_order() -> Vec<String> {
    DEFAULT_STAGE_ORDER.iter().map(|s| s.to_string()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            backend: BackendSettings::default(),
            cadence: CadenceSettings::default(),
            retry: RetrySettings::default(),
            stage_order: default_stage_order(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when it is missing
    pub async fn load(file: &File) -> Result<Self, ObserverError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the watcher cannot run with
    pub fn validate(&self) -> Result<(), ObserverError> {
        Url::parse(&self.backend.base_url).map_err(|e| {
            ObserverError::ConfigError(format!(
                "invalid backend base_url '{}': {}",
                self.backend.base_url, e
            ))
        })?;

        if self.backend.request_timeout_secs == 0 {
            return Err(ObserverError::ConfigError(
                "backend.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.cadence.log_interval_ms == 0 || self.cadence.coarse_interval_ms == 0 {
            return Err(ObserverError::ConfigError(
                "cadence intervals must be greater than zero".to_string(),
            ));
        }
        if self.retry.retries > MAX_RETRIES {
            return Err(ObserverError::ConfigError(format!(
                "retry.retries must be at most {}, got {}",
                MAX_RETRIES, self.retry.retries
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ObserverError::ConfigError(
                "retry.max_delay_ms must not be below retry.base_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling interval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceSettings {
    /// Log stream interval while its owner is still running
    #[serde(default = "default_log_interval")]
    pub log_interval_ms: u64,

    /// Pipeline, jobs and deployment interval
    #[serde(default = "default_coarse_interval")]
    pub coarse_interval_ms: u64,
}

fn default_log_interval() -> u64 {
    1000
}

fn default_coarse_interval() -> u64 {
    2000
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self {
            log_interval_ms: default_log_interval(),
            coarse_interval_ms: default_coarse_interval(),
        }
    }
}

impl From<&CadenceSettings> for CadenceTable {
    fn from(settings: &CadenceSettings) -> Self {
        CadenceTable {
            log_interval: Duration::from_millis(settings.log_interval_ms),
            coarse_interval: Duration::from_millis(settings.coarse_interval_ms),
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_retries() -> u32 {
    1
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl From<&RetrySettings> for RetryOptions {
    fn from(settings: &RetrySettings) -> Self {
        RetryOptions {
            retries: settings.retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ..Default::default()
        }
    }
}
