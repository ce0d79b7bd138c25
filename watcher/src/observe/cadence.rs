//! Polling cadence

use std::time::Duration;

use crate::models::status::Status;

/// Next step of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Poll again after the given interval
    Every(Duration),

    /// The resource is settled, stop polling it
    Stop,
}

/// The tunable polling intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceTable {
    /// Log streams of a non-terminal owner
    pub log_interval: Duration,

    /// Pipeline, jobs and deployment status reads
    pub coarse_interval: Duration,
}

impl Default for CadenceTable {
    fn default() -> Self {
        Self {
            log_interval: Duration::from_millis(1000),
            coarse_interval: Duration::from_millis(2000),
        }
    }
}

impl CadenceTable {
    /// Cadence of a log stream given its owner's latest known status
    ///
    /// An owner that has not been observed yet keeps the stream polling.
    pub fn log_cadence(&self, owner_status: Option<&Status>) -> Cadence {
        match owner_status {
            Some(status) if status.is_terminal() => Cadence::Stop,
            _ => Cadence::Every(self.log_interval),
        }
    }

    /// Cadence of pipeline, jobs and deployment reads, which never stop
    pub fn coarse_cadence(&self) -> Cadence {
        Cadence::Every(self.coarse_interval)
    }
}
