//! Status values and their classification

use std::fmt;

/// Status of a pipeline run, job or deployment
///
/// Unrecognised values are kept verbatim so that a backend introducing a new
/// status does not break parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Running,
    Deploying,
    Success,
    Failed,
    RolledBack,
    Unknown(String),
}

/// Display category of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Waiting,
    Active,
    Succeeded,
    Failed,
    RolledBack,
}

impl Status {
    /// Whether no further change is expected without an external re-trigger
    ///
    /// Unknown statuses are non-terminal so that polling keeps going.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed | Status::RolledBack)
    }

    pub fn category(&self) -> StatusCategory {
        match self {
            Status::Pending | Status::Unknown(_) => StatusCategory::Waiting,
            Status::Running | Status::Deploying => StatusCategory::Active,
            Status::Success => StatusCategory::Succeeded,
            Status::Failed => StatusCategory::Failed,
            Status::RolledBack => StatusCategory::RolledBack,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Deploying => "deploying",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::RolledBack => "rolled_back",
            Status::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "pending" => Status::Pending,
            "running" => Status::Running,
            "deploying" => Status::Deploying,
            "success" => Status::Success,
            "failed" => Status::Failed,
            "rolled_back" => Status::RolledBack,
            other => Status::Unknown(other.to_string()),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Status::from(s))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Status::from(s.as_str()))
    }
}

/// Free-function form of [`Status::is_terminal`] over raw status text
pub fn is_terminal(status: &str) -> bool {
    Status::from(status).is_terminal()
}
