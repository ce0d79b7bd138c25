//! Domain models

pub mod pipeline;
pub mod status;

pub use pipeline::{Deployment, Job, LogLine, LogOwner, PipelineRun};
pub use status::{Status, StatusCategory};
