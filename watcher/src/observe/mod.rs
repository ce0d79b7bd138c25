//! Live observation of a pipeline run
//!
//! Pollers fetch the pipeline, its jobs, its deployment and the selected log
//! stream. The session composes their states into a [`view::PipelineView`].

pub mod cadence;
pub mod context;
pub mod log_tail;
pub mod poller;
pub mod session;
pub mod stages;
pub mod view;

pub use context::SessionContext;
pub use session::ObservationSession;
pub use view::{PipelineView, Selection, ViewStatus};
