//! Backend HTTP access

pub mod api;
pub mod client;
pub mod deployments;
pub mod pipelines;

pub use api::PipelineApi;
pub use client::HttpClient;
