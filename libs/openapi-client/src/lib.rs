//! Wire models for the pipeline backend REST API

pub mod models;
