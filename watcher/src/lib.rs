//! Pipewatch Library
//!
//! Client-side live observation of CI/CD pipeline runs over a polling-only
//! backend API.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod observe;
pub mod render;
pub mod storage;
pub mod utils;
