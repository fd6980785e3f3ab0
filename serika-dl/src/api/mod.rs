//! REST API server module.
//!
//! HTTP endpoints for starting downloads, polling their status and fetching
//! the resulting files.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
