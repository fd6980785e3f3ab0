//! serika-dl library crate.
//!
//! A small HTTP service around yt-dlp: it starts downloads as supervised
//! subprocesses, turns their console output into pollable job status and
//! serves the finished files.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod files;
pub mod jobs;
pub mod logging;
pub mod utils;

pub use error::{Error, Result};
