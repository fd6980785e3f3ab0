//! Everything that drives yt-dlp and ffmpeg.

pub mod args;
pub mod artwork;
pub mod binary;
pub mod cookies;
pub mod metadata;
pub mod options;
pub mod output_reader;
pub mod platform;
pub mod progress;
mod service;

pub use metadata::{MediaInfo, MetadataFetcher, TrackMetadata, VideoInfo};
pub use options::DownloadOptions;
pub use service::{DownloadService, StartedJob};

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable `sh` script standing in for an external tool.
    pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
