//! Cover-art embedding for track downloads.
//!
//! yt-dlp finds track-metadata jobs through a search, so the audio it fetches
//! carries the video thumbnail, not the album cover. After a successful
//! download the cover is fetched and muxed in with ffmpeg. Every failure here
//! is reported to the caller, which only logs it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use process_utils::{describe_exit, piped_command};
use tracing::{debug, info};

use crate::files::{FileRole, classify};
use crate::utils::fs::remove_file_best_effort;
use crate::{Error, Result};

const ARTWORK_FILE_NAME: &str = "cover_artwork.jpg";
const TEMP_PREFIX: &str = "temp_";
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ArtworkEmbedder {
    ffmpeg: PathBuf,
    client: reqwest::Client,
    timeout: Duration,
}

impl ArtworkEmbedder {
    pub fn new(ffmpeg: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            client,
            timeout: FFMPEG_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Embed the image at `artwork_url` into the audio file in `output_dir`.
    ///
    /// Returns the path of the rewritten audio file. Temporary files are
    /// removed whether or not embedding succeeds.
    pub async fn embed(&self, output_dir: &Path, artwork_url: &str) -> Result<PathBuf> {
        let audio = find_audio_file(output_dir)
            .await?
            .ok_or_else(|| Error::Other("No audio file to embed artwork into".to_string()))?;
        let Some(audio_name) = audio.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(Error::Other("Audio file has no name".to_string()));
        };

        let artwork = output_dir.join(ARTWORK_FILE_NAME);
        let temp = output_dir.join(format!("{TEMP_PREFIX}{audio_name}"));

        let result = self.download_and_mux(artwork_url, &audio, &artwork, &temp).await;
        remove_file_best_effort(&artwork).await;

        match result {
            Ok(()) => {
                tokio::fs::rename(&temp, &audio)
                    .await
                    .map_err(|e| Error::io_path("replacing audio file", &audio, e))?;
                info!(file = %audio_name, "Embedded cover artwork");
                Ok(audio)
            }
            Err(e) => {
                remove_file_best_effort(&temp).await;
                Err(e)
            }
        }
    }

    async fn download_and_mux(
        &self,
        artwork_url: &str,
        audio: &Path,
        artwork: &Path,
        temp: &Path,
    ) -> Result<()> {
        let response = self
            .client
            .get(artwork_url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        tokio::fs::write(artwork, &bytes)
            .await
            .map_err(|e| Error::io_path("writing artwork", artwork, e))?;
        debug!(bytes = bytes.len(), "Downloaded cover artwork");

        let args: [&OsStr; 14] = [
            OsStr::new("-i"),
            audio.as_os_str(),
            OsStr::new("-i"),
            artwork.as_os_str(),
            OsStr::new("-map"),
            OsStr::new("0:a"),
            OsStr::new("-map"),
            OsStr::new("1:0"),
            OsStr::new("-c"),
            OsStr::new("copy"),
            OsStr::new("-disposition:1"),
            OsStr::new("attached_pic"),
            temp.as_os_str(),
            OsStr::new("-y"),
        ];
        let program = self.ffmpeg.display().to_string();
        let child = piped_command(&self.ffmpeg, args)
            .spawn()
            .map_err(|e| Error::spawn(program.clone(), e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Other(format!(
                    "ffmpeg timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(Error::Other(format!(
                "ffmpeg failed with {}: {}",
                describe_exit(&output.status),
                last_line.trim()
            )));
        }
        Ok(())
    }
}

/// First audio file in `dir` by name, ignoring our own temporaries.
async fn find_audio_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_path("reading output directory", dir, e))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(TEMP_PREFIX) && classify(&name) == FileRole::Audio {
            candidates.push(name);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next().map(|name| dir.join(name)))
}
