//! Metadata-only yt-dlp invocations.

use std::path::PathBuf;
use std::time::Duration;

use process_utils::{describe_exit, piped_command};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::platform::Platform;
use crate::{Error, Result};

const INSTALL_HINT: &str =
    "yt-dlp not found. Please install yt-dlp: https://github.com/yt-dlp/yt-dlp/wiki/Installation";

const BILIBILI_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_STDERR_CHARS: usize = 500;

/// Summary of one video, as returned by `POST /api/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub formats: Vec<VideoFormat>,
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: Option<String>,
    /// `format_note`, else yt-dlp's numeric quality rendered as text.
    pub quality: Option<String>,
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub fps: Option<f64>,
    pub resolution: Option<String>,
    pub tbr: Option<f64>,
    pub abr: Option<f64>,
    pub vbr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// One entry of a flat playlist listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
}

/// Tags of a music track, used to search for it and to name and tag the
/// resulting file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub artwork: Option<String>,
    pub release_date: Option<String>,
    pub track_number: Option<u32>,
}

impl TrackMetadata {
    /// yt-dlp search query for the track.
    pub fn search_query(&self) -> String {
        format!("ytsearch1:{} - {}", self.artist, self.title)
    }
}

/// Result of an info lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MediaInfo {
    Video(Box<VideoInfo>),
    Playlist { entries: Vec<PlaylistEntry> },
}

/// Raw `--dump-json` document. Only the fields we map are declared.
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    description: Option<String>,
    uploader: Option<String>,
    creator: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    track: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    release_date: Option<String>,
    upload_date: Option<String>,
    track_number: Option<u32>,
    url: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    ext: Option<String>,
    format_note: Option<String>,
    quality: Option<serde_json::Value>,
    filesize: Option<u64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    fps: Option<f64>,
    resolution: Option<String>,
    tbr: Option<f64>,
    abr: Option<f64>,
    vbr: Option<f64>,
}

impl From<RawFormat> for VideoFormat {
    fn from(raw: RawFormat) -> Self {
        let quality = raw
            .format_note
            .filter(|n| !n.is_empty())
            .or_else(|| match raw.quality {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });
        Self {
            format_id: raw.format_id,
            ext: raw.ext,
            quality,
            filesize: raw.filesize,
            vcodec: raw.vcodec,
            acodec: raw.acodec,
            fps: raw.fps,
            resolution: raw.resolution,
            tbr: raw.tbr,
            abr: raw.abr,
            vbr: raw.vbr,
        }
    }
}

impl RawInfo {
    fn into_video_info(self) -> VideoInfo {
        VideoInfo {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            duration: self.duration,
            thumbnail: self.thumbnail,
            description: self.description,
            uploader: self.uploader,
            formats: self.formats.into_iter().map(VideoFormat::from).collect(),
            thumbnails: self.thumbnails,
        }
    }

    fn into_playlist_entry(self) -> Option<PlaylistEntry> {
        Some(PlaylistEntry {
            id: self.id?,
            title: self.title,
            url: self.url.or(self.webpage_url),
            duration: self.duration,
            uploader: self.uploader,
        })
    }

    fn into_track(self) -> Option<TrackMetadata> {
        let title = self.track.or(self.title).filter(|t| !t.is_empty())?;
        let artist = self
            .artist
            .or(self.uploader)
            .or(self.creator)
            .filter(|a| !a.is_empty())?;
        Some(TrackMetadata {
            title,
            artist,
            album: self.album,
            duration: self.duration,
            artwork: self.thumbnail,
            release_date: self.release_date.or(self.upload_date),
            track_number: self.track_number,
        })
    }
}

/// Runs yt-dlp in metadata-only mode.
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    ytdlp: PathBuf,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(ytdlp: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            timeout,
        }
    }

    /// Look up a single video, or list a playlist when `playlist` is set.
    pub async fn fetch_info(&self, url: &str, playlist: bool) -> Result<MediaInfo> {
        let mut args: Vec<String> = if playlist {
            vec!["--flat-playlist".into(), "--dump-json".into()]
        } else {
            vec![
                "--dump-json".into(),
                "--no-playlist".into(),
                "--skip-download".into(),
            ]
        };
        if Platform::detect(url) == Platform::Bilibili {
            args.extend(
                [
                    "--user-agent",
                    BILIBILI_USER_AGENT,
                    "--add-header",
                    "Referer: https://www.bilibili.com",
                    "--add-header",
                    "Origin: https://www.bilibili.com",
                    "--add-header",
                    "Accept-Language: en-US,en;q=0.9",
                ]
                .map(String::from),
            );
        }
        args.push(url.to_string());

        let stdout = self.run(&args).await?;

        if playlist {
            let entries = parse_playlist(&stdout)?;
            debug!(url, entries = entries.len(), "Fetched playlist listing");
            Ok(MediaInfo::Playlist { entries })
        } else {
            let raw: RawInfo = serde_json::from_str(stdout.trim())
                .map_err(|_| Error::metadata("Failed to parse video info"))?;
            Ok(MediaInfo::Video(Box::new(raw.into_video_info())))
        }
    }

    /// Track tags for a music-service track URL.
    pub async fn fetch_track_metadata(&self, url: &str) -> Result<TrackMetadata> {
        let args = ["--dump-json", "--skip-download", url].map(String::from);
        let stdout = self.run(&args).await?;

        let raw: RawInfo = serde_json::from_str(stdout.trim())
            .map_err(|_| Error::metadata("Failed to parse track info"))?;
        raw.into_track()
            .ok_or_else(|| Error::metadata("Track info has no title or artist"))
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let child = piped_command(&self.ytdlp, args).spawn().map_err(|e| {
            warn!(program = %self.ytdlp.display(), error = %e, "Failed to start yt-dlp");
            Error::metadata(INSTALL_HINT)
        })?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::metadata(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                format!("yt-dlp failed with {}", describe_exit(&output.status))
            } else {
                stderr.chars().take(MAX_STDERR_CHARS).collect()
            };
            return Err(Error::metadata(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_playlist(stdout: &str) -> Result<Vec<PlaylistEntry>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<RawInfo>(line)
                .map_err(|_| Error::metadata("Failed to parse playlist entry"))
        })
        .filter_map(|raw| raw.map(RawInfo::into_playlist_entry).transpose())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "duration": 212,
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        "description": "The official video",
        "uploader": "Rick Astley",
        "formats": [
            {"format_id": "251", "ext": "webm", "format_note": "medium", "acodec": "opus", "vcodec": "none", "abr": 129.5},
            {"format_id": "137", "ext": "mp4", "quality": 9, "vcodec": "avc1.640028", "fps": 25, "resolution": "1920x1080", "filesize": 80000000}
        ],
        "thumbnails": [{"url": "https://i.ytimg.com/a.jpg", "id": "0", "width": 120, "height": 90}],
        "extractor": "youtube"
    }"#;

    #[test]
    fn test_video_info_mapping() {
        let raw: RawInfo = serde_json::from_str(VIDEO_JSON).unwrap();
        let info = raw.into_video_info();

        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.duration, Some(212.0));
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].quality.as_deref(), Some("medium"));
        assert_eq!(info.formats[1].quality.as_deref(), Some("9"));
        assert_eq!(info.formats[1].filesize, Some(80_000_000));
        assert_eq!(info.thumbnails[0].id.as_deref(), Some("0"));
    }

    #[test]
    fn test_track_mapping_fallbacks() {
        let raw: RawInfo = serde_json::from_str(
            r#"{"title": "Song (Official)", "track": "Song", "uploader": "Band",
                "thumbnail": "https://i.scdn.co/image/x", "upload_date": "20200101", "track_number": 4}"#,
        )
        .unwrap();
        let track = raw.into_track().unwrap();

        assert_eq!(track.title, "Song");
        assert_eq!(track.artist, "Band");
        assert_eq!(track.release_date.as_deref(), Some("20200101"));
        assert_eq!(track.track_number, Some(4));
        assert_eq!(track.search_query(), "ytsearch1:Band - Song");

        let raw: RawInfo = serde_json::from_str(r#"{"title": "Orphan"}"#).unwrap();
        assert!(raw.into_track().is_none());
    }

    #[test]
    fn test_parse_playlist_lines() {
        let stdout = concat!(
            r#"{"id": "a", "title": "First", "url": "https://youtu.be/a"}"#,
            "\n\n",
            r#"{"id": "b", "title": "Second", "webpage_url": "https://youtu.be/b"}"#,
            "\n",
            r#"{"title": "no id"}"#,
            "\n",
        );
        let entries = parse_playlist(stdout).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].url.as_deref(), Some("https://youtu.be/b"));

        assert!(matches!(
            parse_playlist("not json"),
            Err(Error::MetadataFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_metadata_error() {
        let fetcher = MetadataFetcher::new(
            "/nonexistent/serika/yt-dlp",
            Duration::from_secs(5),
        );
        let err = fetcher
            .fetch_info("https://youtu.be/abc", false)
            .await
            .unwrap_err();
        match err {
            Error::MetadataFetch(msg) => assert!(msg.contains("yt-dlp not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use crate::downloader::testing::fake_tool;
        use tempfile::TempDir;

        #[tokio::test]
        async fn test_fetch_info_success() {
            let temp = TempDir::new().unwrap();
            let script = format!("cat <<'EOF'\n{VIDEO_JSON}\nEOF");
            let tool = fake_tool(temp.path(), "yt-dlp", &script);

            let info = MetadataFetcher::new(tool, Duration::from_secs(10))
                .fetch_info("https://youtu.be/dQw4w9WgXcQ", false)
                .await
                .unwrap();
            match info {
                MediaInfo::Video(info) => assert_eq!(info.title, "Never Gonna Give You Up"),
                other => panic!("unexpected info: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_non_zero_exit_reports_stderr() {
            let temp = TempDir::new().unwrap();
            let tool = fake_tool(
                temp.path(),
                "yt-dlp",
                "echo 'ERROR: [youtube] abc: Video unavailable' >&2; exit 1",
            );

            let err = MetadataFetcher::new(tool, Duration::from_secs(10))
                .fetch_info("https://youtu.be/abc", false)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Video unavailable"));
        }

        #[tokio::test]
        async fn test_unparsable_output() {
            let temp = TempDir::new().unwrap();
            let tool = fake_tool(temp.path(), "yt-dlp", "echo garbage");

            let err = MetadataFetcher::new(tool, Duration::from_secs(10))
                .fetch_info("https://youtu.be/abc", false)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Failed to parse video info"));
        }

        #[tokio::test]
        async fn test_timeout() {
            let temp = TempDir::new().unwrap();
            let tool = fake_tool(temp.path(), "yt-dlp", "sleep 5");

            let err = MetadataFetcher::new(tool, Duration::from_millis(200))
                .fetch_track_metadata("https://open.spotify.com/track/abc")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
