//! Per-request download options, as posted by the web client.

use serde::{Deserialize, Serialize};

use crate::jobs::DownloadMode;

fn default_format() -> String {
    "bestvideo+bestaudio".to_string()
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_true() -> bool {
    true
}

/// Options accepted by `POST /api/download`.
///
/// Everything except `url` is optional; defaults match the web client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    #[serde(default)]
    pub url: String,
    /// Sent by the web client; accepted and ignored. Format selection
    /// follows `quality`, the codecs and the mode flags.
    #[serde(default = "default_format")]
    pub format: String,
    /// Target height such as `1080p`, or `best`.
    #[serde(default = "default_quality")]
    pub quality: String,
    /// `mp3-<kbps>`, `flac`, `wav`, `alac`, or any yt-dlp audio format.
    #[serde(default)]
    pub audio_format: Option<String>,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub download_thumbnail: bool,
    #[serde(default)]
    pub audio_only: bool,
    #[serde(default)]
    pub video_only: bool,
    #[serde(default)]
    pub thumbnail_only: bool,
    #[serde(default)]
    pub thumbnail_format: Option<String>,
    #[serde(default)]
    pub subtitles_only: bool,
    #[serde(default)]
    pub subtitle_format: Option<String>,
    /// Comma separated yt-dlp language list, or `all`.
    #[serde(default)]
    pub subtitle_langs: Option<String>,
    #[serde(default = "default_true")]
    pub auto_subs: bool,
    #[serde(default)]
    pub subtitles: bool,
    #[serde(default = "default_true")]
    pub embed_metadata: bool,
    #[serde(default = "default_true")]
    pub embed_thumbnail: bool,
    #[serde(default)]
    pub sponsor_block: bool,
    /// Netscape-format cookie file contents.
    #[serde(default)]
    pub cookies: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub no_playlist: bool,
    /// e.g. `1`, `1,3,5`, `1-5`.
    #[serde(default)]
    pub playlist_items: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            format: default_format(),
            quality: default_quality(),
            audio_format: None,
            video_codec: None,
            audio_codec: None,
            download_thumbnail: false,
            audio_only: false,
            video_only: false,
            thumbnail_only: false,
            thumbnail_format: None,
            subtitles_only: false,
            subtitle_format: None,
            subtitle_langs: None,
            auto_subs: true,
            subtitles: false,
            embed_metadata: true,
            embed_thumbnail: true,
            sponsor_block: false,
            cookies: None,
            proxy: None,
            user_agent: None,
            no_playlist: false,
            playlist_items: None,
        }
    }
}

impl DownloadOptions {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Mode requested by the flags. Thumbnail-only wins over subtitles-only,
    /// which wins over audio-only.
    pub fn mode(&self) -> DownloadMode {
        if self.thumbnail_only {
            DownloadMode::Thumbnail
        } else if self.subtitles_only {
            DownloadMode::Subtitles
        } else if self.audio_only {
            DownloadMode::Audio
        } else {
            DownloadMode::Video
        }
    }
}

/// Strip non-empty values; the web client sends `""` for unset fields.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let options: DownloadOptions =
            serde_json::from_str(r#"{"url":"https://youtu.be/abc"}"#).unwrap();
        assert_eq!(options.format, "bestvideo+bestaudio");
        assert_eq!(options.quality, "best");
        assert!(options.auto_subs);
        assert!(options.embed_metadata);
        assert!(options.embed_thumbnail);
        assert!(!options.audio_only);
        assert_eq!(options.mode(), DownloadMode::Video);
    }

    #[test]
    fn test_camel_case_fields() {
        let options: DownloadOptions = serde_json::from_str(
            r#"{"url":"u","audioOnly":true,"audioFormat":"mp3-192","embedThumbnail":false,"playlistItems":"1-3"}"#,
        )
        .unwrap();
        assert_eq!(options.mode(), DownloadMode::Audio);
        assert_eq!(options.audio_format.as_deref(), Some("mp3-192"));
        assert!(!options.embed_thumbnail);
        assert_eq!(options.playlist_items.as_deref(), Some("1-3"));
    }

    #[test]
    fn test_mode_precedence() {
        let mut options = DownloadOptions::for_url("u");
        options.audio_only = true;
        options.subtitles_only = true;
        assert_eq!(options.mode(), DownloadMode::Subtitles);
        options.thumbnail_only = true;
        assert_eq!(options.mode(), DownloadMode::Thumbnail);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&Some("  ".to_string())), None);
        assert_eq!(non_empty(&Some(" webp ".to_string())), Some("webp"));
        assert_eq!(non_empty(&None), None);
    }
}
