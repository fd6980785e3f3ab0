//! File roles, derived from names only.

use std::fmt;
use std::path::Path;

const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];
const THUMBNAIL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const SUBTITLE_EXTENSIONS: &[&str] = &["vtt", "srt", "ass", "ssa", "sub", "sbv"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "flv", "wmv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "wav", "opus", "ogg", "aac"];

/// What a file in an Output Directory is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    Video,
    Audio,
    Thumbnail,
    Subtitle,
    /// Still being written by yt-dlp (`video.mp4.part`, `.ytdl` state files).
    Partial,
    Other,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Thumbnail => "thumbnail",
            Self::Subtitle => "subtitle",
            Self::Partial => "partial",
            Self::Other => "other",
        }
    }

    /// Primary media, as opposed to side files.
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a file by name. Case-insensitive; partial suffixes win over the
/// inner extension.
pub fn classify(name: &str) -> FileRole {
    let lower = name.to_ascii_lowercase();
    if PARTIAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return FileRole::Partial;
    }

    let Some(ext) = extension(&lower) else {
        return FileRole::Other;
    };
    if THUMBNAIL_EXTENSIONS.contains(&ext) {
        FileRole::Thumbnail
    } else if SUBTITLE_EXTENSIONS.contains(&ext) {
        FileRole::Subtitle
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        FileRole::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        FileRole::Audio
    } else {
        FileRole::Other
    }
}

/// Content type for a served file.
pub fn mime_type(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    match extension(&lower) {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("opus") => "audio/opus",
        Some("ogg") => "audio/ogg",
        Some("aac") => "audio/aac",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("vtt") => "text/vtt",
        Some("srt" | "ass") => "text/plain",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_wins_over_inner_extension() {
        assert_eq!(classify("video.mp4.part"), FileRole::Partial);
        assert_eq!(classify("video.mp4.ytdl"), FileRole::Partial);
        assert_eq!(classify("Video.F137.MP4.PART"), FileRole::Partial);
        assert_eq!(classify("frag.temp"), FileRole::Partial);
    }

    #[test]
    fn test_roles_by_extension() {
        assert_eq!(classify("video.mp4"), FileRole::Video);
        assert_eq!(classify("Clip.WEBM"), FileRole::Video);
        assert_eq!(classify("song.opus"), FileRole::Audio);
        assert_eq!(classify("cover.webp"), FileRole::Thumbnail);
        assert_eq!(classify("talk.en.vtt"), FileRole::Subtitle);
        assert_eq!(classify("notes.txt"), FileRole::Other);
        assert_eq!(classify("README"), FileRole::Other);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type("a.mp4"), "video/mp4");
        assert_eq!(mime_type("a.JPEG"), "image/jpeg");
        assert_eq!(mime_type("a.srt"), "text/plain");
        assert_eq!(mime_type("a.sbv"), "application/octet-stream");
        assert_eq!(mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_media_roles() {
        assert!(FileRole::Video.is_media());
        assert!(FileRole::Audio.is_media());
        assert!(!FileRole::Thumbnail.is_media());
    }
}
